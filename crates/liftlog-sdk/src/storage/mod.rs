//! 本地持久化存储
//!
//! - `users/{uid}/liftlog.db`：SQLite（参考数据、用户训练数据、outbox），由 DbActor 独占
//! - `users/{uid}/kv`：sled（同步元信息）

pub mod dao;
pub mod db_actor;
pub mod entities;
pub mod kv;
pub mod migrate;
pub mod queue;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{LiftlogSDKError, Result};
use db_actor::{DbActorHandle, LocalWrite};
use entities::{
    Equipment, Exercise, ExerciseSet, MuscleGroup, ReferenceBatch, SaveWorkoutsReport, SetPatch,
    TemplateDay, UserWorkoutDay, UserWorkoutSnapshot, WorkoutTemplate,
};
use kv::KvStore;
use queue::{OutboxEntry, OutboxResolution};

use crate::sync::ReferenceKind;

const DB_FILE_NAME: &str = "liftlog.db";

/// 存储管理器（异步门面，所有 SQL 在 DbActor 线程执行）
pub struct StorageManager {
    base_path: PathBuf,
    db_actor: DbActorHandle,
    /// 当前活跃用户
    current_user: RwLock<Option<String>>,
    /// 每用户 KV 存储（路径为 users/{uid}/kv），不共享
    user_kv_stores: RwLock<HashMap<String, Arc<KvStore>>>,
}

impl StorageManager {
    pub async fn new(base_path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(base_path)
            .await
            .map_err(|e| LiftlogSDKError::IO(format!("创建存储目录失败: {}", e)))?;

        Ok(Self {
            base_path: base_path.to_path_buf(),
            db_actor: DbActorHandle::spawn()?,
            current_user: RwLock::new(None),
            user_kv_stores: RwLock::new(HashMap::new()),
        })
    }

    fn user_dir(&self, uid: &str) -> PathBuf {
        self.base_path.join("users").join(uid)
    }

    /// 初始化并切换到某用户的存储（幂等）
    pub async fn init_user(&self, uid: &str) -> Result<()> {
        if uid.is_empty() {
            return Err(LiftlogSDKError::InvalidArgument("uid 不能为空".to_string()));
        }

        let user_dir = self.user_dir(uid);
        tokio::fs::create_dir_all(&user_dir)
            .await
            .map_err(|e| LiftlogSDKError::IO(format!("创建用户目录失败: {}", e)))?;

        let known = self.user_kv_stores.read().await.contains_key(uid);
        if !known {
            let kv = Arc::new(KvStore::open(&user_dir).await?);
            self.user_kv_stores.write().await.insert(uid.to_string(), kv);
        }

        let db_path = user_dir.join(DB_FILE_NAME);
        info!("🔧 正在初始化用户数据库: uid={}, path={}", uid, db_path.display());
        self.db_actor.init_user(uid.to_string(), db_path).await?;

        *self.current_user.write().await = Some(uid.to_string());
        info!("✅ 用户存储初始化完成: {}", uid);
        Ok(())
    }

    pub async fn current_uid(&self) -> Result<String> {
        self.current_user
            .read()
            .await
            .clone()
            .ok_or_else(|| LiftlogSDKError::NotInitialized("未初始化用户存储".to_string()))
    }

    /// 当前用户的 KV 存储
    pub async fn kv_store(&self) -> Result<Arc<KvStore>> {
        let uid = self.current_uid().await?;
        self.user_kv_stores
            .read()
            .await
            .get(&uid)
            .cloned()
            .ok_or_else(|| LiftlogSDKError::NotInitialized(format!("用户 KV 未初始化: {}", uid)))
    }

    // ===== 参考数据 =====

    pub async fn upsert_reference(&self, batch: ReferenceBatch, synced_at: i64) -> Result<usize> {
        let uid = self.current_uid().await?;
        self.db_actor.upsert_reference(uid, batch, synced_at).await
    }

    pub async fn reference_count(&self, kind: ReferenceKind) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor.reference_count(uid, kind).await
    }

    pub async fn count_reference_orphans(&self) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor.reference_orphans(uid).await
    }

    pub async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_equipment(uid).await
    }

    pub async fn list_muscle_groups(&self) -> Result<Vec<MuscleGroup>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_muscle_groups(uid).await
    }

    pub async fn list_exercises(&self) -> Result<Vec<Exercise>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_exercises(uid).await
    }

    pub async fn get_exercise(&self, id: i64) -> Result<Option<Exercise>> {
        let uid = self.current_uid().await?;
        self.db_actor.get_exercise(uid, id).await
    }

    pub async fn list_workout_templates(&self) -> Result<Vec<WorkoutTemplate>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_workout_templates(uid).await
    }

    pub async fn list_template_days(&self, template_id: i64) -> Result<Vec<TemplateDay>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_template_days(uid, template_id).await
    }

    // ===== 用户数据（写入 = 实体修改 + outbox 追加，单事务） =====

    /// 修改训练组，返回 outbox id
    pub async fn record_set_update(&self, set_id: i64, patch: SetPatch) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor
            .local_write(uid, LocalWrite::SetUpdate { set_id, patch })
            .await
    }

    /// 完成训练日，返回 outbox id
    pub async fn complete_workout_day(&self, day_id: i64, completed_at: i64) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor
            .local_write(uid, LocalWrite::DayComplete { day_id, completed_at })
            .await
    }

    /// 修改训练日备注，返回 outbox id
    pub async fn update_workout_day_notes(&self, day_id: i64, notes: Option<String>) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor
            .local_write(uid, LocalWrite::DayNotes { day_id, notes })
            .await
    }

    /// 整日快照重推，返回 outbox id
    pub async fn resync_workout_day(&self, day_id: i64) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor.local_write(uid, LocalWrite::DayResync { day_id }).await
    }

    pub async fn get_exercise_set(&self, id: i64) -> Result<Option<ExerciseSet>> {
        let uid = self.current_uid().await?;
        self.db_actor.get_exercise_set(uid, id).await
    }

    pub async fn get_workout_day(&self, id: i64) -> Result<Option<UserWorkoutDay>> {
        let uid = self.current_uid().await?;
        self.db_actor.get_workout_day(uid, id).await
    }

    pub async fn list_sets_for_day(&self, day_id: i64) -> Result<Vec<ExerciseSet>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_sets_for_day(uid, day_id).await
    }

    pub async fn save_user_workouts(&self, snapshot: UserWorkoutSnapshot) -> Result<SaveWorkoutsReport> {
        let uid = self.current_uid().await?;
        self.db_actor.save_user_workouts(uid, snapshot).await
    }

    // ===== outbox =====

    pub async fn list_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let uid = self.current_uid().await?;
        self.db_actor.list_outbox(uid).await
    }

    pub async fn outbox_len(&self) -> Result<i64> {
        let uid = self.current_uid().await?;
        self.db_actor.outbox_len(uid).await
    }

    pub async fn resolve_outbox(&self, resolutions: Vec<OutboxResolution>) -> Result<usize> {
        if resolutions.is_empty() {
            return Ok(0);
        }
        let uid = self.current_uid().await?;
        self.db_actor.resolve_outbox(uid, resolutions).await
    }

    /// 关闭当前用户的存储
    pub async fn close_user(&self) -> Result<()> {
        let Some(uid) = self.current_user.write().await.take() else {
            return Ok(());
        };
        if let Some(kv) = self.user_kv_stores.write().await.remove(&uid) {
            kv.flush().await?;
        }
        self.db_actor.close_user(uid).await
    }

    pub fn shutdown(&self) {
        self.db_actor.shutdown();
    }
}
