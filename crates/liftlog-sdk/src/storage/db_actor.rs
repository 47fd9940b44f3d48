//! 数据库 Actor - 单线程数据库访问模型
//!
//! 核心设计：
//! - SQLite Connection 永远只在一个专用线程中（单写者）
//! - 所有数据库操作通过 channel 发送命令，逐条串行执行
//! - 一次用户操作 = 一条命令 = 一个事务：实体修改与 outbox 追加同时可见或同时不可见
//! - 调用方等待的是 oneshot 回复，网络 I/O 永远不在 Actor 线程里发生

use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{LiftlogSDKError, Result};
use crate::storage::dao::{ReferenceDao, SyncQueueDao, WorkoutDao};
use crate::storage::entities::{
    Equipment, Exercise, ExerciseSet, MuscleGroup, ReferenceBatch, SaveWorkoutsReport, SetPatch,
    SyncStatus, TemplateDay, UserWorkoutDay, UserWorkoutSnapshot, WorkoutTemplate,
};
use crate::storage::queue::{
    DaySnapshot, EntityClass, NewOutboxEntry, OutboxEntry, OutboxResolution, Resolution, SyncIntent,
};
use crate::sync::ReferenceKind;
use crate::utils::now_millis;

/// 一次本地用户写入（实体修改 + outbox 追加）
#[derive(Debug, Clone, PartialEq)]
pub enum LocalWrite {
    /// 修改训练组字段
    SetUpdate { set_id: i64, patch: SetPatch },
    /// 完成训练日
    DayComplete { day_id: i64, completed_at: i64 },
    /// 修改训练日备注
    DayNotes { day_id: i64, notes: Option<String> },
    /// 整日快照重推
    DayResync { day_id: i64 },
}

/// 数据库命令
pub enum DbCommand {
    /// 初始化用户数据库
    InitUser {
        uid: String,
        db_path: PathBuf,
        respond_to: oneshot::Sender<Result<()>>,
    },

    /// 写入一种参考数据的完整集合（单事务）
    UpsertReference {
        uid: String,
        batch: ReferenceBatch,
        synced_at: i64,
        respond_to: oneshot::Sender<Result<usize>>,
    },

    /// 参考数据行数
    ReferenceCount {
        uid: String,
        kind: ReferenceKind,
        respond_to: oneshot::Sender<Result<i64>>,
    },

    /// 外键目标缺失的参考数据行数
    ReferenceOrphans {
        uid: String,
        respond_to: oneshot::Sender<Result<i64>>,
    },

    ListEquipment {
        uid: String,
        respond_to: oneshot::Sender<Result<Vec<Equipment>>>,
    },

    ListMuscleGroups {
        uid: String,
        respond_to: oneshot::Sender<Result<Vec<MuscleGroup>>>,
    },

    ListExercises {
        uid: String,
        respond_to: oneshot::Sender<Result<Vec<Exercise>>>,
    },

    GetExercise {
        uid: String,
        id: i64,
        respond_to: oneshot::Sender<Result<Option<Exercise>>>,
    },

    ListWorkoutTemplates {
        uid: String,
        respond_to: oneshot::Sender<Result<Vec<WorkoutTemplate>>>,
    },

    ListTemplateDays {
        uid: String,
        template_id: i64,
        respond_to: oneshot::Sender<Result<Vec<TemplateDay>>>,
    },

    /// 本地写入 + outbox 追加（单事务），返回 outbox id
    LocalWrite {
        uid: String,
        write: LocalWrite,
        respond_to: oneshot::Sender<Result<i64>>,
    },

    GetExerciseSet {
        uid: String,
        id: i64,
        respond_to: oneshot::Sender<Result<Option<ExerciseSet>>>,
    },

    GetWorkoutDay {
        uid: String,
        id: i64,
        respond_to: oneshot::Sender<Result<Option<UserWorkoutDay>>>,
    },

    ListSetsForDay {
        uid: String,
        day_id: i64,
        respond_to: oneshot::Sender<Result<Vec<ExerciseSet>>>,
    },

    /// 保存服务端下发的用户训练数据（不覆盖 pending）
    SaveUserWorkouts {
        uid: String,
        snapshot: UserWorkoutSnapshot,
        respond_to: oneshot::Sender<Result<SaveWorkoutsReport>>,
    },

    /// 按创建顺序列出 outbox
    ListOutbox {
        uid: String,
        respond_to: oneshot::Sender<Result<Vec<OutboxEntry>>>,
    },

    OutboxLen {
        uid: String,
        respond_to: oneshot::Sender<Result<i64>>,
    },

    /// 提交一批 outbox 处理结论（单事务）
    ResolveOutbox {
        uid: String,
        resolutions: Vec<OutboxResolution>,
        respond_to: oneshot::Sender<Result<usize>>,
    },

    /// 关闭特定用户的数据库
    CloseUser {
        uid: String,
        respond_to: oneshot::Sender<Result<()>>,
    },

    /// 停止 Actor
    Shutdown,
}

/// 数据库 Actor（运行在独立线程）
pub struct DbActor {
    /// 每个用户一个连接
    connections: HashMap<String, Connection>,
    receiver: Receiver<DbCommand>,
    thread_id: thread::ThreadId,
}

impl DbActor {
    fn new(receiver: Receiver<DbCommand>) -> Self {
        let thread_id = thread::current().id();
        info!("🚀 [Thread {:?}] DbActor 已启动", thread_id);
        Self {
            connections: HashMap::new(),
            receiver,
            thread_id,
        }
    }

    /// 运行 Actor 主循环
    fn run(mut self) {
        info!("🔄 [Thread {:?}] DbActor 开始处理命令", self.thread_id);

        while let Ok(command) = self.receiver.recv() {
            match command {
                DbCommand::Shutdown => {
                    info!("🛑 [Thread {:?}] DbActor 收到停止信号", self.thread_id);
                    break;
                }
                DbCommand::InitUser { uid, db_path, respond_to } => {
                    let _ = respond_to.send(self.handle_init_user(&uid, &db_path));
                }
                DbCommand::UpsertReference { uid, batch, synced_at, respond_to } => {
                    let _ = respond_to.send(self.handle_upsert_reference(&uid, &batch, synced_at));
                }
                DbCommand::ReferenceCount { uid, kind, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).count(kind)));
                }
                DbCommand::ReferenceOrphans { uid, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).count_orphans()));
                }
                DbCommand::ListEquipment { uid, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).list_equipment()));
                }
                DbCommand::ListMuscleGroups { uid, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).list_muscle_groups()));
                }
                DbCommand::ListExercises { uid, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).list_exercises()));
                }
                DbCommand::GetExercise { uid, id, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| ReferenceDao::new(c).get_exercise(id)));
                }
                DbCommand::ListWorkoutTemplates { uid, respond_to } => {
                    let _ = respond_to.send(
                        self.conn(&uid)
                            .and_then(|c| ReferenceDao::new(c).list_workout_templates()),
                    );
                }
                DbCommand::ListTemplateDays { uid, template_id, respond_to } => {
                    let _ = respond_to.send(
                        self.conn(&uid)
                            .and_then(|c| ReferenceDao::new(c).list_template_days(template_id)),
                    );
                }
                DbCommand::LocalWrite { uid, write, respond_to } => {
                    let _ = respond_to.send(self.handle_local_write(&uid, write));
                }
                DbCommand::GetExerciseSet { uid, id, respond_to } => {
                    let _ = respond_to.send(self.conn(&uid).and_then(|c| WorkoutDao::new(c).get_set(id)));
                }
                DbCommand::GetWorkoutDay { uid, id, respond_to } => {
                    let _ = respond_to.send(self.conn(&uid).and_then(|c| WorkoutDao::new(c).get_day(id)));
                }
                DbCommand::ListSetsForDay { uid, day_id, respond_to } => {
                    let _ = respond_to
                        .send(self.conn(&uid).and_then(|c| WorkoutDao::new(c).list_sets_for_day(day_id)));
                }
                DbCommand::SaveUserWorkouts { uid, snapshot, respond_to } => {
                    let _ = respond_to.send(self.handle_save_user_workouts(&uid, &snapshot));
                }
                DbCommand::ListOutbox { uid, respond_to } => {
                    let _ = respond_to.send(self.conn(&uid).and_then(|c| SyncQueueDao::new(c).list_all()));
                }
                DbCommand::OutboxLen { uid, respond_to } => {
                    let _ = respond_to.send(self.conn(&uid).and_then(|c| SyncQueueDao::new(c).count()));
                }
                DbCommand::ResolveOutbox { uid, resolutions, respond_to } => {
                    let _ = respond_to.send(self.handle_resolve_outbox(&uid, &resolutions));
                }
                DbCommand::CloseUser { uid, respond_to } => {
                    let _ = respond_to.send(self.handle_close_user(&uid));
                }
            }
        }

        info!("✅ [Thread {:?}] DbActor 已停止", self.thread_id);
    }

    fn conn(&self, uid: &str) -> Result<&Connection> {
        self.connections
            .get(uid)
            .ok_or_else(|| LiftlogSDKError::NotInitialized(format!("用户数据库未初始化: {}", uid)))
    }

    /// 处理：初始化用户数据库
    fn handle_init_user(&mut self, uid: &str, db_path: &PathBuf) -> Result<()> {
        info!(
            "📥 [DbActor Thread {:?}] 接收命令: InitUser(uid={}, path={})",
            self.thread_id,
            uid,
            db_path.display()
        );

        if self.connections.contains_key(uid) {
            debug!("⚠️  [DbActor Thread {:?}] 用户已初始化，跳过: uid={}", self.thread_id, uid);
            return Ok(());
        }

        let mut conn = Connection::open(db_path).map_err(|e| {
            error!(
                "❌ [DbActor Thread {:?}] 打开数据库失败: uid={}, error={}",
                self.thread_id, uid, e
            );
            LiftlogSDKError::Database(format!("打开数据库失败: {}", e))
        })?;

        crate::storage::migrate::init_db(&mut conn)?;

        info!("✅ [DbActor Thread {:?}] 数据库初始化完成: uid={}", self.thread_id, uid);
        self.connections.insert(uid.to_string(), conn);
        Ok(())
    }

    /// 处理：写入一种参考数据（单事务）
    fn handle_upsert_reference(&self, uid: &str, batch: &ReferenceBatch, synced_at: i64) -> Result<usize> {
        let conn = self.conn(uid)?;
        let written = ReferenceDao::new(conn).upsert_batch(batch, synced_at)?;
        debug!(
            "💾 [DbActor Thread {:?}] 参考数据已写入: kind={}, rows={}",
            self.thread_id,
            batch.kind(),
            written
        );
        Ok(written)
    }

    /// 处理：本地写入 + outbox 追加（单事务）
    fn handle_local_write(&self, uid: &str, write: LocalWrite) -> Result<i64> {
        let conn = self.conn(uid)?;
        let now = now_millis();
        let tx = conn.unchecked_transaction()?;

        let intent = {
            let workouts = WorkoutDao::new(&tx);
            match write {
                LocalWrite::SetUpdate { set_id, patch } => {
                    if patch.is_empty() {
                        return Err(LiftlogSDKError::InvalidArgument("训练组修改为空".to_string()));
                    }
                    if workouts.apply_set_patch(set_id, &patch, now)? == 0 {
                        return Err(LiftlogSDKError::NotFound(format!("exercise_set {}", set_id)));
                    }
                    SyncIntent::SetUpdate { set_id, patch }
                }
                LocalWrite::DayComplete { day_id, completed_at } => {
                    if workouts.complete_day(day_id, completed_at, now)? == 0 {
                        return Err(LiftlogSDKError::NotFound(format!("user_workout_day {}", day_id)));
                    }
                    SyncIntent::DayComplete { day_id, completed_at }
                }
                LocalWrite::DayNotes { day_id, notes } => {
                    if workouts.update_day_notes(day_id, notes.as_deref(), now)? == 0 {
                        return Err(LiftlogSDKError::NotFound(format!("user_workout_day {}", day_id)));
                    }
                    SyncIntent::DayUpdate { day_id, notes }
                }
                LocalWrite::DayResync { day_id } => {
                    if workouts.mark_day_pending(day_id, now)? == 0 {
                        return Err(LiftlogSDKError::NotFound(format!("user_workout_day {}", day_id)));
                    }
                    let day = workouts
                        .get_day(day_id)?
                        .ok_or_else(|| LiftlogSDKError::NotFound(format!("user_workout_day {}", day_id)))?;
                    let sets = workouts.list_sets_for_day(day_id)?;
                    SyncIntent::DaySync { day_id, snapshot: DaySnapshot { day, sets } }
                }
            }
        };

        let entry = NewOutboxEntry::from_intent(&intent, now)?;
        let id = SyncQueueDao::new(&tx).insert(&entry)?;
        tx.commit()?;

        debug!(
            "📝 [DbActor Thread {:?}] 本地写入已入队: {} {} record_id={} outbox_id={}",
            self.thread_id, entry.table_name, entry.operation, entry.record_id, id
        );
        Ok(id)
    }

    /// 处理：保存服务端下发的用户数据（单事务，仍在 outbox 中的行保持本地值）
    fn handle_save_user_workouts(&self, uid: &str, snapshot: &UserWorkoutSnapshot) -> Result<SaveWorkoutsReport> {
        let conn = self.conn(uid)?;
        let tx = conn.unchecked_transaction()?;
        let mut report = SaveWorkoutsReport::default();
        {
            let workouts = WorkoutDao::new(&tx);
            for day in &snapshot.days {
                if workouts.upsert_day_unless_queued(day)? {
                    report.written += 1;
                } else {
                    report.skipped_pending += 1;
                }
            }
            for set in &snapshot.sets {
                if workouts.upsert_set_unless_queued(set)? {
                    report.written += 1;
                } else {
                    report.skipped_pending += 1;
                }
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// 处理：提交 outbox 处理结论
    ///
    /// Applied：删除该条；若同一记录已无其它待推送，标记 synced。
    /// Dropped：仅删除，sync_status 保持不变。
    fn handle_resolve_outbox(&self, uid: &str, resolutions: &[OutboxResolution]) -> Result<usize> {
        let conn = self.conn(uid)?;
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let queue = SyncQueueDao::new(&tx);
            let workouts = WorkoutDao::new(&tx);
            for r in resolutions {
                removed += queue.delete(r.entry_id)?;
                if r.resolution != Resolution::Applied {
                    continue;
                }
                if queue.count_for_record(&r.table_name, r.record_id)? > 0 {
                    debug!(
                        "⏳ {} {} 仍有待推送修改，保持 pending",
                        r.table_name, r.record_id
                    );
                    continue;
                }
                match r.table_name.parse::<EntityClass>() {
                    Ok(class) => {
                        workouts.set_sync_status(class, r.record_id, SyncStatus::Synced)?;
                    }
                    Err(_) => warn!("⚠️ 未知 table_name，跳过 synced 标记: {}", r.table_name),
                }
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn handle_close_user(&mut self, uid: &str) -> Result<()> {
        if let Some(conn) = self.connections.remove(uid) {
            conn.close()
                .map_err(|(_, e)| LiftlogSDKError::Database(format!("关闭数据库失败: {}", e)))?;
            info!("🔒 [DbActor Thread {:?}] 用户数据库已关闭: uid={}", self.thread_id, uid);
        }
        Ok(())
    }
}

/// 数据库 Actor 句柄（用于异步调用）
#[derive(Clone)]
pub struct DbActorHandle {
    sender: Sender<DbCommand>,
}

impl std::fmt::Debug for DbActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbActorHandle")
            .field("sender", &"<channel>")
            .finish()
    }
}

impl DbActorHandle {
    /// 启动 DB Actor
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = unbounded();

        thread::Builder::new()
            .name("db-actor".to_string())
            .spawn(move || {
                let actor = DbActor::new(receiver);
                actor.run();
            })
            .map_err(|e| LiftlogSDKError::Other(format!("无法启动 DB Actor 线程: {}", e)))?;

        Ok(Self { sender })
    }

    /// 发送命令并等待回复
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> DbCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .map_err(|_| LiftlogSDKError::Other("DB Actor 已停止".to_string()))?;
        rx.await
            .map_err(|_| LiftlogSDKError::Other("DB Actor 响应失败".to_string()))?
    }

    pub async fn init_user(&self, uid: String, db_path: PathBuf) -> Result<()> {
        self.request(|respond_to| DbCommand::InitUser { uid, db_path, respond_to }).await
    }

    pub async fn upsert_reference(&self, uid: String, batch: ReferenceBatch, synced_at: i64) -> Result<usize> {
        self.request(|respond_to| DbCommand::UpsertReference { uid, batch, synced_at, respond_to })
            .await
    }

    pub async fn reference_count(&self, uid: String, kind: ReferenceKind) -> Result<i64> {
        self.request(|respond_to| DbCommand::ReferenceCount { uid, kind, respond_to }).await
    }

    pub async fn reference_orphans(&self, uid: String) -> Result<i64> {
        self.request(|respond_to| DbCommand::ReferenceOrphans { uid, respond_to }).await
    }

    pub async fn list_equipment(&self, uid: String) -> Result<Vec<Equipment>> {
        self.request(|respond_to| DbCommand::ListEquipment { uid, respond_to }).await
    }

    pub async fn list_muscle_groups(&self, uid: String) -> Result<Vec<MuscleGroup>> {
        self.request(|respond_to| DbCommand::ListMuscleGroups { uid, respond_to }).await
    }

    pub async fn list_exercises(&self, uid: String) -> Result<Vec<Exercise>> {
        self.request(|respond_to| DbCommand::ListExercises { uid, respond_to }).await
    }

    pub async fn get_exercise(&self, uid: String, id: i64) -> Result<Option<Exercise>> {
        self.request(|respond_to| DbCommand::GetExercise { uid, id, respond_to }).await
    }

    pub async fn list_workout_templates(&self, uid: String) -> Result<Vec<WorkoutTemplate>> {
        self.request(|respond_to| DbCommand::ListWorkoutTemplates { uid, respond_to }).await
    }

    pub async fn list_template_days(&self, uid: String, template_id: i64) -> Result<Vec<TemplateDay>> {
        self.request(|respond_to| DbCommand::ListTemplateDays { uid, template_id, respond_to })
            .await
    }

    pub async fn local_write(&self, uid: String, write: LocalWrite) -> Result<i64> {
        self.request(|respond_to| DbCommand::LocalWrite { uid, write, respond_to }).await
    }

    pub async fn get_exercise_set(&self, uid: String, id: i64) -> Result<Option<ExerciseSet>> {
        self.request(|respond_to| DbCommand::GetExerciseSet { uid, id, respond_to }).await
    }

    pub async fn get_workout_day(&self, uid: String, id: i64) -> Result<Option<UserWorkoutDay>> {
        self.request(|respond_to| DbCommand::GetWorkoutDay { uid, id, respond_to }).await
    }

    pub async fn list_sets_for_day(&self, uid: String, day_id: i64) -> Result<Vec<ExerciseSet>> {
        self.request(|respond_to| DbCommand::ListSetsForDay { uid, day_id, respond_to }).await
    }

    pub async fn save_user_workouts(&self, uid: String, snapshot: UserWorkoutSnapshot) -> Result<SaveWorkoutsReport> {
        self.request(|respond_to| DbCommand::SaveUserWorkouts { uid, snapshot, respond_to })
            .await
    }

    pub async fn list_outbox(&self, uid: String) -> Result<Vec<OutboxEntry>> {
        self.request(|respond_to| DbCommand::ListOutbox { uid, respond_to }).await
    }

    pub async fn outbox_len(&self, uid: String) -> Result<i64> {
        self.request(|respond_to| DbCommand::OutboxLen { uid, respond_to }).await
    }

    pub async fn resolve_outbox(&self, uid: String, resolutions: Vec<OutboxResolution>) -> Result<usize> {
        self.request(|respond_to| DbCommand::ResolveOutbox { uid, resolutions, respond_to })
            .await
    }

    pub async fn close_user(&self, uid: String) -> Result<()> {
        self.request(|respond_to| DbCommand::CloseUser { uid, respond_to }).await
    }

    /// 停止 DB Actor
    pub fn shutdown(&self) {
        let _ = self.sender.send(DbCommand::Shutdown);
    }
}
