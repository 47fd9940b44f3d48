//! 统一 SDK 接口 - LiftlogSDK 主入口
//!
//! 分层架构设计：
//! ```text
//! LiftlogSDK (业务逻辑层)
//!     ├── StorageManager (存储层：DbActor + per-user sled KV)
//!     ├── NetworkMonitor (连通性)
//!     ├── RemoteService (远端，默认 HttpRemoteService)
//!     ├── SyncCoordinator (Bootstrap / Outbox 排空调度)
//!     ├── EventManager (事件层)
//!     └── LifecycleManager (前后台)
//! ```
//!
//! 所有写入先落本地（实体 + outbox 同一事务），再在后台触发一次 drain；
//! 写入路径从不等待网络。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::error::{LiftlogSDKError, Result};
use crate::events::{EventManager, SyncEvent};
use crate::lifecycle::{LifecycleHook, LifecycleManager, SyncLifecycleHook};
use crate::network::{ManualNetworkListener, NetworkMonitor, NetworkStatus, NetworkStatusListener};
use crate::remote::{HttpRemoteService, RemoteService};
use crate::storage::entities::{
    Equipment, Exercise, ExerciseSet, MuscleGroup, SaveWorkoutsReport, SetPatch, TemplateDay,
    UserWorkoutDay, WorkoutTemplate,
};
use crate::storage::queue::{BatchingStrategy, DrainMetrics, DrainReport, OutboxDrainerConfig, RetryPolicy};
use crate::storage::StorageManager;
use crate::sync::{BootstrapReport, FlightOutcome, SyncCoordinator};

/// 远端服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API 基础 URL，例如 https://api.example.com/v1
    pub base_url: String,
    /// Bearer token
    pub access_token: Option<String>,
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            access_token: None,
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 单次远端调用超时（毫秒），超时按暂时失败处理
    pub remote_call_timeout_ms: u64,
    pub batching: BatchingStrategy,
    pub max_batch_size: usize,
    /// 有暂时失败时是否按退避自动重试
    pub retry_enabled: bool,
    pub retry_policy: RetryPolicy,
    /// 本地写入后是否立即在后台 drain
    pub drain_on_write: bool,
    /// 回到前台时是否补跑 bootstrap
    pub bootstrap_on_foreground: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_call_timeout_ms: 30_000,
            batching: BatchingStrategy::Partition,
            max_batch_size: 100,
            retry_enabled: true,
            retry_policy: RetryPolicy::default(),
            drain_on_write: true,
            bootstrap_on_foreground: true,
        }
    }
}

impl SyncConfig {
    pub fn drainer_config(&self) -> OutboxDrainerConfig {
        OutboxDrainerConfig {
            remote_call_timeout_ms: self.remote_call_timeout_ms,
            batching: self.batching,
            max_batch_size: self.max_batch_size,
        }
    }
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件缓冲区大小
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Liftlog SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftlogConfig {
    /// 数据存储目录（其下为 users/{uid}/）
    pub data_dir: PathBuf,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub event_config: EventConfig,
    /// 调试模式
    pub debug_mode: bool,
}

impl Default for LiftlogConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
            event_config: EventConfig::default(),
            debug_mode: false,
        }
    }
}

/// 获取默认数据目录 ~/.liftlog/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".liftlog")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        // Windows 支持
        home_dir.join(".liftlog")
    } else {
        PathBuf::from("./liftlog_data")
    }
}

impl LiftlogConfig {
    pub fn builder() -> LiftlogConfigBuilder {
        LiftlogConfigBuilder::new()
    }

    /// 从 JSON 文件加载
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LiftlogSDKError::Config(format!("读取配置文件失败: {}", e)))?;
        serde_json::from_str(&raw).map_err(|e| LiftlogSDKError::Config(format!("解析配置文件失败: {}", e)))
    }
}

/// Liftlog SDK 配置构建器
pub struct LiftlogConfigBuilder {
    config: LiftlogConfig,
}

impl Default for LiftlogConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiftlogConfigBuilder {
    pub fn new() -> Self {
        Self { config: LiftlogConfig::default() }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.remote.access_token = Some(token.into());
        self
    }

    pub fn remote_config(mut self, config: RemoteConfig) -> Self {
        self.config.remote = config;
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.config.sync = config;
        self
    }

    pub fn batching(mut self, strategy: BatchingStrategy) -> Self {
        self.config.sync.batching = strategy;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.sync.retry_policy = policy;
        self
    }

    pub fn event_config(mut self, config: EventConfig) -> Self {
        self.config.event_config = config;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> LiftlogConfig {
        self.config
    }
}

/// 验证配置
pub fn validate_config(config: &LiftlogConfig) -> Result<()> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(LiftlogSDKError::Config("数据目录不能为空".to_string()));
    }
    let base_url = config.remote.base_url.trim();
    if base_url.is_empty() {
        return Err(LiftlogSDKError::Config("远端 base_url 不能为空".to_string()));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(LiftlogSDKError::Config(format!("不支持的 base_url: {}", base_url)));
    }
    if config.sync.remote_call_timeout_ms == 0 {
        return Err(LiftlogSDKError::Config("remote_call_timeout_ms 不能为0".to_string()));
    }
    if config.sync.max_batch_size == 0 {
        return Err(LiftlogSDKError::Config("max_batch_size 不能为0".to_string()));
    }
    let policy = &config.sync.retry_policy;
    if policy.backoff_factor < 1.0 || !(0.0..=1.0).contains(&policy.jitter_factor) {
        return Err(LiftlogSDKError::Config("重试退避参数非法".to_string()));
    }
    if config.event_config.buffer_size == 0 {
        return Err(LiftlogSDKError::Config("事件缓冲区大小不能为0".to_string()));
    }
    Ok(())
}

/// 初始化日志（重复调用无副作用）
pub fn init_logging(debug: bool) {
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// 统一 SDK 主接口
pub struct LiftlogSDK {
    config: LiftlogConfig,
    storage: Arc<StorageManager>,
    network: Arc<NetworkMonitor>,
    event_manager: Arc<EventManager>,
    coordinator: Arc<SyncCoordinator>,
    lifecycle_manager: RwLock<LifecycleManager>,
    shutting_down: AtomicBool,
}

impl LiftlogSDK {
    /// 初始化 SDK：HTTP 远端 + 由宿主驱动的网络状态（初始为在线）
    pub async fn initialize(config: LiftlogConfig) -> Result<Arc<Self>> {
        validate_config(&config)?;
        let remote: Arc<dyn RemoteService> = Arc::new(HttpRemoteService::new(&config.remote)?);
        let listener: Arc<dyn NetworkStatusListener> = Arc::new(ManualNetworkListener::default());
        Self::initialize_with(config, listener, remote).await
    }

    /// 初始化 SDK，注入平台网络监听器与远端实现
    ///
    /// 分层初始化顺序：
    /// 1. 存储层 → 2. 网络层 → 3. 事件层 → 4. 同步层 → 5. 生命周期
    pub async fn initialize_with(
        config: LiftlogConfig,
        network_listener: Arc<dyn NetworkStatusListener>,
        remote: Arc<dyn RemoteService>,
    ) -> Result<Arc<Self>> {
        validate_config(&config)?;
        if config.debug_mode {
            init_logging(true);
        }
        info!(
            "正在初始化 LiftlogSDK v{} (build {})...",
            crate::version::SDK_VERSION,
            crate::version::BUILD_TIME
        );

        // === 第1层：存储管理器 ===
        let storage = Arc::new(StorageManager::new(&config.data_dir).await?);

        // === 第2层：网络监控 ===
        let network = Arc::new(NetworkMonitor::new(network_listener));
        network.start().await?;

        // === 第3层：事件管理器 ===
        let event_manager = Arc::new(EventManager::new(config.event_config.buffer_size));

        // === 第4层：同步协调器 ===
        let coordinator = SyncCoordinator::new(
            config.sync.clone(),
            storage.clone(),
            remote,
            network.clone(),
            event_manager.clone(),
        );

        // === 第5层：生命周期（自动注册同步 Hook）===
        let mut lifecycle_manager = LifecycleManager::new();
        lifecycle_manager.register_hook(Arc::new(SyncLifecycleHook::new(
            coordinator.clone(),
            config.sync.bootstrap_on_foreground,
        )));

        info!("✅ LiftlogSDK 初始化完成");
        Ok(Arc::new(Self {
            config,
            storage,
            network,
            event_manager,
            coordinator,
            lifecycle_manager: RwLock::new(lifecycle_manager),
            shutting_down: AtomicBool::new(false),
        }))
    }

    fn ensure_not_shutting_down(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(LiftlogSDKError::ShuttingDown("SDK 正在关闭".to_string()));
        }
        Ok(())
    }

    pub fn config(&self) -> &LiftlogConfig {
        &self.config
    }

    /// 打开用户：初始化 users/{uid}/ 下的存储，然后执行启动同步
    pub async fn open_user(&self, uid: &str) -> Result<()> {
        self.ensure_not_shutting_down()?;
        self.storage.init_user(uid).await?;
        self.coordinator.start().await
    }

    pub async fn current_uid(&self) -> Result<String> {
        self.storage.current_uid().await
    }

    // ========== 参考数据（只读） ==========

    pub async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        self.storage.list_equipment().await
    }

    pub async fn list_muscle_groups(&self) -> Result<Vec<MuscleGroup>> {
        self.storage.list_muscle_groups().await
    }

    pub async fn list_exercises(&self) -> Result<Vec<Exercise>> {
        self.storage.list_exercises().await
    }

    pub async fn get_exercise(&self, id: i64) -> Result<Option<Exercise>> {
        self.storage.get_exercise(id).await
    }

    pub async fn list_workout_templates(&self) -> Result<Vec<WorkoutTemplate>> {
        self.storage.list_workout_templates().await
    }

    pub async fn list_template_days(&self, template_id: i64) -> Result<Vec<TemplateDay>> {
        self.storage.list_template_days(template_id).await
    }

    // ========== 用户训练数据 ==========

    pub async fn get_workout_day(&self, id: i64) -> Result<Option<UserWorkoutDay>> {
        self.storage.get_workout_day(id).await
    }

    pub async fn get_exercise_set(&self, id: i64) -> Result<Option<ExerciseSet>> {
        self.storage.get_exercise_set(id).await
    }

    pub async fn list_sets_for_day(&self, day_id: i64) -> Result<Vec<ExerciseSet>> {
        self.storage.list_sets_for_day(day_id).await
    }

    /// 修改训练组，返回 outbox id
    pub async fn record_set_update(&self, set_id: i64, patch: SetPatch) -> Result<i64> {
        self.ensure_not_shutting_down()?;
        let id = self.storage.record_set_update(set_id, patch).await?;
        self.trigger_drain().await;
        Ok(id)
    }

    /// 完成训练日，返回 outbox id
    pub async fn complete_workout_day(&self, day_id: i64, completed_at: i64) -> Result<i64> {
        self.ensure_not_shutting_down()?;
        let id = self.storage.complete_workout_day(day_id, completed_at).await?;
        self.trigger_drain().await;
        Ok(id)
    }

    pub async fn update_workout_day_notes(&self, day_id: i64, notes: Option<String>) -> Result<i64> {
        self.ensure_not_shutting_down()?;
        let id = self.storage.update_workout_day_notes(day_id, notes).await?;
        self.trigger_drain().await;
        Ok(id)
    }

    /// 整日快照重推
    pub async fn resync_workout_day(&self, day_id: i64) -> Result<i64> {
        self.ensure_not_shutting_down()?;
        let id = self.storage.resync_workout_day(day_id).await?;
        self.trigger_drain().await;
        Ok(id)
    }

    /// 待推送条数
    pub async fn pending_count(&self) -> Result<i64> {
        self.storage.outbox_len().await
    }

    /// 写入后在后台 drain（不可达时不触发，等网络恢复边沿）
    async fn trigger_drain(&self) {
        if !self.config.sync.drain_on_write || !self.network.is_reachable().await {
            return;
        }
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.drain_now().await {
                warn!("⚠️ 写入后 drain 失败: {}", e);
            }
        });
    }

    // ========== 同步 ==========

    pub async fn drain_now(&self) -> Result<FlightOutcome<DrainReport>> {
        self.coordinator.drain_now().await
    }

    pub async fn bootstrap_now(&self) -> Result<FlightOutcome<BootstrapReport>> {
        self.coordinator.bootstrap_now().await
    }

    pub async fn refresh_user_workouts(&self) -> Result<Option<SaveWorkoutsReport>> {
        self.coordinator.refresh_user_workouts().await
    }

    pub async fn is_bootstrap_completed(&self) -> Result<bool> {
        self.coordinator.is_bootstrap_completed().await
    }

    pub async fn drain_metrics(&self) -> DrainMetrics {
        self.coordinator.drain_metrics().await
    }

    // ========== 网络 / 事件 / 生命周期 ==========

    /// 宿主上报网络状态变化
    pub async fn set_network_status(&self, status: NetworkStatus) {
        self.network.set_status(status).await;
    }

    pub async fn network_status(&self) -> NetworkStatus {
        self.network.get_status().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_manager.subscribe()
    }

    pub fn event_manager(&self) -> Arc<EventManager> {
        self.event_manager.clone()
    }

    pub async fn register_lifecycle_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.lifecycle_manager.write().await.register_hook(hook);
    }

    pub async fn on_app_foreground(&self) -> Result<()> {
        self.ensure_not_shutting_down()?;
        self.lifecycle_manager.read().await.notify_foreground().await
    }

    pub async fn on_app_background(&self) -> Result<()> {
        self.lifecycle_manager.read().await.notify_background().await
    }

    /// 关闭 SDK
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("SDK 已在关闭");
            return Ok(());
        }
        info!("正在关闭 LiftlogSDK...");

        self.coordinator.shutdown();
        self.network.stop().await;
        self.storage.close_user().await?;
        self.storage.shutdown();

        info!("LiftlogSDK 关闭完成");
        Ok(())
    }
}
