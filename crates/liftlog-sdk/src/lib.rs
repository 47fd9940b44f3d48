//! Liftlog SDK - 离线优先的训练记录同步引擎
//!
//! 本 SDK 提供：
//! - 💾 本地存储：SQLite（refinery 迁移）+ sled KV，按用户隔离
//! - 📦 持久化 Outbox：本地写入与待推送意图同一事务落盘
//! - 📡 网络状态监控：恢复可达时自动排空 Outbox
//! - 🔄 参考数据 Bootstrap：按外键依赖顺序全量拉取
//! - ⚙️ 事件系统：同步过程事件广播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use liftlog_sdk::{LiftlogConfig, LiftlogSDK, SetPatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LiftlogConfig::builder()
//!         .data_dir("/path/to/data")
//!         .base_url("https://api.example.com/v1")
//!         .access_token("token")
//!         .build();
//!
//!     let sdk = LiftlogSDK::initialize(config).await?;
//!     sdk.open_user("user123").await?;
//!
//!     // 离线也能写入；可达时后台推送
//!     sdk.record_set_update(42, SetPatch::completed(8, Some(80.0))).await?;
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod network;
pub mod remote;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

// 重新导出核心类型，方便使用
pub use error::{LiftlogSDKError, Result};
pub use events::{EventManager, SyncEvent};
pub use lifecycle::{LifecycleHook, LifecycleManager, SyncLifecycleHook};
pub use network::{ManualNetworkListener, NetworkMonitor, NetworkStatus, NetworkStatusEvent, NetworkStatusListener};
pub use remote::{ApplyOutcome, ApplyRequest, BatchOutcome, HttpRemoteService, RemoteError, RemoteService};
pub use sdk::{EventConfig, LiftlogConfig, LiftlogConfigBuilder, LiftlogSDK, RemoteConfig, SyncConfig};
pub use storage::entities::{
    Equipment, Exercise, ExerciseSet, MuscleGroup, SaveWorkoutsReport, SetPatch, SyncStatus, TemplateDay,
    UserWorkoutDay, UserWorkoutSnapshot, WorkoutTemplate,
};
pub use storage::queue::{
    BatchingStrategy, DrainMetrics, DrainReport, FailureReason, OutboxEntry, RetryPolicy, SyncIntent,
};
pub use storage::StorageManager;
pub use sync::{BootstrapReport, FlightOutcome, ReferenceKind, SyncCoordinator};
pub use utils::{format_millis, now_millis};
pub use version::{SDK_DB_VERSION, SDK_VERSION};
