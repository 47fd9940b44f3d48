//! 同步模块
//!
//! 职责：
//! - 参考数据 Bootstrap（按外键依赖顺序全量拉取）
//! - 用户数据 Outbox 排空调度（启动 / 网络恢复 / 本地写入 / 退避重试）
//! - 同步元信息（bootstrap 完成标记、各类型最近拉取时间）

pub mod applier;
pub mod bootstrap;
pub mod coordinator;
pub mod meta_store;
pub mod reference_kind;
pub mod single_flight;

pub use bootstrap::{BootstrapPuller, BootstrapReport, BOOTSTRAP_ORDER};
pub use coordinator::SyncCoordinator;
pub use meta_store::{SyncMetaStore, BOOTSTRAP_COMPLETED_KEY};
pub use reference_kind::ReferenceKind;
pub use single_flight::{FlightOutcome, SingleFlight};
