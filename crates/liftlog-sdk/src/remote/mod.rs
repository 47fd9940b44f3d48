//! 远端服务契约
//!
//! 远端对 SDK 来说是不透明的 apply 函数：
//! - 拉取：按参考数据类型返回完整集合
//! - 推送：单条 apply / 训练组批量 apply，结果为 [`ApplyOutcome`]
//!
//! 推送必须幂等：同一条 outbox 可能在「远端已应用、本地未提交删除」后被重放，
//! 每次调用都携带该条 outbox 的 `idempotency_key`。

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpRemoteService;
#[cfg(test)]
pub use mock::MockRemoteService;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::entities::UserWorkoutSnapshot;
use crate::storage::queue::{FailureReason, SyncIntent};
use crate::sync::ReferenceKind;

/// 远端调用错误（拉取方向）
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("remote call timed out")]
    Timeout,
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote returned HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("remote payload decode failed: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            RemoteError::Timeout => FailureReason::NetworkTimeout,
            RemoteError::Unreachable(_) => FailureReason::NetworkUnavailable,
            RemoteError::Status { code, message } => FailureReason::from_status(*code)
                .unwrap_or_else(|| FailureReason::Unknown(message.clone())),
            RemoteError::Decode(msg) => FailureReason::Malformed(msg.clone()),
        }
    }
}

/// 单条推送的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// 远端已应用
    Applied,
    /// 永久拒绝（目标不存在 / 请求非法 / 无权限），不再重试
    Rejected(FailureReason),
    /// 暂时失败（超时 / 5xx / 连接断开），下轮重试
    Transient(FailureReason),
}

impl ApplyOutcome {
    /// 按失败原因归类为 Rejected 或 Transient
    pub fn failed(reason: FailureReason) -> Self {
        if reason.is_retryable() {
            ApplyOutcome::Transient(reason)
        } else {
            ApplyOutcome::Rejected(reason)
        }
    }
}

/// 批量推送的结果：整批一个结论，或按顺序逐条结论
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Whole(ApplyOutcome),
    PerItem(Vec<ApplyOutcome>),
}

/// 一次推送请求
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    pub entry_id: i64,
    pub idempotency_key: String,
    pub intent: SyncIntent,
}

/// 远端服务（由 SDK 注入，测试中替换为脚本化实现）
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// 拉取某类参考数据的完整集合（原始 JSON 行，由 applier 解析）
    async fn pull(&self, kind: ReferenceKind) -> Result<Vec<serde_json::Value>, RemoteError>;

    /// 单条推送
    async fn apply(&self, request: &ApplyRequest) -> ApplyOutcome;

    /// 训练组批量推送（请求均为 `SyncIntent::SetUpdate`，保持顺序）
    async fn apply_set_batch(&self, requests: &[ApplyRequest]) -> BatchOutcome;

    /// 拉取当前用户的训练日与训练组
    async fn pull_user_workouts(&self) -> Result<UserWorkoutSnapshot, RemoteError>;
}
