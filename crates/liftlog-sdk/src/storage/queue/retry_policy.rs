use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 推送失败原因分类
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FailureReason {
    /// 网络超时 - 可重试
    NetworkTimeout,
    /// 网络不可用 - 等待恢复后重试
    NetworkUnavailable,
    /// 服务端错误（5xx）- 可重试
    ServerError(u16),
    /// 认证失败 - 重新登录后可重试
    AuthFailure,
    /// 限流 - 延迟重试
    RateLimited,
    /// 目标已不存在 - 不重试
    NotFound,
    /// 请求格式错误（包括本地无法解码的 outbox 行）- 不重试
    Malformed(String),
    /// 权限不足 - 不重试
    Forbidden,
    /// 与服务端状态冲突 - 不重试
    Conflict,
    /// 未知错误
    Unknown(String),
}

impl FailureReason {
    /// 判断是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureReason::NetworkTimeout => true,
            FailureReason::NetworkUnavailable => true,
            FailureReason::ServerError(code) => *code >= 500 && *code < 600,
            FailureReason::AuthFailure => true,
            FailureReason::RateLimited => true,
            FailureReason::NotFound => false,
            FailureReason::Malformed(_) => false,
            FailureReason::Forbidden => false,
            FailureReason::Conflict => false,
            FailureReason::Unknown(_) => true, // 保守策略：未知错误保留重试
        }
    }

    /// 按 HTTP 状态码分类（2xx 返回 None）
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            200..=299 => None,
            401 => Some(FailureReason::AuthFailure),
            403 => Some(FailureReason::Forbidden),
            404 | 410 => Some(FailureReason::NotFound),
            408 => Some(FailureReason::NetworkTimeout),
            409 => Some(FailureReason::Conflict),
            429 => Some(FailureReason::RateLimited),
            400 | 422 => Some(FailureReason::Malformed(format!("HTTP {}", code))),
            500..=599 => Some(FailureReason::ServerError(code)),
            other => Some(FailureReason::Unknown(format!("HTTP {}", other))),
        }
    }

    /// 获取重试延迟倍数
    pub fn get_delay_multiplier(&self) -> f64 {
        match self {
            FailureReason::NetworkTimeout => 1.0,
            FailureReason::NetworkUnavailable => 2.0,
            FailureReason::ServerError(_) => 1.5,
            FailureReason::AuthFailure => 0.5,
            FailureReason::RateLimited => 3.0,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NetworkTimeout => f.write_str("network timeout"),
            FailureReason::NetworkUnavailable => f.write_str("network unavailable"),
            FailureReason::ServerError(code) => write!(f, "server error {}", code),
            FailureReason::AuthFailure => f.write_str("auth failure"),
            FailureReason::RateLimited => f.write_str("rate limited"),
            FailureReason::NotFound => f.write_str("not found"),
            FailureReason::Malformed(msg) => write!(f, "malformed: {}", msg),
            FailureReason::Forbidden => f.write_str("forbidden"),
            FailureReason::Conflict => f.write_str("conflict"),
            FailureReason::Unknown(msg) => write!(f, "unknown: {}", msg),
        }
    }
}

/// 重试调度策略（作用于整轮 drain，而非单条 outbox）
///
/// 单条 outbox 没有重试上限；`max_retries = None` 表示调度器一直重试直到成功或永久拒绝。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大连续重试轮数，None 为不限
    pub max_retries: Option<u32>,
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay_ms: 2_000,
            max_delay_ms: 300_000, // 5分钟
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次（从 0 开始）连续失败后，距下一轮的等待时间
    pub fn next_delay(&self, attempt: u32, reason: Option<&FailureReason>) -> Option<Duration> {
        if let Some(max) = self.max_retries {
            if attempt >= max {
                return None;
            }
        }

        // 基础延迟 = base_delay * (backoff_factor ^ attempt)
        let base_delay = self.base_delay_ms as f64 * self.backoff_factor.powf(attempt.min(32) as f64);
        let adjusted_delay = base_delay * reason.map(|r| r.get_delay_multiplier()).unwrap_or(1.0);
        let capped_delay = adjusted_delay.min(self.max_delay_ms as f64);

        let jitter = capped_delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (capped_delay + jitter).max(0.0);

        Some(Duration::from_millis(final_delay as u64))
    }
}
