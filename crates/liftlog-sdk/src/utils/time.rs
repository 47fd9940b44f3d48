//! 时间处理工具
//!
//! - **存储层**: 所有时间字段使用 UTC 毫秒时间戳（INTEGER）
//! - **业务层**: 统一使用 `now_millis()` 生成时间

use chrono::{DateTime, Utc};

/// 当前 UTC 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 毫秒时间戳转 RFC3339（日志/调试用），非法时间戳返回原始数字
pub fn format_millis(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
