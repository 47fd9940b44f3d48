//! 事件系统模块 - 同步过程对外广播
//!
//! 功能包括：
//! - 连通性变化事件
//! - Bootstrap 完成 / 失败 / 跳过事件
//! - Outbox 排空结果与永久拒绝（丢弃）事件
//!
//! 无订阅者不是错误；事件只描述发生了什么，不把同步失败当作 UI 错误抛出。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::network::NetworkStatus;
use crate::utils::now_millis;

/// SDK 同步事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 网络状态变化
    ConnectivityChanged {
        old_status: NetworkStatus,
        new_status: NetworkStatus,
        timestamp: i64,
    },
    /// Bootstrap 全部类型拉取成功
    BootstrapCompleted {
        /// (参考数据类型, 写入行数)
        rows: Vec<(String, usize)>,
        timestamp: i64,
    },
    /// Bootstrap 中途失败（之前已提交的类型保留）
    BootstrapFailed {
        kind: String,
        reason: String,
        timestamp: i64,
    },
    /// 不可达，Bootstrap 整体跳过
    BootstrapSkipped { timestamp: i64 },
    /// 一轮排空结束
    DrainCompleted {
        attempted: usize,
        applied: usize,
        dropped: usize,
        retained: usize,
        timestamp: i64,
    },
    /// 一条 outbox 被永久拒绝并丢弃
    EntryDropped {
        entry_id: i64,
        table_name: String,
        operation: String,
        record_id: i64,
        reason: String,
        timestamp: i64,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ConnectivityChanged { .. } => "connectivity_changed",
            SyncEvent::BootstrapCompleted { .. } => "bootstrap_completed",
            SyncEvent::BootstrapFailed { .. } => "bootstrap_failed",
            SyncEvent::BootstrapSkipped { .. } => "bootstrap_skipped",
            SyncEvent::DrainCompleted { .. } => "drain_completed",
            SyncEvent::EntryDropped { .. } => "entry_dropped",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            SyncEvent::ConnectivityChanged { timestamp, .. }
            | SyncEvent::BootstrapCompleted { timestamp, .. }
            | SyncEvent::BootstrapFailed { timestamp, .. }
            | SyncEvent::BootstrapSkipped { timestamp }
            | SyncEvent::DrainCompleted { timestamp, .. }
            | SyncEvent::EntryDropped { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
    /// 最后事件时间
    pub last_event_time: Option<i64>,
}

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SyncEvent>,
    /// 事件监听器映射（"*" 为通用监听器）
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("📣 发布事件: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("事件无活跃订阅者: {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器（`event_type` 为 "*" 时监听全部）
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_insert_with(Vec::new)
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn clear_listeners(&self) {
        self.listeners.write().await.clear();
        self.stats.write().await.listener_count = 0;
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 事件生成器
pub mod event_builders {
    use super::*;

    pub fn connectivity_changed(old_status: NetworkStatus, new_status: NetworkStatus) -> SyncEvent {
        SyncEvent::ConnectivityChanged { old_status, new_status, timestamp: now_millis() }
    }

    pub fn bootstrap_completed(rows: Vec<(String, usize)>) -> SyncEvent {
        SyncEvent::BootstrapCompleted { rows, timestamp: now_millis() }
    }

    pub fn bootstrap_failed(kind: &str, reason: &str) -> SyncEvent {
        SyncEvent::BootstrapFailed {
            kind: kind.to_string(),
            reason: reason.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn bootstrap_skipped() -> SyncEvent {
        SyncEvent::BootstrapSkipped { timestamp: now_millis() }
    }

    pub fn drain_completed(attempted: usize, applied: usize, dropped: usize, retained: usize) -> SyncEvent {
        SyncEvent::DrainCompleted {
            attempted,
            applied,
            dropped,
            retained,
            timestamp: now_millis(),
        }
    }

    pub fn entry_dropped(
        entry_id: i64,
        table_name: &str,
        operation: &str,
        record_id: i64,
        reason: &str,
    ) -> SyncEvent {
        SyncEvent::EntryDropped {
            entry_id,
            table_name: table_name.to_string(),
            operation: operation.to_string(),
            record_id,
            reason: reason.to_string(),
            timestamp: now_millis(),
        }
    }
}
