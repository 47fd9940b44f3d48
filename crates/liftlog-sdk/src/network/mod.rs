use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::utils::now_millis;

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
    /// 连接中
    Connecting,
    /// 网络受限
    Limited,
}

impl NetworkStatus {
    /// 可达 = Online | Limited
    pub fn is_reachable(self) -> bool {
        matches!(self, NetworkStatus::Online | NetworkStatus::Limited)
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    /// 毫秒
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    pub fn new(old_status: NetworkStatus, new_status: NetworkStatus) -> Self {
        Self { old_status, new_status, timestamp: now_millis() }
    }

    /// 不可达 -> 可达 的边沿
    pub fn became_reachable(&self) -> bool {
        !self.old_status.is_reachable() && self.new_status.is_reachable()
    }
}

/// 网络状态监听器 trait（由平台层实现，如 Android/iOS）
#[async_trait]
pub trait NetworkStatusListener: Send + Sync + std::fmt::Debug {
    /// 获取当前网络状态
    async fn get_current_status(&self) -> NetworkStatus;

    /// 开始监听网络状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 网络监控管理器
#[derive(Debug)]
pub struct NetworkMonitor {
    listener: Arc<dyn NetworkStatusListener>,
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    current_status: Arc<tokio::sync::RwLock<NetworkStatus>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    pub fn new(listener: Arc<dyn NetworkStatusListener>) -> Self {
        let (status_sender, _) = broadcast::channel(100);

        Self {
            listener,
            status_sender,
            current_status: Arc::new(tokio::sync::RwLock::new(NetworkStatus::Offline)),
            forward_task: Mutex::new(None),
        }
    }

    /// 启动网络监控：先探测一次当前状态，再转发监听器的变化流
    pub async fn start(&self) -> Result<()> {
        let initial = self.listener.get_current_status().await;
        *self.current_status.write().await = initial;
        info!("📶 网络监控已启动，初始状态: {:?}", initial);

        let mut receiver = self.listener.start_monitoring().await?;
        let status_sender = self.status_sender.clone();
        let current_status = self.current_status.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("网络状态事件滞后，丢弃 {} 条", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                // old_status 以本地记录为准，避免平台事件与初始探测不一致
                let old_status = {
                    let mut status = current_status.write().await;
                    let old = *status;
                    *status = event.new_status;
                    old
                };
                if old_status == event.new_status {
                    continue;
                }
                let _ = status_sender.send(NetworkStatusEvent {
                    old_status,
                    new_status: event.new_status,
                    timestamp: event.timestamp,
                });
            }
        });

        if let Some(previous) = self.forward_task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// 停止监控
    pub async fn stop(&self) {
        self.listener.stop_monitoring().await;
        if let Some(handle) = self.forward_task.lock().take() {
            handle.abort();
        }
    }

    /// 获取当前网络状态
    pub async fn get_status(&self) -> NetworkStatus {
        *self.current_status.read().await
    }

    pub async fn is_reachable(&self) -> bool {
        self.get_status().await.is_reachable()
    }

    /// 手动设置网络状态（宿主已知连通性变化时直接调用）
    pub async fn set_status(&self, new_status: NetworkStatus) {
        let old_status = {
            let mut status = self.current_status.write().await;
            let old = *status;
            *status = new_status;
            old
        };
        if old_status == new_status {
            return;
        }
        let _ = self.status_sender.send(NetworkStatusEvent::new(old_status, new_status));
    }

    /// 订阅网络状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }
}

/// 由宿主手动驱动的监听器（宿主自己掌握连通性，或测试）
#[derive(Debug)]
pub struct ManualNetworkListener {
    status: Mutex<NetworkStatus>,
    sender: Mutex<Option<broadcast::Sender<NetworkStatusEvent>>>,
}

impl ManualNetworkListener {
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            status: Mutex::new(initial),
            sender: Mutex::new(None),
        }
    }

    /// 更新状态；监听中则推送一次变化事件
    pub fn set_status(&self, new_status: NetworkStatus) {
        let old_status = std::mem::replace(&mut *self.status.lock(), new_status);
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(NetworkStatusEvent::new(old_status, new_status));
        }
    }
}

impl Default for ManualNetworkListener {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}

#[async_trait]
impl NetworkStatusListener for ManualNetworkListener {
    async fn get_current_status(&self) -> NetworkStatus {
        *self.status.lock()
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>> {
        let (tx, rx) = broadcast::channel(16);
        *self.sender.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop_monitoring(&self) {
        *self.sender.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reachable_edge() {
        let up = NetworkStatusEvent::new(NetworkStatus::Offline, NetworkStatus::Online);
        assert!(up.became_reachable());
        let limited = NetworkStatusEvent::new(NetworkStatus::Connecting, NetworkStatus::Limited);
        assert!(limited.became_reachable());
        let same_side = NetworkStatusEvent::new(NetworkStatus::Limited, NetworkStatus::Online);
        assert!(!same_side.became_reachable());
        let down = NetworkStatusEvent::new(NetworkStatus::Online, NetworkStatus::Offline);
        assert!(!down.became_reachable());
    }

    #[tokio::test]
    async fn start_reads_initial_status() {
        let listener = Arc::new(ManualNetworkListener::new(NetworkStatus::Online));
        let monitor = NetworkMonitor::new(listener);
        assert!(!monitor.is_reachable().await);

        monitor.start().await.unwrap();
        assert!(monitor.is_reachable().await);
    }

    #[tokio::test]
    async fn forwards_platform_transitions() {
        let listener = Arc::new(ManualNetworkListener::new(NetworkStatus::Offline));
        let monitor = NetworkMonitor::new(listener.clone());
        monitor.start().await.unwrap();
        let mut rx = monitor.subscribe();

        listener.set_status(NetworkStatus::Online);
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.became_reachable());
        assert_eq!(monitor.get_status().await, NetworkStatus::Online);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn set_status_without_change_is_silent() {
        let monitor = NetworkMonitor::new(Arc::new(ManualNetworkListener::default()));
        let mut rx = monitor.subscribe();

        monitor.set_status(NetworkStatus::Offline).await;
        assert!(rx.try_recv().is_err());

        monitor.set_status(NetworkStatus::Online).await;
        assert!(rx.try_recv().unwrap().became_reachable());
    }
}
