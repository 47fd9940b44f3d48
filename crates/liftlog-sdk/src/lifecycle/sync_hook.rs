//! 同步模块生命周期 Hook
//!
//! 回到前台时在后台补一轮 drain 与 bootstrap；切到后台不动数据。

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::sync::SyncCoordinator;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SyncLifecycleHook {
    coordinator: Arc<SyncCoordinator>,
    bootstrap_on_foreground: bool,
}

impl SyncLifecycleHook {
    pub fn new(coordinator: Arc<SyncCoordinator>, bootstrap_on_foreground: bool) -> Self {
        Self { coordinator, bootstrap_on_foreground }
    }
}

#[async_trait]
impl LifecycleHook for SyncLifecycleHook {
    async fn on_background(&self) -> Result<()> {
        debug!("[Sync Hook] App 切换到后台，不做处理");
        Ok(())
    }

    /// 不等待网络：drain / bootstrap 在后台任务中执行
    async fn on_foreground(&self) -> Result<()> {
        info!("[Sync Hook] App 回到前台，后台触发 drain");
        let coordinator = self.coordinator.clone();
        let bootstrap = self.bootstrap_on_foreground;
        tokio::spawn(async move {
            if let Err(e) = coordinator.drain_now().await {
                warn!("[Sync Hook] ⚠️ drain 失败: {}", e);
            }
            if bootstrap {
                if let Err(e) = coordinator.bootstrap_now().await {
                    warn!("[Sync Hook] ⚠️ bootstrap 失败: {}", e);
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventManager;
    use crate::network::{ManualNetworkListener, NetworkMonitor, NetworkStatus};
    use crate::remote::mock::{MockRemoteService, RemoteCall};
    use crate::sdk::SyncConfig;
    use crate::storage::entities::SetPatch;
    use crate::storage::test_helpers::{open_storage, workout_snapshot};
    use crate::sync::bootstrap::test_helpers::seed_reference;
    use std::time::Duration;

    async fn setup(dir: &std::path::Path) -> (Arc<SyncCoordinator>, Arc<MockRemoteService>) {
        let storage = open_storage(dir).await;
        storage.save_user_workouts(workout_snapshot(7, &[10])).await.unwrap();
        storage.record_set_update(10, SetPatch::completed(8, None)).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        let network = Arc::new(NetworkMonitor::new(Arc::new(ManualNetworkListener::new(NetworkStatus::Online))));
        network.start().await.unwrap();
        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            storage,
            remote.clone(),
            network,
            Arc::new(EventManager::new(16)),
        );
        (coordinator, remote)
    }

    #[tokio::test]
    async fn foreground_drains_then_bootstraps() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, remote) = setup(dir.path()).await;
        let hook = SyncLifecycleHook::new(coordinator.clone(), true);

        hook.on_background().await.unwrap();
        assert_eq!(remote.call_count(), 0);

        hook.on_foreground().await.unwrap();
        for _ in 0..200 {
            if coordinator.is_bootstrap_completed().await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(coordinator.is_bootstrap_completed().await.unwrap());

        let calls = remote.calls();
        assert_eq!(calls[0], RemoteCall::Batch(vec![10]));
        assert!(calls[1..].iter().all(|c| matches!(c, RemoteCall::Pull(_))));
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn foreground_without_bootstrap_only_drains() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, remote) = setup(dir.path()).await;
        let hook = SyncLifecycleHook::new(coordinator.clone(), false);

        hook.on_foreground().await.unwrap();
        for _ in 0..200 {
            if remote.call_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(remote.calls(), vec![RemoteCall::Batch(vec![10])]);
        assert!(!coordinator.is_bootstrap_completed().await.unwrap());
        coordinator.shutdown();
    }
}
