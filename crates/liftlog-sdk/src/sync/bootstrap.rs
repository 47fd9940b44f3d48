//! 启动同步（Bootstrap）
//!
//! 按 [`BOOTSTRAP_ORDER`] 串行拉取每种参考数据的完整集合，每种类型一个事务写入。
//! - 不可达：整轮跳过，不算错误
//! - 远端失败 / 超时 / 解析失败：中止本轮剩余类型，已提交的类型保留
//! - 本地存储失败：向上返回
//!
//! 本层不做重试，由协调器在下一次触发时重新执行。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::applier::parse_reference_batch;
use super::meta_store::SyncMetaStore;
use super::ReferenceKind;
use crate::error::Result;
use crate::events::{event_builders, EventManager};
use crate::network::NetworkMonitor;
use crate::remote::{RemoteError, RemoteService};
use crate::storage::StorageManager;
use crate::utils::now_millis;

/// 拉取顺序：每种类型都排在其外键目标之后
pub const BOOTSTRAP_ORDER: &[ReferenceKind] = &[
    ReferenceKind::Equipment,
    ReferenceKind::MuscleGroup,
    ReferenceKind::Exercise,
    ReferenceKind::ExerciseEquipment,
    ReferenceKind::ExerciseSecondaryMuscle,
    ReferenceKind::WorkoutTemplate,
    ReferenceKind::TemplateDay,
    ReferenceKind::TemplateDayMuscle,
];

/// 一轮 Bootstrap 的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    /// 不可达而整轮跳过
    pub skipped_offline: bool,
    /// 已提交的类型及写入行数（按拉取顺序）
    pub completed: Vec<(ReferenceKind, usize)>,
    /// 中止本轮的类型与原因
    pub failed: Option<(ReferenceKind, RemoteError)>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        !self.skipped_offline && self.failed.is_none()
    }
}

pub struct BootstrapPuller {
    storage: Arc<StorageManager>,
    remote: Arc<dyn RemoteService>,
    network: Arc<NetworkMonitor>,
    events: Arc<EventManager>,
    remote_call_timeout: Duration,
}

impl BootstrapPuller {
    pub fn new(
        storage: Arc<StorageManager>,
        remote: Arc<dyn RemoteService>,
        network: Arc<NetworkMonitor>,
        events: Arc<EventManager>,
        remote_call_timeout: Duration,
    ) -> Self {
        Self { storage, remote, network, events, remote_call_timeout }
    }

    async fn meta(&self) -> Result<SyncMetaStore> {
        Ok(SyncMetaStore::new(self.storage.kv_store().await?))
    }

    /// 是否已完整执行过一次
    pub async fn is_bootstrap_completed(&self) -> Result<bool> {
        Ok(self.meta().await?.bootstrap_completed_at().await?.is_some())
    }

    async fn pull_kind(&self, kind: ReferenceKind) -> std::result::Result<crate::storage::entities::ReferenceBatch, RemoteError> {
        let rows = tokio::time::timeout(self.remote_call_timeout, self.remote.pull(kind))
            .await
            .map_err(|_| RemoteError::Timeout)??;
        parse_reference_batch(kind, rows)
    }

    /// 执行一轮 Bootstrap
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        if !self.network.is_reachable().await {
            info!("📴 网络不可达，跳过 bootstrap");
            report.skipped_offline = true;
            self.events.emit(event_builders::bootstrap_skipped()).await;
            return Ok(report);
        }

        let meta = self.meta().await?;
        for &kind in BOOTSTRAP_ORDER {
            info!("🔄 bootstrap 拉取: {}", kind);
            let batch = match self.pull_kind(kind).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("❌ bootstrap 在 {} 中止: {}", kind, e);
                    self.events
                        .emit(event_builders::bootstrap_failed(kind.as_str(), &e.to_string()))
                        .await;
                    report.failed = Some((kind, e));
                    return Ok(report);
                }
            };

            let now = now_millis();
            let written = self.storage.upsert_reference(batch, now).await?;
            meta.set_last_pulled(kind, now).await?;
            report.completed.push((kind, written));
        }

        meta.mark_bootstrap_completed(now_millis()).await?;
        info!("✅ bootstrap 完成: {:?}", report.completed);
        self.events
            .emit(event_builders::bootstrap_completed(
                report
                    .completed
                    .iter()
                    .map(|(k, n)| (k.as_str().to_string(), *n))
                    .collect(),
            ))
            .await;
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::seed_reference;
    use super::*;
    use crate::network::{ManualNetworkListener, NetworkStatus};
    use crate::remote::mock::RemoteCall;
    use crate::remote::MockRemoteService;
    use crate::storage::test_helpers::open_storage;

    async fn puller(
        storage: Arc<StorageManager>,
        remote: Arc<MockRemoteService>,
        status: NetworkStatus,
    ) -> BootstrapPuller {
        let network = Arc::new(NetworkMonitor::new(Arc::new(ManualNetworkListener::new(status))));
        network.start().await.unwrap();
        BootstrapPuller::new(
            storage,
            remote,
            network,
            Arc::new(EventManager::new(16)),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn order_respects_dependencies() {
        for (i, kind) in BOOTSTRAP_ORDER.iter().enumerate() {
            for dep in kind.depends_on() {
                let pos = BOOTSTRAP_ORDER.iter().position(|k| k == dep).unwrap();
                assert!(pos < i, "{} must come after {}", kind, dep);
            }
        }
    }

    #[tokio::test]
    async fn offline_first_launch_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        let puller = puller(storage.clone(), remote.clone(), NetworkStatus::Offline).await;

        let report = puller.run().await.unwrap();
        assert!(report.skipped_offline);
        assert_eq!(remote.call_count(), 0);
        assert!(storage.list_exercises().await.unwrap().is_empty());
        assert!(storage.list_muscle_groups().await.unwrap().is_empty());
        assert!(!puller.is_bootstrap_completed().await.unwrap());
    }

    #[tokio::test]
    async fn full_bootstrap_leaves_no_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        let puller = puller(storage.clone(), remote.clone(), NetworkStatus::Online).await;

        let report = puller.run().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.completed.len(), BOOTSTRAP_ORDER.len());
        let pulled: Vec<RemoteCall> = BOOTSTRAP_ORDER.iter().map(|&k| RemoteCall::Pull(k)).collect();
        assert_eq!(remote.calls(), pulled);

        assert_eq!(storage.count_reference_orphans().await.unwrap(), 0);
        assert_eq!(storage.reference_count(ReferenceKind::MuscleGroup).await.unwrap(), 2);
        assert!(puller.is_bootstrap_completed().await.unwrap());

        // 再跑一次：行数不变
        puller.run().await.unwrap();
        assert_eq!(storage.reference_count(ReferenceKind::MuscleGroup).await.unwrap(), 2);
        assert_eq!(storage.count_reference_orphans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_aborts_rest_but_keeps_earlier_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        remote.fail_pull(
            ReferenceKind::Exercise,
            RemoteError::Status { code: 503, message: "unavailable".into() },
        );
        let puller = puller(storage.clone(), remote.clone(), NetworkStatus::Online).await;

        let report = puller.run().await.unwrap();
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed.as_ref().map(|(k, _)| *k), Some(ReferenceKind::Exercise));
        assert_eq!(remote.call_count(), 3);
        assert_eq!(storage.list_equipment().await.unwrap().len(), 1);
        assert!(storage.list_exercises().await.unwrap().is_empty());
        assert!(!puller.is_bootstrap_completed().await.unwrap());
    }

    #[tokio::test]
    async fn undecodable_payload_aborts_pass() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        remote.set_reference(ReferenceKind::Equipment, vec![serde_json::json!({"name": "no id"})]);
        let puller = puller(storage.clone(), remote, NetworkStatus::Online).await;

        let report = puller.run().await.unwrap();
        assert!(report.completed.is_empty());
        assert!(matches!(report.failed, Some((ReferenceKind::Equipment, RemoteError::Decode(_)))));
    }
}
