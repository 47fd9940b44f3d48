//! 同步协调器
//!
//! 负责「何时」执行 Bootstrap 与 Outbox 排空：
//! - 启动：bootstrap 后 drain（尽力而为）
//! - 不可达 -> 可达 边沿：只 drain
//! - 本地写入后：由 SDK 调用 `drain_now`
//! - 本轮有暂时失败：按 [`RetryPolicy`](crate::storage::queue::RetryPolicy) 退避后再 drain，无次数上限
//!
//! drain 与 bootstrap 各有一个单飞保护，同一时刻至多一轮执行加一轮排队。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bootstrap::{BootstrapPuller, BootstrapReport};
use super::meta_store::SyncMetaStore;
use super::single_flight::{FlightOutcome, SingleFlight};
use crate::error::{LiftlogSDKError, Result};
use crate::events::{event_builders, EventManager};
use crate::network::NetworkMonitor;
use crate::remote::RemoteService;
use crate::sdk::SyncConfig;
use crate::storage::entities::SaveWorkoutsReport;
use crate::storage::queue::{DrainMetrics, DrainReport, FailureReason, OutboxDrainer};
use crate::storage::StorageManager;
use crate::utils::now_millis;

pub struct SyncCoordinator {
    config: SyncConfig,
    storage: Arc<StorageManager>,
    remote: Arc<dyn RemoteService>,
    network: Arc<NetworkMonitor>,
    events: Arc<EventManager>,
    drainer: OutboxDrainer,
    bootstrap: BootstrapPuller,

    drain_flight: SingleFlight,
    bootstrap_flight: SingleFlight,

    /// 连续暂时失败轮数（决定退避）
    retry_attempt: AtomicU32,
    /// 重试代数：成功或新调度时递增，过期的定时器自行作废
    retry_generation: AtomicU64,

    edge_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_signal: Arc<Notify>,
    is_shutdown: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        storage: Arc<StorageManager>,
        remote: Arc<dyn RemoteService>,
        network: Arc<NetworkMonitor>,
        events: Arc<EventManager>,
    ) -> Arc<Self> {
        let drainer = OutboxDrainer::new(
            config.drainer_config(),
            storage.clone(),
            remote.clone(),
            events.clone(),
        );
        let bootstrap = BootstrapPuller::new(
            storage.clone(),
            remote.clone(),
            network.clone(),
            events.clone(),
            Duration::from_millis(config.remote_call_timeout_ms),
        );

        Arc::new(Self {
            config,
            storage,
            remote,
            network,
            events,
            drainer,
            bootstrap,
            drain_flight: SingleFlight::new(),
            bootstrap_flight: SingleFlight::new(),
            retry_attempt: AtomicU32::new(0),
            retry_generation: AtomicU64::new(0),
            edge_task: Mutex::new(None),
            shutdown_signal: Arc::new(Notify::new()),
            is_shutdown: AtomicBool::new(false),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(LiftlogSDKError::ShuttingDown("同步协调器已停止".to_string()));
        }
        Ok(())
    }

    /// 启动：监听可达边沿，并执行一次启动同步（bootstrap 后 drain）
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.ensure_running()?;
        self.spawn_edge_listener();

        info!("🚀 启动同步: bootstrap -> drain");
        if let Err(e) = self.bootstrap_now().await {
            warn!("⚠️ 启动 bootstrap 失败: {}", e);
        }
        if let Err(e) = self.drain_now().await {
            warn!("⚠️ 启动 drain 失败: {}", e);
        }
        Ok(())
    }

    fn spawn_edge_listener(self: &Arc<Self>) {
        let mut rx = self.network.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown_signal.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.notified() => break,
                    event = rx.recv() => event,
                };
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("网络事件滞后 {} 条", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(this) = weak.upgrade() else { break };

                this.events
                    .emit(event_builders::connectivity_changed(event.old_status, event.new_status))
                    .await;
                if event.became_reachable() {
                    info!("📶 网络恢复，触发 drain");
                    tokio::spawn(async move {
                        if let Err(e) = this.drain_now().await {
                            warn!("⚠️ 网络恢复后 drain 失败: {}", e);
                        }
                    });
                }
            }
            debug!("网络边沿监听已退出");
        });

        if let Some(previous) = self.edge_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// 立即排空一轮（本地写入后调用）
    pub async fn drain_now(self: &Arc<Self>) -> Result<FlightOutcome<DrainReport>> {
        self.ensure_running()?;

        match self.drain_flight.run(|| self.drain_pass()).await {
            FlightOutcome::Ran(result) => result.map(FlightOutcome::Ran),
            FlightOutcome::Coalesced => {
                debug!("drain 已在执行，本次触发合并");
                Ok(FlightOutcome::Coalesced)
            }
        }
    }

    async fn drain_pass(self: &Arc<Self>) -> Result<DrainReport> {
        if !self.network.is_reachable().await {
            debug!("📴 网络不可达，跳过 drain");
            return Ok(DrainReport { skipped_offline: true, ..Default::default() });
        }

        let report = self.drainer.drain().await?;
        SyncMetaStore::new(self.storage.kv_store().await?)
            .set_last_drain(now_millis())
            .await?;

        if report.has_retained() {
            self.schedule_retry(report.last_transient.clone());
        } else {
            self.reset_retry();
        }
        Ok(report)
    }

    /// 执行一轮 bootstrap
    pub async fn bootstrap_now(&self) -> Result<FlightOutcome<BootstrapReport>> {
        self.ensure_running()?;

        match self.bootstrap_flight.run(|| self.bootstrap.run()).await {
            FlightOutcome::Ran(result) => result.map(FlightOutcome::Ran),
            FlightOutcome::Coalesced => {
                debug!("bootstrap 已在执行，本次触发合并");
                Ok(FlightOutcome::Coalesced)
            }
        }
    }

    pub async fn is_bootstrap_completed(&self) -> Result<bool> {
        self.bootstrap.is_bootstrap_completed().await
    }

    /// 拉取当前用户训练数据：先 drain 推送本地修改，再保存（仍在 outbox 中的行不覆盖）
    ///
    /// 不可达或远端失败返回 `Ok(None)`。
    pub async fn refresh_user_workouts(self: &Arc<Self>) -> Result<Option<SaveWorkoutsReport>> {
        self.ensure_running()?;
        if !self.network.is_reachable().await {
            return Ok(None);
        }

        self.drain_now().await?;

        let timeout = Duration::from_millis(self.config.remote_call_timeout_ms);
        let snapshot = match tokio::time::timeout(timeout, self.remote.pull_user_workouts()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("⚠️ 拉取用户训练数据失败: {}", e);
                return Ok(None);
            }
            Err(_) => {
                warn!("⚠️ 拉取用户训练数据超时");
                return Ok(None);
            }
        };

        let report = self.storage.save_user_workouts(snapshot).await?;
        info!(
            "✅ 用户训练数据已刷新: written={}, skipped_pending={}",
            report.written, report.skipped_pending
        );
        Ok(Some(report))
    }

    fn reset_retry(&self) {
        self.retry_attempt.store(0, Ordering::Release);
        self.retry_generation.fetch_add(1, Ordering::AcqRel);
    }

    fn schedule_retry(self: &Arc<Self>, reason: Option<FailureReason>) {
        if !self.config.retry_enabled {
            return;
        }

        let attempt = self.retry_attempt.fetch_add(1, Ordering::AcqRel);
        let Some(delay) = self.config.retry_policy.next_delay(attempt, reason.as_ref()) else {
            warn!("⚠️ 已达重试上限，等待下一次触发: attempt={}", attempt);
            return;
        };
        let generation = self.retry_generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!("⏰ {:?} 后重试 drain (attempt={})", delay, attempt + 1);

        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::time::sleep(delay) => {
                    let Some(this) = weak.upgrade() else { return };
                    if this.retry_generation.load(Ordering::Acquire) != generation {
                        return;
                    }
                    if let Err(e) = this.drain_now().await {
                        warn!("⚠️ 重试 drain 失败: {}", e);
                    }
                }
            }
        });
    }

    pub async fn drain_metrics(&self) -> DrainMetrics {
        self.drainer.metrics().await
    }

    /// 停止后台任务
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.retry_generation.fetch_add(1, Ordering::AcqRel);
        self.shutdown_signal.notify_waiters();
        if let Some(handle) = self.edge_task.lock().take() {
            handle.abort();
        }
        info!("🛑 同步协调器已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ManualNetworkListener, NetworkStatus};
    use crate::remote::mock::RemoteCall;
    use crate::remote::{ApplyOutcome, MockRemoteService};
    use crate::storage::entities::{SetPatch, SyncStatus};
    use crate::storage::queue::{EntityClass, RetryPolicy};
    use crate::storage::test_helpers::{open_storage, workout_snapshot};
    use crate::sync::bootstrap::test_helpers::seed_reference;

    struct Harness {
        _dir: tempfile::TempDir,
        storage: Arc<StorageManager>,
        remote: Arc<MockRemoteService>,
        listener: Arc<ManualNetworkListener>,
        coordinator: Arc<SyncCoordinator>,
    }

    async fn harness(status: NetworkStatus, config: SyncConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11, 12])).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        seed_reference(&remote);
        let listener = Arc::new(ManualNetworkListener::new(status));
        let network = Arc::new(NetworkMonitor::new(listener.clone()));
        network.start().await.unwrap();

        let coordinator = SyncCoordinator::new(
            config,
            storage.clone(),
            remote.clone(),
            network,
            Arc::new(EventManager::new(64)),
        );
        Harness { _dir: dir, storage, remote, listener, coordinator }
    }

    async fn wait_until_outbox_empty(storage: &StorageManager) {
        for _ in 0..200 {
            if storage.outbox_len().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("outbox was not drained in time");
    }

    #[tokio::test]
    async fn online_completion_applies_immediately() {
        let h = harness(NetworkStatus::Online, SyncConfig::default()).await;
        h.storage.complete_workout_day(7, 1_700_000_000_000).await.unwrap();

        let report = h.coordinator.drain_now().await.unwrap().ran().unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(h.storage.outbox_len().await.unwrap(), 0);
        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Apply { class: EntityClass::UserWorkoutDay, operation: "COMPLETE", record_id: 7 }]
        );
        let day = h.storage.get_workout_day(7).await.unwrap().unwrap();
        assert_eq!(day.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn offline_drain_is_skipped() {
        let h = harness(NetworkStatus::Offline, SyncConfig::default()).await;
        h.storage.record_set_update(10, SetPatch::completed(8, None)).await.unwrap();

        let report = h.coordinator.drain_now().await.unwrap().ran().unwrap();
        assert!(report.skipped_offline);
        assert_eq!(h.remote.call_count(), 0);
        assert_eq!(h.storage.outbox_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reconnect_drains_offline_writes_in_one_batch() {
        let h = harness(NetworkStatus::Offline, SyncConfig::default()).await;
        h.coordinator.start().await.unwrap();
        for id in [10, 11, 12] {
            h.storage.record_set_update(id, SetPatch::completed(8, Some(80.0))).await.unwrap();
        }
        for id in [10, 11, 12] {
            let set = h.storage.get_exercise_set(id).await.unwrap().unwrap();
            assert_eq!(set.sync_status, SyncStatus::Pending);
        }
        assert_eq!(h.remote.call_count(), 0);

        h.listener.set_status(NetworkStatus::Online);
        wait_until_outbox_empty(&h.storage).await;

        // 边沿只触发 drain，不触发 bootstrap
        assert_eq!(h.remote.calls(), vec![RemoteCall::Batch(vec![10, 11, 12])]);
        for id in [10, 11, 12] {
            let set = h.storage.get_exercise_set(id).await.unwrap().unwrap();
            assert_eq!(set.sync_status, SyncStatus::Synced);
        }
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn startup_bootstraps_then_drains() {
        let h = harness(NetworkStatus::Online, SyncConfig::default()).await;
        h.storage.update_workout_day_notes(7, Some("felt strong".into())).await.unwrap();

        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.is_bootstrap_completed().await.unwrap());
        assert_eq!(h.storage.outbox_len().await.unwrap(), 0);
        assert_eq!(h.storage.count_reference_orphans().await.unwrap(), 0);

        let calls = h.remote.calls();
        assert!(matches!(calls.first(), Some(RemoteCall::Pull(_))));
        assert!(matches!(calls.last(), Some(RemoteCall::Apply { operation: "UPDATE", .. })));
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn concurrent_drains_are_coalesced() {
        let h = harness(NetworkStatus::Online, SyncConfig::default()).await;
        h.storage.complete_workout_day(7, 1).await.unwrap();
        h.remote.set_delay(Some(Duration::from_millis(100)));

        let first = {
            let c = h.coordinator.clone();
            tokio::spawn(async move { c.drain_now().await })
        };
        while !h.coordinator.drain_flight.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let mut others = Vec::new();
        for _ in 0..3 {
            let c = h.coordinator.clone();
            others.push(tokio::spawn(async move { c.drain_now().await }));
        }

        assert!(first.await.unwrap().unwrap().ran().is_some());
        let mut coalesced = 0;
        for task in others {
            if task.await.unwrap().unwrap().is_coalesced() {
                coalesced += 1;
            }
        }
        assert_eq!(coalesced, 2);
        // 排队的那一轮看到空 outbox，不发远端调用
        assert_eq!(h.remote.call_count(), 1);
    }

    #[tokio::test]
    async fn retained_entries_are_retried_with_backoff() {
        let config = SyncConfig {
            retry_policy: RetryPolicy {
                base_delay_ms: 10,
                max_delay_ms: 50,
                jitter_factor: 0.0,
                ..RetryPolicy::default()
            },
            ..SyncConfig::default()
        };
        let h = harness(NetworkStatus::Online, config).await;
        h.storage.complete_workout_day(7, 1).await.unwrap();
        h.remote.set_default_outcome(ApplyOutcome::Transient(FailureReason::ServerError(500)));

        let report = h.coordinator.drain_now().await.unwrap().ran().unwrap();
        assert_eq!(report.retained, 1);

        h.remote.set_default_outcome(ApplyOutcome::Applied);
        wait_until_outbox_empty(&h.storage).await;
        assert!(h.remote.call_count() >= 2);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn refresh_keeps_pending_local_values() {
        let h = harness(NetworkStatus::Online, SyncConfig { retry_enabled: false, ..SyncConfig::default() }).await;
        h.storage.record_set_update(10, SetPatch::completed(8, Some(80.0))).await.unwrap();
        h.remote.set_record_outcome(
            EntityClass::ExerciseSet,
            10,
            ApplyOutcome::Transient(FailureReason::NetworkUnavailable),
        );

        let mut server = workout_snapshot(7, &[10, 13]);
        server.sets[0].actual_reps = Some(3);
        h.remote.set_user_workouts(server);

        let report = h.coordinator.refresh_user_workouts().await.unwrap().unwrap();
        assert_eq!(report.skipped_pending, 1);

        let set = h.storage.get_exercise_set(10).await.unwrap().unwrap();
        assert_eq!(set.actual_reps, Some(8));
        assert_eq!(set.sync_status, SyncStatus::Pending);
        assert!(h.storage.get_exercise_set(13).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_restores_server_value_after_drop() {
        let h = harness(NetworkStatus::Online, SyncConfig { retry_enabled: false, ..SyncConfig::default() }).await;
        h.storage.record_set_update(10, SetPatch::completed(99, None)).await.unwrap();
        h.remote.set_record_outcome(EntityClass::ExerciseSet, 10, ApplyOutcome::Rejected(FailureReason::Forbidden));

        let mut server = workout_snapshot(7, &[10]);
        server.sets[0].actual_reps = Some(3);
        h.remote.set_user_workouts(server);

        let report = h.coordinator.refresh_user_workouts().await.unwrap().unwrap();
        assert_eq!(report.skipped_pending, 0);
        assert_eq!(h.storage.outbox_len().await.unwrap(), 0);

        let set = h.storage.get_exercise_set(10).await.unwrap().unwrap();
        assert_eq!(set.actual_reps, Some(3));
        assert_eq!(set.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_passes() {
        let h = harness(NetworkStatus::Online, SyncConfig::default()).await;
        h.coordinator.shutdown();
        assert!(matches!(
            h.coordinator.drain_now().await,
            Err(LiftlogSDKError::ShuttingDown(_))
        ));
    }
}
