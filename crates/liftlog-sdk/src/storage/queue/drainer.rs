//! Outbox 排空器
//!
//! 一轮排空：
//! 1. 按创建顺序读出全部 outbox（在 DbActor 内读，读完即释放）
//! 2. 按 [`BatchingStrategy`] 规划远端调用：训练组 UPDATE 合并为批量调用，其余逐条
//! 3. 每次远端调用独立超时；结果在网络 I/O 之后一次性提交
//!
//! 结果归类：Applied 删除并标记 synced；Rejected 删除不标记（warn + 事件）；Transient 原样保留。
//!
//! 同一记录的 outbox 必须按创建顺序到达远端：某条暂时失败后，本轮同一记录的后续条目
//! 不再发送、一并保留；一次批量调用里同一记录最多一条。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{FailureReason, OutboxEntry, OutboxResolution, Resolution};
use crate::error::Result;
use crate::events::{event_builders, EventManager};
use crate::remote::{ApplyOutcome, ApplyRequest, BatchOutcome, RemoteService};
use crate::storage::StorageManager;

/// 批量合并策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchingStrategy {
    /// 本轮全部训练组 UPDATE 先批量推送，其余按创建顺序逐条推送
    #[default]
    Partition,
    /// 只合并相邻的训练组 UPDATE，整体保持创建顺序
    AdjacentOnly,
}

/// 排空器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxDrainerConfig {
    /// 单次远端调用超时（毫秒）
    pub remote_call_timeout_ms: u64,
    pub batching: BatchingStrategy,
    /// 单次批量调用最多条数，超出按顺序切块
    pub max_batch_size: usize,
}

impl Default for OutboxDrainerConfig {
    fn default() -> Self {
        Self {
            remote_call_timeout_ms: 30_000,
            batching: BatchingStrategy::Partition,
            max_batch_size: 100,
        }
    }
}

/// 一轮排空的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// 不可达，本轮未执行（由协调器设置）
    pub skipped_offline: bool,
    /// 本轮读到的条数
    pub attempted: usize,
    pub applied: usize,
    /// 永久拒绝并丢弃
    pub dropped: usize,
    /// 暂时失败，留待下轮
    pub retained: usize,
    pub remote_calls: usize,
    /// 最近一次暂时失败的原因（决定重试退避）
    pub last_transient: Option<FailureReason>,
}

impl DrainReport {
    pub fn has_retained(&self) -> bool {
        self.retained > 0
    }
}

/// 排空统计信息
#[derive(Debug, Clone, Default)]
pub struct DrainMetrics {
    pub passes_total: u64,
    pub applied_total: u64,
    pub dropped_total: u64,
    pub retained_total: u64,
    pub remote_calls_total: u64,
}

/// 规划好的一次远端调用（下标指向本轮 outbox 列表）
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlannedCall {
    Single(usize),
    Batch(Vec<usize>),
}

/// 按策略规划调用；`batchable[i]` 表示第 i 条可合并
pub(crate) fn plan_calls(
    batchable: &[bool],
    strategy: BatchingStrategy,
    max_batch_size: usize,
) -> Vec<PlannedCall> {
    let chunk = max_batch_size.max(1);
    let mut calls = Vec::new();

    match strategy {
        BatchingStrategy::Partition => {
            let batch: Vec<usize> = (0..batchable.len()).filter(|&i| batchable[i]).collect();
            calls.extend(batch.chunks(chunk).map(|c| PlannedCall::Batch(c.to_vec())));
            calls.extend((0..batchable.len()).filter(|&i| !batchable[i]).map(PlannedCall::Single));
        }
        BatchingStrategy::AdjacentOnly => {
            let mut run: Vec<usize> = Vec::new();
            for (i, &can_batch) in batchable.iter().enumerate() {
                if can_batch {
                    run.push(i);
                    continue;
                }
                calls.extend(run.chunks(chunk).map(|c| PlannedCall::Batch(c.to_vec())));
                run.clear();
                calls.push(PlannedCall::Single(i));
            }
            calls.extend(run.chunks(chunk).map(|c| PlannedCall::Batch(c.to_vec())));
        }
    }

    calls
}

/// 把批量结果展开为逐条结果；逐条结果数量不符时整批视为暂时失败
fn expand_batch_outcome(outcome: BatchOutcome, len: usize) -> Vec<ApplyOutcome> {
    match outcome {
        BatchOutcome::Whole(o) => vec![o; len],
        BatchOutcome::PerItem(items) if items.len() == len => items,
        BatchOutcome::PerItem(items) => {
            warn!("⚠️ 批量结果条数不符: 期望 {}, 实际 {}，整批保留", len, items.len());
            let reason = FailureReason::Unknown(format!("batch result length {} != {}", items.len(), len));
            vec![ApplyOutcome::Transient(reason); len]
        }
    }
}

/// 记录标识：(table_name, record_id)
type RecordKey = (String, i64);

fn record_key(entry: &OutboxEntry) -> RecordKey {
    (entry.table_name.clone(), entry.record_id)
}

/// 把一组下标拆成「本次发送」与「留到下一次调用」：已阻塞的记录直接保留，
/// 同一记录只取最早的一条
fn split_wave(
    indexes: Vec<usize>,
    pending: &[(OutboxEntry, ApplyRequest)],
    blocked: &HashSet<RecordKey>,
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut held = Vec::new();
    let mut wave = Vec::new();
    let mut later = Vec::new();
    let mut seen = HashSet::new();
    for i in indexes {
        let key = record_key(&pending[i].0);
        if blocked.contains(&key) {
            held.push(i);
        } else if seen.insert(key) {
            wave.push(i);
        } else {
            later.push(i);
        }
    }
    (held, wave, later)
}

pub struct OutboxDrainer {
    config: OutboxDrainerConfig,
    storage: Arc<StorageManager>,
    remote: Arc<dyn RemoteService>,
    events: Arc<EventManager>,
    metrics: Arc<RwLock<DrainMetrics>>,
}

impl OutboxDrainer {
    pub fn new(
        config: OutboxDrainerConfig,
        storage: Arc<StorageManager>,
        remote: Arc<dyn RemoteService>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            config,
            storage,
            remote,
            events,
            metrics: Arc::new(RwLock::new(DrainMetrics::default())),
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.remote_call_timeout_ms)
    }

    /// 执行一轮排空（调用方负责可达性判断与单飞）
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport> {
        let entries = self.storage.list_outbox().await?;
        let mut report = DrainReport { attempted: entries.len(), ..Default::default() };

        if entries.is_empty() {
            debug!("📭 outbox 为空，本轮无远端调用");
            self.record_metrics(&report).await;
            return Ok(report);
        }
        info!("📤 开始排空 outbox: {} 条", entries.len());

        let mut pending: Vec<(OutboxEntry, ApplyRequest)> = Vec::with_capacity(entries.len());
        let mut undecodable = Vec::new();
        for entry in entries {
            match entry.intent() {
                Ok(intent) => {
                    let request = ApplyRequest {
                        entry_id: entry.id,
                        idempotency_key: entry.idempotency_key.clone(),
                        intent,
                    };
                    pending.push((entry, request));
                }
                Err(e) => {
                    let outcome = ApplyOutcome::Rejected(FailureReason::Malformed(e.to_string()));
                    undecodable.push((entry, outcome));
                }
            }
        }
        if !undecodable.is_empty() {
            self.settle(undecodable, &mut report).await?;
        }

        let batchable: Vec<bool> = pending.iter().map(|(_, r)| r.intent.is_batchable()).collect();
        let mut blocked: HashSet<RecordKey> = HashSet::new();
        for call in plan_calls(&batchable, self.config.batching, self.config.max_batch_size) {
            match call {
                PlannedCall::Single(i) => {
                    let (entry, request) = &pending[i];
                    if blocked.contains(&record_key(entry)) {
                        self.hold_back(entry, &mut report);
                        continue;
                    }
                    report.remote_calls += 1;
                    let outcome = tokio::time::timeout(self.call_timeout(), self.remote.apply(request))
                        .await
                        .unwrap_or(ApplyOutcome::Transient(FailureReason::NetworkTimeout));
                    if matches!(outcome, ApplyOutcome::Transient(_)) {
                        blocked.insert(record_key(entry));
                    }
                    self.settle(vec![(entry.clone(), outcome)], &mut report).await?;
                }
                PlannedCall::Batch(indexes) => {
                    let mut remaining = indexes;
                    while !remaining.is_empty() {
                        let (held, wave, later) = split_wave(remaining, &pending, &blocked);
                        for &i in &held {
                            self.hold_back(&pending[i].0, &mut report);
                        }
                        if wave.is_empty() {
                            break;
                        }

                        let requests: Vec<ApplyRequest> = wave.iter().map(|&i| pending[i].1.clone()).collect();
                        debug!("📦 批量推送训练组: {} 条", requests.len());
                        report.remote_calls += 1;
                        let outcome = tokio::time::timeout(self.call_timeout(), self.remote.apply_set_batch(&requests))
                            .await
                            .unwrap_or(BatchOutcome::Whole(ApplyOutcome::Transient(FailureReason::NetworkTimeout)));
                        let outcomes = expand_batch_outcome(outcome, wave.len());
                        let settled: Vec<(OutboxEntry, ApplyOutcome)> = wave
                            .iter()
                            .zip(outcomes)
                            .map(|(&i, o)| (pending[i].0.clone(), o))
                            .collect();
                        for (entry, outcome) in &settled {
                            if matches!(outcome, ApplyOutcome::Transient(_)) {
                                blocked.insert(record_key(entry));
                            }
                        }
                        self.settle(settled, &mut report).await?;
                        remaining = later;
                    }
                }
            }
        }

        info!(
            "✅ 排空结束: attempted={}, applied={}, dropped={}, retained={}, calls={}",
            report.attempted, report.applied, report.dropped, report.retained, report.remote_calls
        );
        self.record_metrics(&report).await;
        self.events
            .emit(event_builders::drain_completed(
                report.attempted,
                report.applied,
                report.dropped,
                report.retained,
            ))
            .await;
        Ok(report)
    }

    /// 同一记录前序条目本轮暂时失败：不发送，原样保留
    fn hold_back(&self, entry: &OutboxEntry, report: &mut DrainReport) {
        debug!(
            "⏸️ 前序条目未送达，本轮跳过: id={}, {} record_id={}",
            entry.id, entry.table_name, entry.record_id
        );
        report.retained += 1;
    }

    /// 提交一次调用的结果
    async fn settle(&self, outcomes: Vec<(OutboxEntry, ApplyOutcome)>, report: &mut DrainReport) -> Result<()> {
        let mut resolutions = Vec::with_capacity(outcomes.len());

        for (entry, outcome) in outcomes {
            match outcome {
                ApplyOutcome::Applied => {
                    report.applied += 1;
                    resolutions.push(OutboxResolution::new(&entry, Resolution::Applied));
                }
                ApplyOutcome::Rejected(reason) => {
                    warn!(
                        "🗑️ outbox 被永久拒绝，已丢弃: id={}, {} {} record_id={}, reason={}",
                        entry.id, entry.table_name, entry.operation, entry.record_id, reason
                    );
                    report.dropped += 1;
                    resolutions.push(OutboxResolution::new(&entry, Resolution::Dropped));
                    self.events
                        .emit(event_builders::entry_dropped(
                            entry.id,
                            &entry.table_name,
                            &entry.operation,
                            entry.record_id,
                            &reason.to_string(),
                        ))
                        .await;
                }
                ApplyOutcome::Transient(reason) => {
                    debug!(
                        "⏳ outbox 暂时失败，保留: id={}, record_id={}, reason={}",
                        entry.id, entry.record_id, reason
                    );
                    report.retained += 1;
                    report.last_transient = Some(reason);
                }
            }
        }

        self.storage.resolve_outbox(resolutions).await?;
        Ok(())
    }

    async fn record_metrics(&self, report: &DrainReport) {
        let mut m = self.metrics.write().await;
        m.passes_total += 1;
        m.applied_total += report.applied as u64;
        m.dropped_total += report.dropped as u64;
        m.retained_total += report.retained as u64;
        m.remote_calls_total += report.remote_calls as u64;
    }

    pub async fn metrics(&self) -> DrainMetrics {
        self.metrics.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SyncEvent;
    use crate::remote::mock::{MockRemoteService, RemoteCall};
    use crate::storage::entities::{SetPatch, SyncStatus};
    use crate::storage::queue::EntityClass;
    use crate::storage::test_helpers::{open_storage, workout_snapshot};

    fn drainer_with(
        storage: Arc<StorageManager>,
        remote: Arc<MockRemoteService>,
        config: OutboxDrainerConfig,
    ) -> (OutboxDrainer, Arc<EventManager>) {
        let events = Arc::new(EventManager::new(64));
        (OutboxDrainer::new(config, storage, remote, events.clone()), events)
    }

    #[test]
    fn partition_puts_batches_first() {
        let plan = plan_calls(&[true, false, true, false], BatchingStrategy::Partition, 10);
        assert_eq!(
            plan,
            vec![PlannedCall::Batch(vec![0, 2]), PlannedCall::Single(1), PlannedCall::Single(3)]
        );
    }

    #[test]
    fn adjacent_only_keeps_creation_order() {
        let plan = plan_calls(&[true, true, false, true], BatchingStrategy::AdjacentOnly, 10);
        assert_eq!(
            plan,
            vec![PlannedCall::Batch(vec![0, 1]), PlannedCall::Single(2), PlannedCall::Batch(vec![3])]
        );
    }

    #[test]
    fn large_batches_are_chunked_in_order() {
        let plan = plan_calls(&[true; 5], BatchingStrategy::Partition, 2);
        assert_eq!(
            plan,
            vec![
                PlannedCall::Batch(vec![0, 1]),
                PlannedCall::Batch(vec![2, 3]),
                PlannedCall::Batch(vec![4]),
            ]
        );
    }

    #[test]
    fn mismatched_per_item_result_is_transient() {
        let outcomes = expand_batch_outcome(BatchOutcome::PerItem(vec![ApplyOutcome::Applied]), 2);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o, ApplyOutcome::Transient(_))));
    }

    #[tokio::test]
    async fn offline_sets_go_out_in_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11, 12])).await.unwrap();
        for id in [10, 11, 12] {
            storage.record_set_update(id, SetPatch::completed(8, Some(80.0))).await.unwrap();
        }

        let remote = Arc::new(MockRemoteService::new());
        let (drainer, _) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());
        let report = drainer.drain().await.unwrap();

        assert_eq!(remote.calls(), vec![RemoteCall::Batch(vec![10, 11, 12])]);
        assert_eq!(report.applied, 3);
        assert_eq!(storage.outbox_len().await.unwrap(), 0);
        for id in [10, 11, 12] {
            let set = storage.get_exercise_set(id).await.unwrap().unwrap();
            assert_eq!(set.sync_status, SyncStatus::Synced);
        }
    }

    #[tokio::test]
    async fn empty_outbox_makes_no_remote_calls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        let remote = Arc::new(MockRemoteService::new());
        let (drainer, _) = drainer_with(storage, remote.clone(), OutboxDrainerConfig::default());

        let report = drainer.drain().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn not_found_is_dropped_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[99])).await.unwrap();
        storage.record_set_update(99, SetPatch::completed(5, None)).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        remote.set_record_outcome(
            EntityClass::ExerciseSet,
            99,
            ApplyOutcome::Rejected(FailureReason::NotFound),
        );
        let (drainer, events) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());
        let mut rx = events.subscribe();

        let report = drainer.drain().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(storage.outbox_len().await.unwrap(), 0);
        let set = storage.get_exercise_set(99).await.unwrap().unwrap();
        assert_eq!(set.sync_status, SyncStatus::Pending);

        match rx.recv().await.unwrap() {
            SyncEvent::EntryDropped { record_id, table_name, .. } => {
                assert_eq!(record_id, 99);
                assert_eq!(table_name, "ExerciseSet");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        remote.clear_calls();
        drainer.drain().await.unwrap();
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn server_errors_retain_entry_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[])).await.unwrap();
        storage.complete_workout_day(7, 1_700_000_000_000).await.unwrap();
        let before = storage.list_outbox().await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        remote.set_default_outcome(ApplyOutcome::Transient(FailureReason::ServerError(500)));
        let (drainer, _) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());

        for _ in 0..5 {
            let report = drainer.drain().await.unwrap();
            assert_eq!(report.retained, 1);
            assert_eq!(report.last_transient, Some(FailureReason::ServerError(500)));
            assert_eq!(storage.list_outbox().await.unwrap(), before);
        }

        remote.set_default_outcome(ApplyOutcome::Applied);
        let report = drainer.drain().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(storage.outbox_len().await.unwrap(), 0);
        assert_eq!(remote.call_count(), 6);

        let metrics = drainer.metrics().await;
        assert_eq!(metrics.passes_total, 6);
        assert_eq!(metrics.retained_total, 5);
    }

    #[tokio::test]
    async fn later_entries_wait_behind_a_retained_one() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[])).await.unwrap();
        storage.update_workout_day_notes(7, Some("old".into())).await.unwrap();
        storage.update_workout_day_notes(7, Some("new".into())).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        remote.script_outcomes(vec![ApplyOutcome::Transient(FailureReason::ServerError(502))]);
        let (drainer, _) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());

        let report = drainer.drain().await.unwrap();
        assert_eq!((report.remote_calls, report.retained), (1, 2));
        assert_eq!(storage.outbox_len().await.unwrap(), 2);
        assert!(remote.remote_state().is_empty());

        let report = drainer.drain().await.unwrap();
        assert_eq!(report.applied, 2);
        let notes = remote.remote_state()[&(EntityClass::UserWorkoutDay, 7)]["notes"].clone();
        assert_eq!(notes, serde_json::json!("new"));
        let day = storage.get_workout_day(7).await.unwrap().unwrap();
        assert_eq!(day.notes.as_deref(), Some("new"));
        assert_eq!(day.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn batched_set_updates_keep_per_record_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10])).await.unwrap();
        storage
            .record_set_update(10, SetPatch { actual_reps: Some(5), ..Default::default() })
            .await
            .unwrap();
        storage
            .record_set_update(10, SetPatch { actual_reps: Some(9), ..Default::default() })
            .await
            .unwrap();

        let remote = Arc::new(MockRemoteService::new());
        remote.script_outcomes(vec![ApplyOutcome::Transient(FailureReason::NetworkUnavailable)]);
        let (drainer, _) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());

        let report = drainer.drain().await.unwrap();
        assert_eq!(remote.calls(), vec![RemoteCall::Batch(vec![10])]);
        assert_eq!(report.retained, 2);

        drainer.drain().await.unwrap();
        assert_eq!(storage.outbox_len().await.unwrap(), 0);
        let reps = remote.remote_state()[&(EntityClass::ExerciseSet, 10)]["actual_reps"].clone();
        assert_eq!(reps, serde_json::json!(9));
        let set = storage.get_exercise_set(10).await.unwrap().unwrap();
        assert_eq!((set.actual_reps, set.sync_status), (Some(9), SyncStatus::Synced));
    }

    #[tokio::test]
    async fn per_item_batch_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11, 12])).await.unwrap();
        for id in [10, 11, 12] {
            storage.record_set_update(id, SetPatch::completed(8, None)).await.unwrap();
        }

        let remote = Arc::new(MockRemoteService::new());
        remote.set_record_outcome(EntityClass::ExerciseSet, 11, ApplyOutcome::Rejected(FailureReason::Forbidden));
        remote.set_record_outcome(
            EntityClass::ExerciseSet,
            12,
            ApplyOutcome::Transient(FailureReason::NetworkUnavailable),
        );
        let (drainer, _) = drainer_with(storage.clone(), remote.clone(), OutboxDrainerConfig::default());

        let report = drainer.drain().await.unwrap();
        assert_eq!((report.applied, report.dropped, report.retained), (1, 1, 1));

        let left = storage.list_outbox().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id, 12);
        assert_eq!(
            storage.get_exercise_set(10).await.unwrap().unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn whole_batch_failure_retains_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11])).await.unwrap();
        for id in [10, 11] {
            storage.record_set_update(id, SetPatch::completed(8, None)).await.unwrap();
        }

        let remote = Arc::new(MockRemoteService::new());
        remote.set_whole_batch_outcome(Some(ApplyOutcome::Transient(FailureReason::ServerError(503))));
        let (drainer, _) = drainer_with(storage.clone(), remote, OutboxDrainerConfig::default());

        let report = drainer.drain().await.unwrap();
        assert_eq!(report.retained, 2);
        assert_eq!(storage.outbox_len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batched_and_individual_pushes_reach_same_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11])).await.unwrap();
        storage.record_set_update(10, SetPatch::completed(8, Some(80.0))).await.unwrap();
        storage.record_set_update(11, SetPatch::completed(6, Some(85.0))).await.unwrap();
        storage
            .record_set_update(10, SetPatch { actual_reps: Some(9), ..Default::default() })
            .await
            .unwrap();

        let individual = MockRemoteService::new();
        for entry in storage.list_outbox().await.unwrap() {
            let request = ApplyRequest {
                entry_id: entry.id,
                idempotency_key: entry.idempotency_key.clone(),
                intent: entry.intent().unwrap(),
            };
            assert_eq!(individual.apply(&request).await, ApplyOutcome::Applied);
        }

        let batched = Arc::new(MockRemoteService::new());
        let (drainer, _) = drainer_with(storage.clone(), batched.clone(), OutboxDrainerConfig::default());
        drainer.drain().await.unwrap();

        // 同一训练组的第二条进入下一次批量调用
        assert_eq!(batched.calls(), vec![RemoteCall::Batch(vec![10, 11]), RemoteCall::Batch(vec![10])]);
        assert_eq!(batched.remote_state(), individual.remote_state());
        let set = storage.get_exercise_set(10).await.unwrap().unwrap();
        assert_eq!(set.sync_status, SyncStatus::Synced);
        assert_eq!(set.actual_reps, Some(9));
    }

    #[tokio::test]
    async fn adjacent_only_preserves_global_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[10, 11])).await.unwrap();
        storage.record_set_update(10, SetPatch::completed(8, None)).await.unwrap();
        storage.complete_workout_day(7, 5).await.unwrap();
        storage.record_set_update(11, SetPatch::completed(8, None)).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        let config = OutboxDrainerConfig { batching: BatchingStrategy::AdjacentOnly, ..Default::default() };
        let (drainer, _) = drainer_with(storage, remote.clone(), config);
        drainer.drain().await.unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Batch(vec![10]),
                RemoteCall::Apply { class: EntityClass::UserWorkoutDay, operation: "COMPLETE", record_id: 7 },
                RemoteCall::Batch(vec![11]),
            ]
        );
    }

    #[tokio::test]
    async fn slow_remote_counts_as_transient() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await;
        storage.save_user_workouts(workout_snapshot(7, &[])).await.unwrap();
        storage.update_workout_day_notes(7, Some("deload".into())).await.unwrap();

        let remote = Arc::new(MockRemoteService::new());
        remote.set_delay(Some(Duration::from_millis(200)));
        let config = OutboxDrainerConfig { remote_call_timeout_ms: 20, ..Default::default() };
        let (drainer, _) = drainer_with(storage.clone(), remote, config);

        let report = drainer.drain().await.unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(report.last_transient, Some(FailureReason::NetworkTimeout));
        assert_eq!(storage.outbox_len().await.unwrap(), 1);
    }
}
