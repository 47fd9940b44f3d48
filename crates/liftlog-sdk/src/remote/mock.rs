//! 测试用脚本化远端：记录每次调用，按记录配置返回结果，并维护一份「远端状态」

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::{ApplyOutcome, ApplyRequest, BatchOutcome, RemoteError, RemoteService};
use crate::storage::entities::UserWorkoutSnapshot;
use crate::storage::queue::EntityClass;
use crate::sync::ReferenceKind;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Pull(ReferenceKind),
    Apply { class: EntityClass, operation: &'static str, record_id: i64 },
    Batch(Vec<i64>),
    PullUserWorkouts,
}

#[derive(Default)]
pub struct MockRemoteService {
    reference: Mutex<HashMap<ReferenceKind, Vec<serde_json::Value>>>,
    pull_failures: Mutex<HashMap<ReferenceKind, RemoteError>>,
    default_outcome: Mutex<Option<ApplyOutcome>>,
    record_outcomes: Mutex<HashMap<(EntityClass, i64), ApplyOutcome>>,
    /// 按调用顺序依次消费，优先于其它配置
    scripted: Mutex<VecDeque<ApplyOutcome>>,
    whole_batch_outcome: Mutex<Option<ApplyOutcome>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<RemoteCall>>,
    /// 已应用的 payload（按 class + record_id，后写覆盖）
    state: Mutex<HashMap<(EntityClass, i64), serde_json::Value>>,
    user_workouts: Mutex<UserWorkoutSnapshot>,
}

impl MockRemoteService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reference(&self, kind: ReferenceKind, rows: Vec<serde_json::Value>) {
        self.reference.lock().insert(kind, rows);
    }

    pub fn fail_pull(&self, kind: ReferenceKind, error: RemoteError) {
        self.pull_failures.lock().insert(kind, error);
    }

    pub fn clear_pull_failures(&self) {
        self.pull_failures.lock().clear();
    }

    /// 未单独配置的记录统一返回此结果（默认 Applied）
    pub fn set_default_outcome(&self, outcome: ApplyOutcome) {
        *self.default_outcome.lock() = Some(outcome);
    }

    pub fn set_record_outcome(&self, class: EntityClass, record_id: i64, outcome: ApplyOutcome) {
        self.record_outcomes.lock().insert((class, record_id), outcome);
    }

    pub fn clear_record_outcome(&self, class: EntityClass, record_id: i64) {
        self.record_outcomes.lock().remove(&(class, record_id));
    }

    /// 接下来的若干条 apply（含批量中的逐条）依次返回这些结果
    pub fn script_outcomes(&self, outcomes: Vec<ApplyOutcome>) {
        self.scripted.lock().extend(outcomes);
    }

    /// 批量接口整批返回此结果（忽略逐条配置）
    pub fn set_whole_batch_outcome(&self, outcome: Option<ApplyOutcome>) {
        *self.whole_batch_outcome.lock() = outcome;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn set_user_workouts(&self, snapshot: UserWorkoutSnapshot) {
        *self.user_workouts.lock() = snapshot;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn remote_state(&self) -> HashMap<(EntityClass, i64), serde_json::Value> {
        self.state.lock().clone()
    }

    fn outcome_for(&self, class: EntityClass, record_id: i64) -> ApplyOutcome {
        if let Some(o) = self.scripted.lock().pop_front() {
            return o;
        }
        if let Some(o) = self.record_outcomes.lock().get(&(class, record_id)) {
            return o.clone();
        }
        self.default_outcome.lock().clone().unwrap_or(ApplyOutcome::Applied)
    }

    fn record_applied(&self, request: &ApplyRequest) {
        if let Ok(payload) = request.intent.payload() {
            let key = (request.intent.entity_class(), request.intent.record_id());
            let mut state = self.state.lock();
            // SetPatch 为增量：合并字段
            match (state.get_mut(&key), payload) {
                (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(new)) => {
                    existing.extend(new);
                }
                (_, payload) => {
                    state.insert(key, payload);
                }
            }
        }
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl RemoteService for MockRemoteService {
    async fn pull(&self, kind: ReferenceKind) -> Result<Vec<serde_json::Value>, RemoteError> {
        self.calls.lock().push(RemoteCall::Pull(kind));
        self.maybe_delay().await;
        if let Some(e) = self.pull_failures.lock().get(&kind) {
            return Err(e.clone());
        }
        Ok(self.reference.lock().get(&kind).cloned().unwrap_or_default())
    }

    async fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        let class = request.intent.entity_class();
        let record_id = request.intent.record_id();
        self.calls.lock().push(RemoteCall::Apply {
            class,
            operation: request.intent.operation().as_str(),
            record_id,
        });
        self.maybe_delay().await;

        let outcome = self.outcome_for(class, record_id);
        if outcome == ApplyOutcome::Applied {
            self.record_applied(request);
        }
        outcome
    }

    async fn apply_set_batch(&self, requests: &[ApplyRequest]) -> BatchOutcome {
        self.calls.lock().push(RemoteCall::Batch(
            requests.iter().map(|r| r.intent.record_id()).collect(),
        ));
        self.maybe_delay().await;

        let whole = self.whole_batch_outcome.lock().clone();
        if let Some(outcome) = whole {
            if outcome == ApplyOutcome::Applied {
                requests.iter().for_each(|r| self.record_applied(r));
            }
            return BatchOutcome::Whole(outcome);
        }

        let outcomes: Vec<ApplyOutcome> = requests
            .iter()
            .map(|r| {
                let outcome = self.outcome_for(r.intent.entity_class(), r.intent.record_id());
                if outcome == ApplyOutcome::Applied {
                    self.record_applied(r);
                }
                outcome
            })
            .collect();
        BatchOutcome::PerItem(outcomes)
    }

    async fn pull_user_workouts(&self) -> Result<UserWorkoutSnapshot, RemoteError> {
        self.calls.lock().push(RemoteCall::PullUserWorkouts);
        self.maybe_delay().await;
        Ok(self.user_workouts.lock().clone())
    }
}
