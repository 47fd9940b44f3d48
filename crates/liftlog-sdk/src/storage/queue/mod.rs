//! 待推送队列（outbox）
//!
//! 每次本地写入用户数据时，与实体修改在同一事务中追加一条 [`OutboxEntry`]。
//! 持久化的 (table_name, operation, payload) 在消费时解码为封闭枚举 [`SyncIntent`]，
//! 不做字符串分发。

pub mod drainer;
pub mod retry_policy;

pub use drainer::{BatchingStrategy, DrainMetrics, DrainReport, OutboxDrainer, OutboxDrainerConfig};
pub use retry_policy::{FailureReason, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{LiftlogSDKError, Result};
use crate::storage::entities::{ExerciseSet, SetPatch, UserWorkoutDay};

/// 可写实体类（即 outbox 的 table_name）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    ExerciseSet,
    UserWorkoutDay,
}

impl EntityClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExerciseSet => "ExerciseSet",
            Self::UserWorkoutDay => "UserWorkoutDay",
        }
    }

    /// 本地表名
    pub fn table(self) -> &'static str {
        match self {
            Self::ExerciseSet => "exercise_set",
            Self::UserWorkoutDay => "user_workout_day",
        }
    }
}

impl FromStr for EntityClass {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ExerciseSet" => Ok(Self::ExerciseSet),
            "UserWorkoutDay" => Ok(Self::UserWorkoutDay),
            _ => Err(()),
        }
    }
}

/// outbox 操作标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Update,
    Complete,
    Sync,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Complete => "COMPLETE",
            Self::Sync => "SYNC",
        }
    }
}

impl FromStr for OperationKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "UPDATE" => Ok(Self::Update),
            "COMPLETE" => Ok(Self::Complete),
            "SYNC" => Ok(Self::Sync),
            _ => Err(()),
        }
    }
}

/// 训练日完整快照（SYNC 操作的 payload）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub day: UserWorkoutDay,
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DayCompletePayload {
    completed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DayUpdatePayload {
    notes: Option<String>,
}

/// 推送意图：实体类 × 操作 的封闭枚举
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIntent {
    /// ExerciseSet / UPDATE（可批量）
    SetUpdate { set_id: i64, patch: SetPatch },
    /// UserWorkoutDay / COMPLETE
    DayComplete { day_id: i64, completed_at: i64 },
    /// UserWorkoutDay / UPDATE
    DayUpdate { day_id: i64, notes: Option<String> },
    /// UserWorkoutDay / SYNC：整日快照重推
    DaySync { day_id: i64, snapshot: DaySnapshot },
}

impl SyncIntent {
    pub fn entity_class(&self) -> EntityClass {
        match self {
            Self::SetUpdate { .. } => EntityClass::ExerciseSet,
            Self::DayComplete { .. } | Self::DayUpdate { .. } | Self::DaySync { .. } => {
                EntityClass::UserWorkoutDay
            }
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            Self::SetUpdate { .. } | Self::DayUpdate { .. } => OperationKind::Update,
            Self::DayComplete { .. } => OperationKind::Complete,
            Self::DaySync { .. } => OperationKind::Sync,
        }
    }

    pub fn record_id(&self) -> i64 {
        match self {
            Self::SetUpdate { set_id, .. } => *set_id,
            Self::DayComplete { day_id, .. }
            | Self::DayUpdate { day_id, .. }
            | Self::DaySync { day_id, .. } => *day_id,
        }
    }

    /// 是否可合并进批量调用
    pub fn is_batchable(&self) -> bool {
        matches!(self, Self::SetUpdate { .. })
    }

    /// 序列化 payload（持久化到 sync_queue.payload，同时也是发给服务端的 body）
    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::SetUpdate { patch, .. } => serde_json::to_value(patch)?,
            Self::DayComplete { completed_at, .. } => {
                serde_json::to_value(DayCompletePayload { completed_at: *completed_at })?
            }
            Self::DayUpdate { notes, .. } => {
                serde_json::to_value(DayUpdatePayload { notes: notes.clone() })?
            }
            Self::DaySync { snapshot, .. } => serde_json::to_value(snapshot)?,
        };
        Ok(value)
    }

    /// 从持久化的行解码
    pub fn decode(table_name: &str, operation: &str, record_id: i64, payload: &str) -> Result<Self> {
        let class = EntityClass::from_str(table_name)
            .map_err(|_| LiftlogSDKError::InvalidData(format!("未知 table_name: {}", table_name)))?;
        let op = OperationKind::from_str(operation)
            .map_err(|_| LiftlogSDKError::InvalidData(format!("未知 operation: {}", operation)))?;

        let intent = match (class, op) {
            (EntityClass::ExerciseSet, OperationKind::Update) => Self::SetUpdate {
                set_id: record_id,
                patch: serde_json::from_str(payload)?,
            },
            (EntityClass::UserWorkoutDay, OperationKind::Complete) => {
                let p: DayCompletePayload = serde_json::from_str(payload)?;
                Self::DayComplete { day_id: record_id, completed_at: p.completed_at }
            }
            (EntityClass::UserWorkoutDay, OperationKind::Update) => {
                let p: DayUpdatePayload = serde_json::from_str(payload)?;
                Self::DayUpdate { day_id: record_id, notes: p.notes }
            }
            (EntityClass::UserWorkoutDay, OperationKind::Sync) => Self::DaySync {
                day_id: record_id,
                snapshot: serde_json::from_str(payload)?,
            },
            (EntityClass::ExerciseSet, OperationKind::Complete | OperationKind::Sync) => {
                return Err(LiftlogSDKError::InvalidData(format!(
                    "不支持的组合: {} / {}",
                    table_name, operation
                )));
            }
        };
        Ok(intent)
    }
}

/// sync_queue 中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub operation: String,
    pub payload: String,
    pub idempotency_key: String,
    pub created_at: i64,
}

impl OutboxEntry {
    pub fn intent(&self) -> Result<SyncIntent> {
        SyncIntent::decode(&self.table_name, &self.operation, self.record_id, &self.payload)
    }
}

/// 待插入的 outbox 行（id 由数据库分配）
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEntry {
    pub table_name: String,
    pub record_id: i64,
    pub operation: String,
    pub payload: String,
    pub idempotency_key: String,
    pub created_at: i64,
}

impl NewOutboxEntry {
    pub fn from_intent(intent: &SyncIntent, created_at: i64) -> Result<Self> {
        Ok(Self {
            table_name: intent.entity_class().as_str().to_string(),
            record_id: intent.record_id(),
            operation: intent.operation().as_str().to_string(),
            payload: intent.payload()?.to_string(),
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            created_at,
        })
    }
}

/// 一条 outbox 的处理结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 服务端已应用：删除并（无其它待推送时）标记 synced
    Applied,
    /// 永久拒绝：删除，不标记 synced
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxResolution {
    pub entry_id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub resolution: Resolution,
}

impl OutboxResolution {
    pub fn new(entry: &OutboxEntry, resolution: Resolution) -> Self {
        Self {
            entry_id: entry.id,
            table_name: entry.table_name.clone(),
            record_id: entry.record_id,
            resolution,
        }
    }
}
