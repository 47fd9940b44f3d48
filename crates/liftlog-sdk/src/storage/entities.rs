//! 本地实体定义
//!
//! - 参考数据（Equipment / MuscleGroup / Exercise / 模板…）：服务端权威，本地只读，`synced_at` 为最近一次拉取时间
//! - 用户数据（UserWorkoutDay / ExerciseSet）：本地可写，带 `sync_status`

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::sync::ReferenceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub body_region: Option<String>,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub primary_muscle_group_id: i64,
    #[serde(default)]
    pub is_compound: bool,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEquipment {
    pub exercise_id: i64,
    pub equipment_id: i64,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSecondaryMuscle {
    pub exercise_id: i64,
    pub muscle_group_id: i64,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutTemplate {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub days_per_week: i32,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDay {
    pub id: i64,
    pub template_id: i64,
    pub day_index: i32,
    pub name: String,
    #[serde(default)]
    pub synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDayMuscle {
    pub template_day_id: i64,
    pub muscle_group_id: i64,
    #[serde(default)]
    pub synced_at: i64,
}

/// 一种参考数据类型的完整集合（一次拉取的结果，一个事务写入）
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceBatch {
    Equipment(Vec<Equipment>),
    MuscleGroups(Vec<MuscleGroup>),
    Exercises(Vec<Exercise>),
    ExerciseEquipment(Vec<ExerciseEquipment>),
    ExerciseSecondaryMuscles(Vec<ExerciseSecondaryMuscle>),
    WorkoutTemplates(Vec<WorkoutTemplate>),
    TemplateDays(Vec<TemplateDay>),
    TemplateDayMuscles(Vec<TemplateDayMuscle>),
}

impl ReferenceBatch {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::Equipment(_) => ReferenceKind::Equipment,
            Self::MuscleGroups(_) => ReferenceKind::MuscleGroup,
            Self::Exercises(_) => ReferenceKind::Exercise,
            Self::ExerciseEquipment(_) => ReferenceKind::ExerciseEquipment,
            Self::ExerciseSecondaryMuscles(_) => ReferenceKind::ExerciseSecondaryMuscle,
            Self::WorkoutTemplates(_) => ReferenceKind::WorkoutTemplate,
            Self::TemplateDays(_) => ReferenceKind::TemplateDay,
            Self::TemplateDayMuscles(_) => ReferenceKind::TemplateDayMuscle,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Equipment(v) => v.len(),
            Self::MuscleGroups(v) => v.len(),
            Self::Exercises(v) => v.len(),
            Self::ExerciseEquipment(v) => v.len(),
            Self::ExerciseSecondaryMuscles(v) => v.len(),
            Self::WorkoutTemplates(v) => v.len(),
            Self::TemplateDays(v) => v.len(),
            Self::TemplateDayMuscles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 用户数据同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// 本地已改，等待服务端确认
    Pending,
    /// 与服务端一致
    #[default]
    Synced,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户训练日
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWorkoutDay {
    pub id: i64,
    pub plan_id: i64,
    pub day_index: i32,
    pub name: String,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub updated_at: i64,
}

/// 训练组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub id: i64,
    pub workout_day_id: i64,
    pub exercise_id: i64,
    pub set_number: i32,
    #[serde(default)]
    pub target_reps: Option<i32>,
    #[serde(default)]
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub actual_reps: Option<i32>,
    #[serde(default)]
    pub actual_weight: Option<f64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub updated_at: i64,
}

/// 训练组字段修改（只包含本次改动的字段）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_reps: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl SetPatch {
    /// 完成一组：实际次数 + 重量
    pub fn completed(actual_reps: i32, actual_weight: Option<f64>) -> Self {
        Self {
            actual_reps: Some(actual_reps),
            actual_weight,
            completed: Some(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actual_reps.is_none() && self.actual_weight.is_none() && self.completed.is_none()
    }
}

/// 从服务端拉取的用户训练数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserWorkoutSnapshot {
    #[serde(default)]
    pub days: Vec<UserWorkoutDay>,
    #[serde(default)]
    pub sets: Vec<ExerciseSet>,
}

/// 保存用户数据快照的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveWorkoutsReport {
    pub written: usize,
    /// 仍有待推送 outbox、保留本地值的行数
    pub skipped_pending: usize,
}
