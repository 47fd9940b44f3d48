//! 参考数据应用器 - 将远端拉取的 JSON 行解析为某类型的完整集合
//!
//! 任何一行解析失败则整类作废（按远端失败处理），不写入半个集合。

use serde::de::DeserializeOwned;

use super::ReferenceKind;
use crate::remote::RemoteError;
use crate::storage::entities::ReferenceBatch;

fn parse_rows<T: DeserializeOwned>(kind: ReferenceKind, rows: Vec<serde_json::Value>) -> Result<Vec<T>, RemoteError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value(row)
                .map_err(|e| RemoteError::Decode(format!("{} 第 {} 行解析失败: {}", kind, i, e)))
        })
        .collect()
}

/// 按类型解析拉取结果
pub fn parse_reference_batch(
    kind: ReferenceKind,
    rows: Vec<serde_json::Value>,
) -> Result<ReferenceBatch, RemoteError> {
    let batch = match kind {
        ReferenceKind::Equipment => ReferenceBatch::Equipment(parse_rows(kind, rows)?),
        ReferenceKind::MuscleGroup => ReferenceBatch::MuscleGroups(parse_rows(kind, rows)?),
        ReferenceKind::Exercise => ReferenceBatch::Exercises(parse_rows(kind, rows)?),
        ReferenceKind::ExerciseEquipment => ReferenceBatch::ExerciseEquipment(parse_rows(kind, rows)?),
        ReferenceKind::ExerciseSecondaryMuscle => {
            ReferenceBatch::ExerciseSecondaryMuscles(parse_rows(kind, rows)?)
        }
        ReferenceKind::WorkoutTemplate => ReferenceBatch::WorkoutTemplates(parse_rows(kind, rows)?),
        ReferenceKind::TemplateDay => ReferenceBatch::TemplateDays(parse_rows(kind, rows)?),
        ReferenceKind::TemplateDayMuscle => ReferenceBatch::TemplateDayMuscles(parse_rows(kind, rows)?),
    };
    Ok(batch)
}
