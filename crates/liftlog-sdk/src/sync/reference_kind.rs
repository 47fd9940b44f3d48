//! 参考数据类型枚举
//!
//! 受控枚举，新增类型需 SDK 与服务端同步升级，并在 BOOTSTRAP_ORDER 中按依赖排好位置。

use std::str::FromStr;

/// 参考数据类型（服务端权威、本地只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Equipment,
    MuscleGroup,
    Exercise,
    ExerciseEquipment,
    ExerciseSecondaryMuscle,
    WorkoutTemplate,
    TemplateDay,
    TemplateDayMuscle,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::MuscleGroup => "muscle_group",
            Self::Exercise => "exercise",
            Self::ExerciseEquipment => "exercise_equipment",
            Self::ExerciseSecondaryMuscle => "exercise_secondary_muscle",
            Self::WorkoutTemplate => "workout_template",
            Self::TemplateDay => "template_day",
            Self::TemplateDayMuscle => "template_day_muscle",
        }
    }

    /// 写入前必须已存在的类型（外键目标）
    pub fn depends_on(self) -> &'static [ReferenceKind] {
        match self {
            Self::Equipment | Self::MuscleGroup | Self::WorkoutTemplate => &[],
            Self::Exercise => &[Self::MuscleGroup],
            Self::ExerciseEquipment => &[Self::Exercise, Self::Equipment],
            Self::ExerciseSecondaryMuscle => &[Self::Exercise, Self::MuscleGroup],
            Self::TemplateDay => &[Self::WorkoutTemplate],
            Self::TemplateDayMuscle => &[Self::TemplateDay, Self::MuscleGroup],
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equipment" => Ok(Self::Equipment),
            "muscle_group" => Ok(Self::MuscleGroup),
            "exercise" => Ok(Self::Exercise),
            "exercise_equipment" => Ok(Self::ExerciseEquipment),
            "exercise_secondary_muscle" => Ok(Self::ExerciseSecondaryMuscle),
            "workout_template" => Ok(Self::WorkoutTemplate),
            "template_day" => Ok(Self::TemplateDay),
            "template_day_muscle" => Ok(Self::TemplateDayMuscle),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
