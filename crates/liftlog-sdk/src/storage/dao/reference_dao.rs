//! 参考数据 DAO - equipment / muscle_group / exercise / 模板及关联表
//!
//! 一次 upsert 写入一种类型的完整集合，包在一个事务里：要么整批可见，要么都不可见。

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::storage::entities::{
    Equipment, Exercise, MuscleGroup, ReferenceBatch, TemplateDay, WorkoutTemplate,
};
use crate::sync::ReferenceKind;

pub struct ReferenceDao<'a> {
    conn: &'a Connection,
}

impl<'a> ReferenceDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 写入一种参考数据的完整集合（单事务），返回写入行数
    pub fn upsert_batch(&self, batch: &ReferenceBatch, synced_at: i64) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        match batch {
            ReferenceBatch::Equipment(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO equipment (id, name, synced_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.id, r.name, synced_at])?;
                }
            }
            ReferenceBatch::MuscleGroups(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO muscle_group (id, name, body_region, synced_at) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        body_region = excluded.body_region,
                        synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.id, r.name, r.body_region, synced_at])?;
                }
            }
            ReferenceBatch::Exercises(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO exercise (id, name, description, primary_muscle_group_id, is_compound, synced_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        primary_muscle_group_id = excluded.primary_muscle_group_id,
                        is_compound = excluded.is_compound,
                        synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![
                        r.id,
                        r.name,
                        r.description,
                        r.primary_muscle_group_id,
                        r.is_compound as i32,
                        synced_at
                    ])?;
                }
            }
            ReferenceBatch::ExerciseEquipment(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO exercise_equipment (exercise_id, equipment_id, synced_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(exercise_id, equipment_id) DO UPDATE SET synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.exercise_id, r.equipment_id, synced_at])?;
                }
            }
            ReferenceBatch::ExerciseSecondaryMuscles(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO exercise_secondary_muscle (exercise_id, muscle_group_id, synced_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(exercise_id, muscle_group_id) DO UPDATE SET synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.exercise_id, r.muscle_group_id, synced_at])?;
                }
            }
            ReferenceBatch::WorkoutTemplates(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO workout_template (id, name, description, days_per_week, difficulty, synced_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        days_per_week = excluded.days_per_week,
                        difficulty = excluded.difficulty,
                        synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![
                        r.id,
                        r.name,
                        r.description,
                        r.days_per_week,
                        r.difficulty,
                        synced_at
                    ])?;
                }
            }
            ReferenceBatch::TemplateDays(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO template_day (id, template_id, day_index, name, synced_at) VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(id) DO UPDATE SET
                        template_id = excluded.template_id,
                        day_index = excluded.day_index,
                        name = excluded.name,
                        synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.id, r.template_id, r.day_index, r.name, synced_at])?;
                }
            }
            ReferenceBatch::TemplateDayMuscles(rows) => {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO template_day_muscle (template_day_id, muscle_group_id, synced_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(template_day_id, muscle_group_id) DO UPDATE SET synced_at = excluded.synced_at
                    "#,
                )?;
                for r in rows {
                    stmt.execute(params![r.template_day_id, r.muscle_group_id, synced_at])?;
                }
            }
        }
        tx.commit()?;
        Ok(batch.len())
    }

    pub fn count(&self, kind: ReferenceKind) -> Result<i64> {
        // 表名与 ReferenceKind::as_str 一致，来自受控枚举
        let sql = format!("SELECT COUNT(*) FROM {}", kind.as_str());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// 外键目标缺失的行数（完整 bootstrap 之后应为 0）
    pub fn count_orphans(&self) -> Result<i64> {
        let sql = r#"
            SELECT
              (SELECT COUNT(*) FROM exercise e
                 WHERE NOT EXISTS (SELECT 1 FROM muscle_group m WHERE m.id = e.primary_muscle_group_id))
            + (SELECT COUNT(*) FROM exercise_equipment x
                 WHERE NOT EXISTS (SELECT 1 FROM exercise e WHERE e.id = x.exercise_id)
                    OR NOT EXISTS (SELECT 1 FROM equipment q WHERE q.id = x.equipment_id))
            + (SELECT COUNT(*) FROM exercise_secondary_muscle s
                 WHERE NOT EXISTS (SELECT 1 FROM exercise e WHERE e.id = s.exercise_id)
                    OR NOT EXISTS (SELECT 1 FROM muscle_group m WHERE m.id = s.muscle_group_id))
            + (SELECT COUNT(*) FROM template_day d
                 WHERE NOT EXISTS (SELECT 1 FROM workout_template t WHERE t.id = d.template_id))
            + (SELECT COUNT(*) FROM template_day_muscle dm
                 WHERE NOT EXISTS (SELECT 1 FROM template_day d WHERE d.id = dm.template_day_id)
                    OR NOT EXISTS (SELECT 1 FROM muscle_group m WHERE m.id = dm.muscle_group_id))
        "#;
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    pub fn list_equipment(&self) -> Result<Vec<Equipment>> {
        let mut stmt = self.conn.prepare("SELECT id, name, synced_at FROM equipment ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Equipment {
                id: row.get(0)?,
                name: row.get(1)?,
                synced_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_muscle_groups(&self) -> Result<Vec<MuscleGroup>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, body_region, synced_at FROM muscle_group ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(MuscleGroup {
                id: row.get(0)?,
                name: row.get(1)?,
                body_region: row.get(2)?,
                synced_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_exercises(&self) -> Result<Vec<Exercise>> {
        let sql = r#"
            SELECT id, name, description, primary_muscle_group_id, is_compound, synced_at
            FROM exercise
            ORDER BY name
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_exercise)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_exercise(&self, id: i64) -> Result<Option<Exercise>> {
        let sql = r#"
            SELECT id, name, description, primary_muscle_group_id, is_compound, synced_at
            FROM exercise WHERE id = ?1
        "#;
        Ok(self.conn.query_row(sql, params![id], row_to_exercise).optional()?)
    }

    pub fn list_workout_templates(&self) -> Result<Vec<WorkoutTemplate>> {
        let sql = r#"
            SELECT id, name, description, days_per_week, difficulty, synced_at
            FROM workout_template
            ORDER BY id
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(WorkoutTemplate {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                days_per_week: row.get(3)?,
                difficulty: row.get(4)?,
                synced_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_template_days(&self, template_id: i64) -> Result<Vec<TemplateDay>> {
        let sql = r#"
            SELECT id, template_id, day_index, name, synced_at
            FROM template_day
            WHERE template_id = ?1
            ORDER BY day_index
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![template_id], |row| {
            Ok(TemplateDay {
                id: row.get(0)?,
                template_id: row.get(1)?,
                day_index: row.get(2)?,
                name: row.get(3)?,
                synced_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_exercise(row: &Row) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        primary_muscle_group_id: row.get(3)?,
        is_compound: row.get::<_, i32>(4)? != 0,
        synced_at: row.get(5)?,
    })
}
