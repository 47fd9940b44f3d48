//! 用户训练数据 DAO - user_workout_day / exercise_set

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

use crate::error::Result;
use crate::storage::entities::{ExerciseSet, SetPatch, SyncStatus, UserWorkoutDay};
use crate::storage::queue::EntityClass;

const DAY_COLUMNS: &str =
    "id, plan_id, day_index, name, scheduled_date, notes, completed_at, sync_status, updated_at";
const SET_COLUMNS: &str = "id, workout_day_id, exercise_id, set_number, target_reps, target_weight, \
     actual_reps, actual_weight, completed, sync_status, updated_at";

pub struct WorkoutDao<'a> {
    conn: &'a Connection,
}

impl<'a> WorkoutDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_day(&self, id: i64) -> Result<Option<UserWorkoutDay>> {
        let sql = format!("SELECT {} FROM user_workout_day WHERE id = ?1", DAY_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], row_to_day).optional()?)
    }

    pub fn get_set(&self, id: i64) -> Result<Option<ExerciseSet>> {
        let sql = format!("SELECT {} FROM exercise_set WHERE id = ?1", SET_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], row_to_set).optional()?)
    }

    pub fn list_sets_for_day(&self, day_id: i64) -> Result<Vec<ExerciseSet>> {
        let sql = format!(
            "SELECT {} FROM exercise_set WHERE workout_day_id = ?1 ORDER BY exercise_id, set_number",
            SET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![day_id], row_to_set)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 应用训练组修改并置为 pending，返回受影响行数（0 表示不存在）
    pub fn apply_set_patch(&self, id: i64, patch: &SetPatch, now: i64) -> Result<usize> {
        let sql = r#"
            UPDATE exercise_set SET
                actual_reps = COALESCE(?2, actual_reps),
                actual_weight = COALESCE(?3, actual_weight),
                completed = COALESCE(?4, completed),
                sync_status = 'pending',
                updated_at = ?5
            WHERE id = ?1
        "#;
        let completed = patch.completed.map(|c| c as i32);
        Ok(self
            .conn
            .execute(sql, params![id, patch.actual_reps, patch.actual_weight, completed, now])?)
    }

    pub fn complete_day(&self, id: i64, completed_at: i64, now: i64) -> Result<usize> {
        let sql = r#"
            UPDATE user_workout_day SET completed_at = ?2, sync_status = 'pending', updated_at = ?3
            WHERE id = ?1
        "#;
        Ok(self.conn.execute(sql, params![id, completed_at, now])?)
    }

    pub fn update_day_notes(&self, id: i64, notes: Option<&str>, now: i64) -> Result<usize> {
        let sql = r#"
            UPDATE user_workout_day SET notes = ?2, sync_status = 'pending', updated_at = ?3
            WHERE id = ?1
        "#;
        Ok(self.conn.execute(sql, params![id, notes, now])?)
    }

    pub fn mark_day_pending(&self, id: i64, now: i64) -> Result<usize> {
        let sql = "UPDATE user_workout_day SET sync_status = 'pending', updated_at = ?2 WHERE id = ?1";
        Ok(self.conn.execute(sql, params![id, now])?)
    }

    pub fn set_sync_status(&self, class: EntityClass, id: i64, status: SyncStatus) -> Result<usize> {
        // 表名来自受控枚举
        let sql = format!("UPDATE {} SET sync_status = ?2 WHERE id = ?1", class.table());
        Ok(self.conn.execute(&sql, params![id, status.as_str()])?)
    }

    /// 写入服务端下发的训练日；outbox 里仍有待推送条目的行不覆盖。返回是否写入。
    pub fn upsert_day_unless_queued(&self, d: &UserWorkoutDay) -> Result<bool> {
        let sql = r#"
            INSERT INTO user_workout_day
                (id, plan_id, day_index, name, scheduled_date, notes, completed_at, sync_status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'synced', ?8)
            ON CONFLICT(id) DO UPDATE SET
                plan_id = excluded.plan_id,
                day_index = excluded.day_index,
                name = excluded.name,
                scheduled_date = excluded.scheduled_date,
                notes = excluded.notes,
                completed_at = excluded.completed_at,
                sync_status = 'synced',
                updated_at = excluded.updated_at
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_queue
                WHERE table_name = 'UserWorkoutDay' AND record_id = user_workout_day.id
            )
        "#;
        let changed = self.conn.execute(
            sql,
            params![
                d.id,
                d.plan_id,
                d.day_index,
                d.name,
                d.scheduled_date,
                d.notes,
                d.completed_at,
                d.updated_at
            ],
        )?;
        Ok(changed > 0)
    }

    /// 写入服务端下发的训练组；outbox 里仍有待推送条目的行不覆盖。返回是否写入。
    pub fn upsert_set_unless_queued(&self, s: &ExerciseSet) -> Result<bool> {
        let sql = r#"
            INSERT INTO exercise_set
                (id, workout_day_id, exercise_id, set_number, target_reps, target_weight,
                 actual_reps, actual_weight, completed, sync_status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'synced', ?10)
            ON CONFLICT(id) DO UPDATE SET
                workout_day_id = excluded.workout_day_id,
                exercise_id = excluded.exercise_id,
                set_number = excluded.set_number,
                target_reps = excluded.target_reps,
                target_weight = excluded.target_weight,
                actual_reps = excluded.actual_reps,
                actual_weight = excluded.actual_weight,
                completed = excluded.completed,
                sync_status = 'synced',
                updated_at = excluded.updated_at
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_queue
                WHERE table_name = 'ExerciseSet' AND record_id = exercise_set.id
            )
        "#;
        let changed = self.conn.execute(
            sql,
            params![
                s.id,
                s.workout_day_id,
                s.exercise_id,
                s.set_number,
                s.target_reps,
                s.target_weight,
                s.actual_reps,
                s.actual_weight,
                s.completed as i32,
                s.updated_at
            ],
        )?;
        Ok(changed > 0)
    }
}

fn parse_status(row: &Row, idx: usize) -> rusqlite::Result<SyncStatus> {
    let raw: String = row.get(idx)?;
    SyncStatus::from_str(&raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid sync_status: {}", raw).into(),
        )
    })
}

fn row_to_day(row: &Row) -> rusqlite::Result<UserWorkoutDay> {
    Ok(UserWorkoutDay {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        day_index: row.get(2)?,
        name: row.get(3)?,
        scheduled_date: row.get(4)?,
        notes: row.get(5)?,
        completed_at: row.get(6)?,
        sync_status: parse_status(row, 7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_set(row: &Row) -> rusqlite::Result<ExerciseSet> {
    Ok(ExerciseSet {
        id: row.get(0)?,
        workout_day_id: row.get(1)?,
        exercise_id: row.get(2)?,
        set_number: row.get(3)?,
        target_reps: row.get(4)?,
        target_weight: row.get(5)?,
        actual_reps: row.get(6)?,
        actual_weight: row.get(7)?,
        completed: row.get::<_, i32>(8)? != 0,
        sync_status: parse_status(row, 9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dao::SyncQueueDao;
    use crate::storage::migrate::init_db;
    use crate::storage::queue::{NewOutboxEntry, SyncIntent};

    fn open() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        conn
    }

    fn set(id: i64) -> ExerciseSet {
        ExerciseSet {
            id,
            workout_day_id: 7,
            exercise_id: 100,
            set_number: id as i32,
            target_reps: Some(10),
            target_weight: Some(60.0),
            actual_reps: None,
            actual_weight: None,
            completed: false,
            sync_status: SyncStatus::Synced,
            updated_at: 1,
        }
    }

    #[test]
    fn patch_marks_pending_and_keeps_untouched_fields() {
        let conn = open();
        let dao = WorkoutDao::new(&conn);
        dao.upsert_set_unless_queued(&set(10)).unwrap();

        let patch = SetPatch { actual_reps: Some(8), ..Default::default() };
        assert_eq!(dao.apply_set_patch(10, &patch, 2).unwrap(), 1);
        assert_eq!(dao.apply_set_patch(999, &patch, 2).unwrap(), 0);

        let s = dao.get_set(10).unwrap().unwrap();
        assert_eq!(s.actual_reps, Some(8));
        assert_eq!(s.target_reps, Some(10));
        assert!(!s.completed);
        assert_eq!(s.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn pulled_rows_do_not_overwrite_queued_values() {
        let conn = open();
        let dao = WorkoutDao::new(&conn);
        let queue = SyncQueueDao::new(&conn);
        dao.upsert_set_unless_queued(&set(10)).unwrap();

        let patch = SetPatch::completed(12, Some(62.5));
        dao.apply_set_patch(10, &patch, 2).unwrap();
        let intent = SyncIntent::SetUpdate { set_id: 10, patch };
        let entry_id = queue.insert(&NewOutboxEntry::from_intent(&intent, 2).unwrap()).unwrap();

        let mut server = set(10);
        server.actual_reps = Some(3);
        assert!(!dao.upsert_set_unless_queued(&server).unwrap());
        assert_eq!(dao.get_set(10).unwrap().unwrap().actual_reps, Some(12));

        // 条目被永久拒绝后行仍是 pending，但已无待推送内容：以服务端为准
        queue.delete(entry_id).unwrap();
        assert_eq!(dao.get_set(10).unwrap().unwrap().sync_status, SyncStatus::Pending);
        assert!(dao.upsert_set_unless_queued(&server).unwrap());
        let s = dao.get_set(10).unwrap().unwrap();
        assert_eq!((s.actual_reps, s.sync_status), (Some(3), SyncStatus::Synced));
    }
}
