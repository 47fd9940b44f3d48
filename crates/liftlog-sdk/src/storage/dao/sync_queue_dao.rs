//! 待推送队列 DAO - sync_queue 表

use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::storage::queue::{NewOutboxEntry, OutboxEntry};

pub struct SyncQueueDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueueDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 追加一条，返回自增 id（即创建顺序）
    pub fn insert(&self, e: &NewOutboxEntry) -> Result<i64> {
        let sql = r#"
            INSERT INTO sync_queue (table_name, record_id, operation, payload, idempotency_key, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#;
        self.conn.execute(
            sql,
            params![e.table_name, e.record_id, e.operation, e.payload, e.idempotency_key, e.created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 按创建顺序列出全部
    pub fn list_all(&self) -> Result<Vec<OutboxEntry>> {
        let sql = r#"
            SELECT id, table_name, record_id, operation, payload, idempotency_key, created_at
            FROM sync_queue
            ORDER BY id ASC
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?)
    }

    pub fn count_for_record(&self, table_name: &str, record_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE table_name = ?1 AND record_id = ?2",
            params![table_name, record_id],
            |row| row.get(0),
        )?)
    }

    pub fn delete(&self, id: i64) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?)
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<OutboxEntry> {
    Ok(OutboxEntry {
        id: row.get(0)?,
        table_name: row.get(1)?,
        record_id: row.get(2)?,
        operation: row.get(3)?,
        payload: row.get(4)?,
        idempotency_key: row.get(5)?,
        created_at: row.get(6)?,
    })
}
