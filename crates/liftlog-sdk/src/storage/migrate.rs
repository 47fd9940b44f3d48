//! 数据库迁移与初始化 - 由 refinery 自动管理
//!
//! - Migration 版本 = migrations 文件顺序（V{n}__{name}.sql），编译期嵌入、自动执行。
//! - 统一入口 `init_db`：pragmas → migrate → 版本校验。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;
use tracing::debug;

use crate::error::{LiftlogSDKError, Result};
use crate::version::SDK_DB_VERSION;

/// refinery 使用的 migration 历史表名
const REFINERY_TABLE: &str = "refinery_schema_history";

/// WAL、NORMAL 同步、外键（参考数据依赖顺序靠它兜底）、内存临时表。
const PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA temp_store=MEMORY;
";

/// 核心表，迁移后必须存在
const CORE_TABLES: &[&str] = &["exercise", "exercise_set", "user_workout_day", "sync_queue"];

pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS.trim())
        .map_err(|e| LiftlogSDKError::Database(format!("设置 PRAGMA 失败: {}", e)))?;
    Ok(())
}

/// 执行内置 migrations（编译期嵌入，按版本顺序执行）。
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| LiftlogSDKError::Migration(format!("执行 migration 失败: {}", e)))?;
    for m in report.applied_migrations() {
        debug!("📦 已应用 migration: V{}__{}", m.version(), m.name());
    }
    Ok(())
}

/// 读取 refinery 表中当前数据库的 migration 版本；无表或空表返回 None。
fn get_db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [REFINERY_TABLE],
            |row| row.get(0),
        )
        .map_err(|e| LiftlogSDKError::Database(format!("查询 {} 失败: {}", REFINERY_TABLE, e)))?;

    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn
        .query_row(
            &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
            [],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(|e| LiftlogSDKError::Database(format!("读取 migration 版本失败: {}", e)))?;

    Ok(version.filter(|&v| v > 0))
}

/// 若 DB 版本 > 当前 SDK 支持的最高版本，拒绝使用（防 downgrade 后 schema 不兼容）。
fn check_db_version(conn: &Connection) -> Result<()> {
    let Some(v) = get_db_migration_version(conn)? else {
        return Ok(());
    };
    if v > SDK_DB_VERSION {
        return Err(LiftlogSDKError::Database(format!(
            "数据库版本 {} 高于当前 SDK 支持的最高版本 {}，请升级 SDK 后再打开",
            v, SDK_DB_VERSION
        )));
    }
    Ok(())
}

fn verify_core_tables(conn: &Connection) -> Result<()> {
    for table in CORE_TABLES {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(LiftlogSDKError::Migration(format!("迁移后缺少核心表: {}", table)));
        }
    }
    Ok(())
}

/// 统一初始化入口：先校验版本，再开 pragmas、执行 migrations，最后确认核心表。
pub fn init_db(conn: &mut Connection) -> Result<()> {
    check_db_version(conn)?;
    enable_pragmas(conn)?;
    run_migrations(conn)?;
    verify_core_tables(conn)?;
    Ok(())
}
