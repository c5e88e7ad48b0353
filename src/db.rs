// ==========================================
// 供应商订单文件系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少多操作员并发写入时的偶发 busy 错误
// - 建表幂等（CREATE ... IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// 日期存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 创建全部表、索引与只追加触发器（幂等）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS supplier (
    supplier_id TEXT PRIMARY KEY,
    supplier_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    file_patterns_json TEXT NOT NULL DEFAULT '[]',
    source_json TEXT NOT NULL,
    rule_id TEXT,
    min_order_amount REAL,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_record (
    file_id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    supplier_id TEXT NOT NULL REFERENCES supplier(supplier_id),
    supplier_code TEXT NOT NULL,
    received_date TEXT NOT NULL,
    file_kind TEXT NOT NULL CHECK (file_kind IN ('csv', 'xlsx', 'xls')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'completed', 'error', 'merged')),
    locked_by TEXT,
    locked_at TEXT,
    processed_by TEXT,
    processed_at TEXT,
    original_path TEXT NOT NULL,
    transformed_path TEXT,
    row_count INTEGER,
    file_size INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL DEFAULT '',
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (supplier_code, filename, content_hash),
    CHECK ((status = 'processing') = (locked_by IS NOT NULL)),
    CHECK (transformed_path IS NULL OR status IN ('completed', 'merged'))
);

CREATE INDEX IF NOT EXISTS idx_file_record_status ON file_record(status);
CREATE INDEX IF NOT EXISTS idx_file_record_supplier ON file_record(supplier_id, received_date);

CREATE TABLE IF NOT EXISTS processing_event (
    event_id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES file_record(file_id),
    actor TEXT NOT NULL,
    action TEXT NOT NULL
        CHECK (action IN ('uploaded', 'locked', 'unlocked', 'transformed', 'sent', 'merged', 'error')),
    detail_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processing_event_file ON processing_event(file_id, created_at);

CREATE TRIGGER IF NOT EXISTS trg_processing_event_no_update
BEFORE UPDATE ON processing_event
BEGIN
    SELECT RAISE(ABORT, 'processing_event is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_processing_event_no_delete
BEFORE DELETE ON processing_event
BEGIN
    SELECT RAISE(ABORT, 'processing_event is append-only');
END;

CREATE TABLE IF NOT EXISTS merge_record (
    merge_id TEXT PRIMARY KEY,
    supplier_id TEXT NOT NULL REFERENCES supplier(supplier_id),
    output_path TEXT NOT NULL,
    file_ids_json TEXT NOT NULL,
    date_from TEXT NOT NULL,
    date_to TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS trg_merge_record_no_update
BEFORE UPDATE ON merge_record
BEGIN
    SELECT RAISE(ABORT, 'merge_record is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_merge_record_no_delete
BEFORE DELETE ON merge_record
BEGIN
    SELECT RAISE(ABORT, 'merge_record is append-only');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_read_schema_version_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
