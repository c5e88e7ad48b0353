use crate::domain::file_record::FileRecord;
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::types::{FileKind, FileStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::processing_event_repo::insert_event;
use crate::repository::row_utils::{fmt_date, fmt_ts, get_date, get_enum, get_opt_ts, get_ts};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

pub(super) const FILE_COLUMNS: &str = r#"
    file_id, filename, supplier_id, supplier_code, received_date, file_kind, status,
    locked_by, locked_at, processed_by, processed_at, original_path, transformed_path,
    row_count, file_size, content_hash, error_message, created_at, updated_at
"#;

// ==========================================
// FileRecordRepository - 文件记录仓储
// ==========================================
pub struct FileRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FileRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 登记新文件并在同一事务内写入 uploaded 事件
    ///
    /// 同一身份（供应商编码 + 文件名 + 内容哈希）重复登记时返回 UniqueConstraintViolation
    pub fn insert_with_event(&self, record: &FileRecord, event: &ProcessingEvent) -> RepositoryResult<()> {
        if record.status != FileStatus::Pending {
            return Err(RepositoryError::InvalidStateTransition {
                from: "(new)".to_string(),
                to: record.status.to_string(),
            });
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO file_record (
                file_id, filename, supplier_id, supplier_code, received_date, file_kind, status,
                original_path, row_count, file_size, content_hash, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                record.file_id,
                record.filename,
                record.supplier_id,
                record.supplier_code,
                fmt_date(&record.received_date),
                record.file_kind.as_str(),
                record.status.as_str(),
                record.original_path,
                record.row_count,
                record.file_size,
                record.content_hash.as_deref().unwrap_or(""),
                fmt_ts(&record.created_at),
                fmt_ts(&record.updated_at),
            ],
        )?;
        insert_event(&tx, event)?;

        tx.commit()?;
        Ok(())
    }
}

pub(super) fn map_file_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let content_hash: String = row.get(15)?;
    Ok(FileRecord {
        file_id: row.get(0)?,
        filename: row.get(1)?,
        supplier_id: row.get(2)?,
        supplier_code: row.get(3)?,
        received_date: get_date(row, 4)?,
        file_kind: get_enum(row, 5, FileKind::from_db_str)?,
        status: get_enum(row, 6, FileStatus::from_db_str)?,
        locked_by: row.get(7)?,
        locked_at: get_opt_ts(row, 8)?,
        processed_by: row.get(9)?,
        processed_at: get_opt_ts(row, 10)?,
        original_path: row.get(11)?,
        transformed_path: row.get(12)?,
        row_count: row.get(13)?,
        file_size: row.get(14)?,
        content_hash: (!content_hash.is_empty()).then_some(content_hash),
        error_message: row.get(16)?,
        created_at: get_ts(row, 17)?,
        updated_at: get_ts(row, 18)?,
    })
}
