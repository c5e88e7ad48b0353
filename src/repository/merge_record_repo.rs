// ==========================================
// 供应商订单文件系统 - 合并记录数据仓储
// ==========================================
// 红线: 合并提交是单个事务
//   - 每个输入文件 completed → merged（条件更新，影响行数必须为 1）
//   - 写入 merge_record 与每个文件的 merged 事件
//   任一条件不满足则整体回滚
// ==========================================

use crate::domain::merge_record::MergeRecord;
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::types::EventAction;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::processing_event_repo::insert_event;
use crate::repository::row_utils::{fmt_date, fmt_ts, get_date, get_json, get_ts};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::json;
use std::sync::{Arc, Mutex};

const MERGE_COLUMNS: &str = "merge_id, supplier_id, output_path, file_ids_json, date_from, date_to, \
     row_count, created_by, created_at";

/// 合并提交结果
#[derive(Debug, Clone, PartialEq)]
pub enum MergeCommit {
    Committed,
    /// 该文件已不处于 completed（或不属于该供应商），事务已回滚
    Conflict { file_id: String },
}

pub struct MergeRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MergeRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 原子提交合并
    pub fn commit_merge(&self, record: &MergeRecord) -> RepositoryResult<MergeCommit> {
        let now_s = fmt_ts(&record.created_at);
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for file_id in &record.file_ids {
            let rows = tx.execute(
                r#"
                UPDATE file_record SET status = 'merged', updated_at = ?1
                WHERE file_id = ?2 AND supplier_id = ?3 AND status = 'completed'
                "#,
                params![now_s, file_id, record.supplier_id],
            )?;
            if rows != 1 {
                // tx drop → 回滚
                return Ok(MergeCommit::Conflict {
                    file_id: file_id.clone(),
                });
            }
        }

        tx.execute(
            r#"
            INSERT INTO merge_record (
                merge_id, supplier_id, output_path, file_ids_json, date_from, date_to,
                row_count, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.merge_id,
                record.supplier_id,
                record.output_path,
                serde_json::to_string(&record.file_ids)?,
                fmt_date(&record.date_from),
                fmt_date(&record.date_to),
                record.row_count,
                record.created_by,
                now_s,
            ],
        )?;

        for file_id in &record.file_ids {
            insert_event(
                &tx,
                &ProcessingEvent::new(
                    file_id,
                    &record.created_by,
                    EventAction::Merged,
                    json!({ "merge_id": record.merge_id, "output_path": record.output_path }),
                    record.created_at,
                ),
            )?;
        }

        tx.commit()?;
        Ok(MergeCommit::Committed)
    }

    pub fn find_by_id(&self, merge_id: &str) -> RepositoryResult<Option<MergeRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM merge_record WHERE merge_id = ?1", MERGE_COLUMNS);
        Ok(conn.query_row(&sql, params![merge_id], map_merge).optional()?)
    }

    /// 某供应商的合并历史（新 → 旧）
    pub fn list_by_supplier(&self, supplier_id: &str) -> RepositoryResult<Vec<MergeRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM merge_record WHERE supplier_id = ?1 ORDER BY created_at DESC, rowid DESC",
            MERGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![supplier_id], map_merge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn map_merge(row: &Row<'_>) -> rusqlite::Result<MergeRecord> {
    Ok(MergeRecord {
        merge_id: row.get(0)?,
        supplier_id: row.get(1)?,
        output_path: row.get(2)?,
        file_ids: get_json(row, 3)?,
        date_from: get_date(row, 4)?,
        date_to: get_date(row, 5)?,
        row_count: row.get(6)?,
        created_by: row.get(7)?,
        created_at: get_ts(row, 8)?,
    })
}
