// ==========================================
// 供应商订单文件系统 - 处理事件（审计）数据仓储
// ==========================================
// 红线: 只追加（表上有禁止 UPDATE/DELETE 的触发器）
// ==========================================

use crate::domain::processing_event::ProcessingEvent;
use crate::domain::types::EventAction;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{fmt_ts, get_enum, get_json, get_ts};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const EVENT_COLUMNS: &str = "event_id, file_id, actor, action, detail_json, created_at";

pub struct ProcessingEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProcessingEventRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条事件
    pub fn insert(&self, event: &ProcessingEvent) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_event(&conn, event)?;
        Ok(event.event_id.clone())
    }

    /// 某文件的全部事件（时间升序）
    pub fn list_by_file(&self, file_id: &str) -> RepositoryResult<Vec<ProcessingEvent>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM processing_event WHERE file_id = ?1 ORDER BY created_at ASC, rowid ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![file_id], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// 最近的事件（时间倒序）
    pub fn list_recent(&self, limit: i64) -> RepositoryResult<Vec<ProcessingEvent>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM processing_event ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![limit], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn count_by_action(&self, file_id: &str, action: EventAction) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM processing_event WHERE file_id = ?1 AND action = ?2",
            params![file_id, action.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

/// 在给定连接/事务内追加事件（供其他仓储在同一事务中使用）
pub(crate) fn insert_event(conn: &Connection, event: &ProcessingEvent) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO processing_event (event_id, file_id, actor, action, detail_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            event.event_id,
            event.file_id,
            event.actor,
            event.action.as_str(),
            event.detail.to_string(),
            fmt_ts(&event.created_at),
        ],
    )?;
    Ok(())
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<ProcessingEvent> {
    Ok(ProcessingEvent {
        event_id: row.get(0)?,
        file_id: row.get(1)?,
        actor: row.get(2)?,
        action: get_enum(row, 3, EventAction::from_db_str)?,
        detail: get_json(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}
