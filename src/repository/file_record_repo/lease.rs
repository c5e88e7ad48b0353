// ==========================================
// 文件记录 - 租约与状态迁移（条件更新）
// ==========================================
// 所有迁移在 BEGIN IMMEDIATE 事务内执行:
// 1. 读取当前行（仅用于构造结果/事件明细）
// 2. UPDATE ... WHERE <guard>，影响行数 == 1 才算成功
// 3. 成功时在同一事务内追加审计事件
// ==========================================

use super::core::FileRecordRepository;
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::types::{EventAction, FileStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::processing_event_repo::insert_event;
use crate::repository::row_utils::fmt_ts;
use crate::db::TS_FORMAT;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::json;

/// 系统操作员（租约过期回收时使用）
pub const SYSTEM_ACTOR: &str = "system";

/// 加锁尝试结果
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseAttempt {
    /// 获得租约; reclaimed_from 为被回收的过期租约持有者
    Acquired { reclaimed_from: Option<String> },
    /// 自己已持有，续期 locked_at
    Refreshed,
    /// 他人持有有效租约
    Held { holder: String, locked_at: NaiveDateTime },
    /// 当前状态不可加锁（completed / merged）
    NotLockable(FileStatus),
    NotFound,
}

/// 解锁尝试结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseAttempt {
    Released,
    /// 本就未加锁（幂等）
    AlreadyUnlocked(FileStatus),
    HeldByOther { holder: String },
    NotFound,
}

/// 被回收的过期租约
#[derive(Debug, Clone, PartialEq)]
pub struct StaleLease {
    pub file_id: String,
    pub holder: String,
    pub locked_at: NaiveDateTime,
}

struct LockState {
    status: FileStatus,
    locked_by: Option<String>,
    locked_at: Option<NaiveDateTime>,
}

fn read_lock_state(conn: &Connection, file_id: &str) -> RepositoryResult<Option<LockState>> {
    let raw: Option<(String, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT status, locked_by, locked_at FROM file_record WHERE file_id = ?1",
            params![file_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((status, locked_by, locked_at)) = raw else {
        return Ok(None);
    };

    let status = FileStatus::from_db_str(&status).ok_or_else(|| RepositoryError::FieldValueError {
        field: "status".to_string(),
        message: format!("未知状态: {}", status),
    })?;
    let locked_at = locked_at
        .map(|s| {
            NaiveDateTime::parse_from_str(&s, TS_FORMAT).map_err(|e| RepositoryError::FieldValueError {
                field: "locked_at".to_string(),
                message: e.to_string(),
            })
        })
        .transpose()?;

    Ok(Some(LockState {
        status,
        locked_by,
        locked_at,
    }))
}

impl FileRecordRepository {
    /// 原子加锁: 仅当 未加锁 / 自己持有 / 租约已过期 时成功
    pub fn try_acquire_lease(
        &self,
        file_id: &str,
        operator: &str,
        now: NaiveDateTime,
        timeout: Duration,
    ) -> RepositoryResult<LeaseAttempt> {
        let cutoff = fmt_ts(&(now - timeout));
        let now_s = fmt_ts(&now);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(state) = read_lock_state(&tx, file_id)? else {
            return Ok(LeaseAttempt::NotFound);
        };

        let rows = tx.execute(
            r#"
            UPDATE file_record
            SET status = 'processing', locked_by = ?1, locked_at = ?2, updated_at = ?2
            WHERE file_id = ?3
              AND status IN ('pending', 'processing', 'error')
              AND (locked_by IS NULL OR locked_by = ?1 OR locked_at < ?4)
            "#,
            params![operator, now_s, file_id, cutoff],
        )?;

        if rows == 0 {
            return Ok(match (state.locked_by, state.locked_at) {
                (Some(holder), Some(locked_at)) if state.status.is_lockable() => {
                    LeaseAttempt::Held { holder, locked_at }
                }
                _ => LeaseAttempt::NotLockable(state.status),
            });
        }

        let outcome = match state.locked_by {
            Some(holder) if holder == operator => LeaseAttempt::Refreshed,
            Some(holder) => LeaseAttempt::Acquired {
                reclaimed_from: Some(holder),
            },
            None => LeaseAttempt::Acquired { reclaimed_from: None },
        };

        let detail = match &outcome {
            LeaseAttempt::Refreshed => json!({ "refreshed": true }),
            LeaseAttempt::Acquired {
                reclaimed_from: Some(prev),
            } => json!({
                "previous_status": state.status.as_str(),
                "reclaimed_from": prev,
                "reclaimed_locked_at": state.locked_at.map(|t| fmt_ts(&t)),
            }),
            _ => json!({ "previous_status": state.status.as_str() }),
        };
        insert_event(
            &tx,
            &ProcessingEvent::new(file_id, operator, EventAction::Locked, detail, now),
        )?;

        tx.commit()?;
        Ok(outcome)
    }

    /// 解锁: 仅持有者可解锁,回到 pending; 未加锁时为无操作
    pub fn release_lease(&self, file_id: &str, operator: &str, now: NaiveDateTime) -> RepositoryResult<ReleaseAttempt> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(state) = read_lock_state(&tx, file_id)? else {
            return Ok(ReleaseAttempt::NotFound);
        };

        let rows = tx.execute(
            r#"
            UPDATE file_record
            SET status = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?1
            WHERE file_id = ?2 AND status = 'processing' AND locked_by = ?3
            "#,
            params![fmt_ts(&now), file_id, operator],
        )?;

        if rows == 0 {
            return Ok(match state.locked_by {
                Some(holder) => ReleaseAttempt::HeldByOther { holder },
                None => ReleaseAttempt::AlreadyUnlocked(state.status),
            });
        }

        insert_event(
            &tx,
            &ProcessingEvent::new(file_id, operator, EventAction::Unlocked, json!({}), now),
        )?;
        tx.commit()?;
        Ok(ReleaseAttempt::Released)
    }

    /// processing → completed（仅持有者）; 返回是否迁移成功
    pub fn complete_with_event(
        &self,
        file_id: &str,
        operator: &str,
        transformed_path: &str,
        row_count: i64,
        now: NaiveDateTime,
        detail: serde_json::Value,
    ) -> RepositoryResult<bool> {
        let now_s = fmt_ts(&now);
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = tx.execute(
            r#"
            UPDATE file_record
            SET status = 'completed', locked_by = NULL, locked_at = NULL,
                processed_by = ?1, processed_at = ?2, transformed_path = ?3,
                row_count = ?4, error_message = NULL, updated_at = ?2
            WHERE file_id = ?5 AND status = 'processing' AND locked_by = ?1
            "#,
            params![operator, now_s, transformed_path, row_count, file_id],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        insert_event(
            &tx,
            &ProcessingEvent::new(file_id, operator, EventAction::Transformed, detail, now),
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// processing → error（仅持有者）; 清空租约以便重试
    pub fn fail_with_event(
        &self,
        file_id: &str,
        operator: &str,
        error_message: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let now_s = fmt_ts(&now);
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = tx.execute(
            r#"
            UPDATE file_record
            SET status = 'error', locked_by = NULL, locked_at = NULL,
                processed_by = ?1, processed_at = ?2, error_message = ?3, updated_at = ?2
            WHERE file_id = ?4 AND status = 'processing' AND locked_by = ?1
            "#,
            params![operator, now_s, error_message, file_id],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        insert_event(
            &tx,
            &ProcessingEvent::new(
                file_id,
                operator,
                EventAction::Error,
                json!({ "message": error_message }),
                now,
            ),
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// 回收所有过期租约: processing → pending
    pub fn reset_stale_leases(&self, now: NaiveDateTime, timeout: Duration) -> RepositoryResult<Vec<StaleLease>> {
        let cutoff = fmt_ts(&(now - timeout));
        let now_s = fmt_ts(&now);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT file_id FROM file_record WHERE status = 'processing' AND locked_at < ?1",
            )?;
            let ids = stmt
                .query_map(params![cutoff], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut reclaimed = Vec::new();
        for file_id in candidates {
            let Some(state) = read_lock_state(&tx, &file_id)? else {
                continue;
            };
            let rows = tx.execute(
                r#"
                UPDATE file_record
                SET status = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?1
                WHERE file_id = ?2 AND status = 'processing' AND locked_at < ?3
                "#,
                params![now_s, file_id, cutoff],
            )?;
            if rows == 0 {
                continue;
            }

            let holder = state.locked_by.unwrap_or_default();
            let locked_at = state.locked_at.unwrap_or(now);
            insert_event(
                &tx,
                &ProcessingEvent::new(
                    &file_id,
                    SYSTEM_ACTOR,
                    EventAction::Unlocked,
                    json!({
                        "reason": "lease_expired",
                        "previous_holder": holder,
                        "locked_at": fmt_ts(&locked_at),
                    }),
                    now,
                ),
            )?;
            reclaimed.push(StaleLease {
                file_id,
                holder,
                locked_at,
            });
        }

        tx.commit()?;
        Ok(reclaimed)
    }
}
