// ==========================================
// 供应商订单文件系统 - 文件记录领域模型
// ==========================================
// 不变式:
// - locked_by 非空 ⇔ status == processing
// - transformed_path 非空 ⇒ status ∈ {completed, merged}
// 红线: 只能通过状态机迁移修改,永不物理删除
// ==========================================

use crate::domain::types::{FileKind, FileStatus};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 租约超时（分钟）
pub const DEFAULT_LEASE_TIMEOUT_MINUTES: i64 = 30;

// ==========================================
// FileRecord - 文件记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub filename: String,
    pub supplier_id: String,
    pub supplier_code: String, // 冗余快照,供应商编辑后仍可追溯
    pub received_date: NaiveDate,
    pub file_kind: FileKind,
    pub status: FileStatus,

    // ===== 租约 =====
    pub locked_by: Option<String>,
    pub locked_at: Option<NaiveDateTime>,

    // ===== 处理结果 =====
    pub processed_by: Option<String>,
    pub processed_at: Option<NaiveDateTime>,
    pub original_path: String,
    pub transformed_path: Option<String>,
    pub row_count: Option<i64>,
    pub file_size: i64,
    pub content_hash: Option<String>,
    pub error_message: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl FileRecord {
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    /// 租约是否已过期: now - locked_at > timeout
    pub fn lease_expired(&self, now: NaiveDateTime, timeout: Duration) -> bool {
        match (self.status, self.locked_at) {
            (FileStatus::Processing, Some(locked_at)) => now - locked_at > timeout,
            _ => false,
        }
    }

    /// 当前是否由 operator 持有有效租约
    pub fn is_held_by(&self, operator: &str, now: NaiveDateTime, timeout: Duration) -> bool {
        self.status == FileStatus::Processing
            && self.locked_by.as_deref() == Some(operator)
            && !self.lease_expired(now, timeout)
    }

    /// 状态不变式检查
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.locked_by.is_some() != (self.status == FileStatus::Processing) {
            return Err(format!(
                "locked_by={:?} 与 status={} 不一致",
                self.locked_by, self.status
            ));
        }
        if self.transformed_path.is_some()
            && !matches!(self.status, FileStatus::Completed | FileStatus::Merged)
        {
            return Err(format!(
                "transformed_path 已设置但 status={}",
                self.status
            ));
        }
        Ok(())
    }
}

// ==========================================
// NewFileRecord - 新文件登记参数
// ==========================================
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub filename: String,
    pub supplier_id: String,
    pub supplier_code: String,
    pub received_date: NaiveDate,
    pub file_kind: FileKind,
    pub original_path: String,
    pub row_count: Option<i64>,
    pub file_size: i64,
    pub content_hash: Option<String>,
}

impl NewFileRecord {
    /// 生成 pending 状态的文件记录（分配 file_id）
    pub fn into_pending(self, now: NaiveDateTime) -> FileRecord {
        FileRecord {
            file_id: uuid::Uuid::new_v4().to_string(),
            filename: self.filename,
            supplier_id: self.supplier_id,
            supplier_code: self.supplier_code,
            received_date: self.received_date,
            file_kind: self.file_kind,
            status: FileStatus::Pending,
            locked_by: None,
            locked_at: None,
            processed_by: None,
            processed_at: None,
            original_path: self.original_path,
            transformed_path: None,
            row_count: self.row_count,
            file_size: self.file_size,
            content_hash: self.content_hash,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// FileQuery - 文件列表过滤条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileQuery {
    pub status: Option<FileStatus>,
    pub supplier_id: Option<String>,
    pub supplier_code: Option<String>,
    pub received_from: Option<NaiveDate>,
    pub received_to: Option<NaiveDate>,
    pub filename_contains: Option<String>,
    pub limit: Option<i64>,
}
