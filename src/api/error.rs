// ==========================================
// 供应商订单文件系统 - API层错误类型
// ==========================================
// 职责: 汇总各层错误,转换为面向操作员的错误消息
// 锁冲突属于正常竞争结果,以 LockConflict 单独呈现（不自动重试）
// ==========================================

use crate::collector::error::FetchError;
use crate::config::snapshot::SnapshotError;
use crate::engine::error::{FileFlowError, MergeError, TransformError};
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use crate::storage::StorageError;
use chrono::NaiveDateTime;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 协同锁定
    // ==========================================
    #[error("文件正在由 {holder} 处理中（自 {locked_at} 起）")]
    LockConflict {
        holder: String,
        locked_at: NaiveDateTime,
    },

    #[error("未持有文件租约: {0}")]
    LeaseNotHeld(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("不支持的文件: {0}")]
    UnsupportedFile(String),

    // ==========================================
    // 转换 / 合并 / 采集
    // ==========================================
    #[error("转换失败: {0}")]
    TransformFailed(String),

    #[error("合并被拒绝: {0}")]
    MergeRejected(String),

    #[error("文件已被其他操作修改: {0}")]
    ConcurrentModification(String),

    #[error("采集失败: {0}")]
    FetchFailed(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("文件存储错误: {0}")]
    StorageError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::LockError(msg) => ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg)),
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => ApiError::InvalidStateTransition { from, to },
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => ApiError::NotFound(format!("存储对象不存在: {}", path)),
            StorageError::InvalidKey(key) => ApiError::InvalidInput(format!("非法存储路径: {}", key)),
            other => ApiError::StorageError(other.to_string()),
        }
    }
}

impl From<TransformError> for ApiError {
    fn from(err: TransformError) -> Self {
        ApiError::TransformFailed(err.to_string())
    }
}

// ==========================================
// 从 FileFlowError 转换（状态机）
// ==========================================
impl From<FileFlowError> for ApiError {
    fn from(err: FileFlowError) -> Self {
        match err {
            FileFlowError::NotFound(id) => ApiError::NotFound(format!("文件(id={})不存在", id)),
            FileFlowError::LockConflict { holder, locked_at } => ApiError::LockConflict { holder, locked_at },
            FileFlowError::NotLockable { status } => {
                ApiError::BusinessRuleViolation(format!("文件状态为 {}，不能加锁", status))
            }
            FileFlowError::LeaseNotHeld { file_id, operator } => {
                ApiError::LeaseNotHeld(format!("{} 未持有文件 {} 的租约", operator, file_id))
            }
            FileFlowError::InvalidStatus { status, action } => ApiError::InvalidStateTransition {
                from: status.to_string(),
                to: action,
            },
            FileFlowError::UnsupportedFile(name) => ApiError::UnsupportedFile(name),
            FileFlowError::SupplierNotFound(id) => ApiError::NotFound(format!("供应商(id={})不存在", id)),
            FileFlowError::Transform(e) => e.into(),
            FileFlowError::Repository(e) => e.into(),
            FileFlowError::Storage(e) => e.into(),
        }
    }
}

// ==========================================
// 从 MergeError 转换
// ==========================================
impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::ConcurrentModification(id) => ApiError::ConcurrentModification(id),
            MergeError::Repository(e) => e.into(),
            MergeError::Storage(e) => e.into(),
            other => ApiError::MergeRejected(other.to_string()),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::FetchFailed(err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat(name) => ApiError::UnsupportedFile(name),
            other => ApiError::ValidationError(other.to_string()),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Repository(e) => e.into(),
            other => ApiError::ConfigError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::FileStatus;
    use chrono::NaiveDate;

    #[test]
    fn test_lock_conflict_message_names_holder() {
        let locked_at = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let err: ApiError = FileFlowError::LockConflict {
            holder: "alice".to_string(),
            locked_at,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("alice"));
        assert!(msg.contains("处理中"));
    }

    #[test]
    fn test_merge_precondition_maps_to_rejection() {
        let err: ApiError = MergeError::NotCompleted {
            file_id: "f1".into(),
            status: FileStatus::Pending,
        }
        .into();
        assert!(matches!(err, ApiError::MergeRejected(_)));
    }

    #[test]
    fn test_repository_not_found_maps() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "Supplier".into(),
            id: "s1".into(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
