// ==========================================
// 供应商订单文件系统 - 引擎层错误类型
// ==========================================
// 分类:
// - TransformError: 输入表/规则问题,记录到文件并迁移到 error
// - FileFlowError:  状态机/租约问题（LockConflict 属于正常竞争结果）
// - MergeError:     合并前置条件不满足,整体中止
// ==========================================

use crate::domain::types::FileStatus;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use crate::storage::StorageError;
use chrono::NaiveDateTime;
use thiserror::Error;

/// 转换错误
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("未找到转换规则: {0}")]
    RuleNotFound(String),

    #[error("缺少必需列: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("原始文件读取失败: {0}")]
    OriginalUnavailable(String),

    #[error("输入表无法解析: {0}")]
    Import(#[from] ImportError),

    #[error("转换结果写入失败: {0}")]
    OutputWriteFailed(String),
}

/// 文件状态机错误
#[derive(Error, Debug)]
pub enum FileFlowError {
    #[error("文件不存在: {0}")]
    NotFound(String),

    #[error("文件正在由 {holder} 处理中（加锁时间 {locked_at}）")]
    LockConflict {
        holder: String,
        locked_at: NaiveDateTime,
    },

    #[error("当前状态不允许加锁: status={status}")]
    NotLockable { status: FileStatus },

    #[error("未持有文件租约: file_id={file_id}, operator={operator}")]
    LeaseNotHeld { file_id: String, operator: String },

    #[error("当前状态不允许该操作: status={status}, action={action}")]
    InvalidStatus { status: FileStatus, action: String },

    #[error("不支持的文件类型: {0}")]
    UnsupportedFile(String),

    #[error("供应商不存在: {0}")]
    SupplierNotFound(String),

    #[error("转换失败: {0}")]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 合并错误
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("合并文件列表为空")]
    EmptySelection,

    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件不属于该供应商: file_id={file_id}, expected={expected}, actual={actual}")]
    SupplierMismatch {
        file_id: String,
        expected: String,
        actual: String,
    },

    #[error("文件状态不是 completed: file_id={file_id}, status={status}")]
    NotCompleted { file_id: String, status: FileStatus },

    #[error("转换结果缺失: file_id={0}")]
    MissingArtifact(String),

    #[error("转换结果无法读取: file_id={file_id}: {message}")]
    UnreadableArtifact { file_id: String, message: String },

    #[error("文件在合并期间被修改: file_id={0}")]
    ConcurrentModification(String),

    #[error("合并结果写出失败: {0}")]
    OutputWriteFailed(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FileFlowResult<T> = Result<T, FileFlowError>;
pub type MergeResult<T> = Result<T, MergeError>;
