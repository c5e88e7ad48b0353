// ==========================================
// 供应商订单文件系统 - 引擎层
// ==========================================
// 职责: 转换引擎、文件状态机、合并引擎
// 红线: Engine 不拼 SQL（条件更新由仓储层提供）
// ==========================================

pub mod error;
pub mod file_lifecycle;
pub mod formatter;
pub mod merge;
pub mod stale_sweeper;
pub mod transformer;

// 重导出核心引擎
pub use error::{FileFlowError, FileFlowResult, MergeError, MergeResult, TransformError};
pub use file_lifecycle::{
    content_hash, FileLifecycleService, LockOutcome, RegisterOutcome, RegisterRequest, ReleaseOutcome,
    TransformOutcome,
};
pub use merge::{MergeEngine, SOURCE_FILE_COLUMN};
pub use stale_sweeper::StaleLeaseSweeper;
pub use transformer::TransformationEngine;
