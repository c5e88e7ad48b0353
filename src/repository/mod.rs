// ==========================================
// 供应商订单文件系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod file_record_repo;
pub mod merge_record_repo;
pub mod processing_event_repo;
pub mod row_utils;
pub mod supplier_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use file_record_repo::{
    FileRecordRepository, LeaseAttempt, ReleaseAttempt, StaleLease, StatusCount, SYSTEM_ACTOR,
};
pub use merge_record_repo::{MergeCommit, MergeRecordRepository};
pub use processing_event_repo::ProcessingEventRepository;
pub use supplier_repo::{SupplierImportSummary, SupplierRepository};
