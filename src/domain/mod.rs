// ==========================================
// 供应商订单文件系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、转换规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod file_record;
pub mod merge_record;
pub mod processing_event;
pub mod rule;
pub mod supplier;
pub mod table;
pub mod types;

// 重导出核心类型
pub use file_record::{FileQuery, FileRecord, NewFileRecord, DEFAULT_LEASE_TIMEOUT_MINUTES};
pub use merge_record::MergeRecord;
pub use processing_event::ProcessingEvent;
pub use rule::{Formatter, OrderedMap, RuleModel, ValueSpec};
pub use supplier::{RemoteEndpoint, SourceConfig, Supplier, SupplierDocument, SupplierDraft};
pub use table::{CellValue, Table};
pub use types::{EventAction, FileKind, FileStatus, SourceKind};
