// ==========================================
// 供应商订单文件系统 - 配置层
// ==========================================
// 职责: 运行参数、转换规则文档、运行快照
// 存储: config_kv 表 + 规则 JSON 文件
// ==========================================

pub mod config_manager;
pub mod rule_book;
pub mod snapshot;

// 重导出核心配置类型
pub use config_manager::{config_keys, default_storage_root, ConfigManager, ConfigResult, PipelineSettings};
pub use rule_book::{RuleBook, RuleBookError};
pub use snapshot::{PipelineSnapshot, SnapshotError};
