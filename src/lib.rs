// ==========================================
// 供应商订单文件系统 - 核心库
// ==========================================
// 流程: 采集 → 登记(pending) → 加锁 → 转换 → completed/error → 合并
// 技术栈: Rust + SQLite + 本地对象存储
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 转换 / 状态机 / 合并
pub mod engine;

// 导入层 - 表格读写
pub mod importer;

// 采集层 - 邮箱 / 远程目录
pub mod collector;

// 对象存储 - 原始文件与产出文件
pub mod storage;

// 配置层 - 运行参数与规则文档
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/表结构）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 前端操作入口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EventAction, FileKind, FileStatus, SourceKind};

// 领域实体
pub use domain::{FileQuery, FileRecord, MergeRecord, ProcessingEvent, RuleModel, Supplier, Table};

// 引擎
pub use engine::{FileLifecycleService, MergeEngine, StaleLeaseSweeper, TransformationEngine};

// 采集
pub use collector::{CollectionSummary, CollectorOrchestrator};

// API
pub use api::{ApiError, OrderFileApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "供应商订单文件系统";
