// ==========================================
// 供应商订单文件系统 - API 层
// ==========================================
// 职责: 面向前端的操作入口与错误汇总
// ==========================================

pub mod error;
pub mod order_file_api;

pub use error::{ApiError, ApiResult};
pub use order_file_api::OrderFileApi;
