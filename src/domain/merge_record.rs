// ==========================================
// 供应商订单文件系统 - 合并记录领域模型
// ==========================================
// 由合并引擎一次性创建,之后不可变
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub merge_id: String,
    pub supplier_id: String,
    pub output_path: String,
    pub file_ids: Vec<String>, // 按合并顺序（收件日期升序）
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub row_count: i64,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}
