// ==========================================
// 供应商订单文件系统 - 表格校验
// ==========================================
// 职责: 必需列检查 / 文件概要信息
// ==========================================

use crate::domain::table::Table;
use serde::{Deserialize, Serialize};

/// 列校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValidation {
    pub valid: bool,
    pub missing_columns: Vec<String>,
    pub found_columns: Vec<String>,
    pub row_count: usize,
}

/// 文件概要信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub file_size: usize,
}

/// 校验表格是否包含全部必需列
pub fn validate_columns(table: &Table, required: &[String]) -> ColumnValidation {
    let missing_columns: Vec<String> = required
        .iter()
        .filter(|col| !table.has_column(col))
        .cloned()
        .collect();

    ColumnValidation {
        valid: missing_columns.is_empty(),
        missing_columns,
        found_columns: table.columns.clone(),
        row_count: table.row_count(),
    }
}

pub fn table_info(table: &Table, file_size: usize) -> TableInfo {
    TableInfo {
        row_count: table.row_count(),
        column_count: table.column_count(),
        columns: table.columns.clone(),
        file_size,
    }
}
