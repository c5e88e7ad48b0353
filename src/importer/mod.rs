// ==========================================
// 供应商订单文件系统 - 导入层
// ==========================================
// 职责: 订单文件字节 ⇄ 表格
// 支持: Excel (.xlsx/.xls), CSV
// ==========================================

// 模块声明
pub mod error;
pub mod file_parser;
pub mod file_writer;
pub mod table_validator;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, UniversalFileParser};
pub use file_writer::{output_filename, read_csv, write_csv};
pub use table_validator::{table_info, validate_columns, ColumnValidation, TableInfo};
