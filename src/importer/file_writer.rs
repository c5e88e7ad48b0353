// ==========================================
// 供应商订单文件系统 - 表格写出
// ==========================================
// 输出格式: UTF-8 (带 BOM) CSV，便于 Excel 直接打开
// 回读: 只用于本系统写出的产物（固定逗号分隔，保留空行与空白）
// ==========================================

use crate::domain::table::{CellValue, Table};
use crate::importer::error::{ImportError, ImportResult};
use csv::{ReaderBuilder, WriterBuilder};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 将表格写出为 CSV 字节
pub fn write_csv(table: &Table) -> ImportResult<Vec<u8>> {
    let mut buffer = vec![0xEF, 0xBB, 0xBF];

    {
        let mut writer = WriterBuilder::new().from_writer(&mut buffer);
        writer
            .write_record(&table.columns)
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;

        for row in &table.rows {
            writer
                .write_record(row.iter().map(|c| c.render()))
                .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
        }

        writer
            .flush()
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
    }

    Ok(buffer)
}

/// 回读 write_csv 的产物: 行数、单元格内容与写出时一致
pub fn read_csv(bytes: &[u8]) -> ImportResult<Table> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if columns.is_empty() {
        return Err(ImportError::MissingHeader);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|value| {
                    if value.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(value.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Table::new(columns, rows))
}

/// 输出文件名: 原文件名主干 + 后缀 + .csv
pub fn output_filename(original: &str, suffix: &str) -> String {
    let stem = std::path::Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    format!("{}{}.csv", stem, suffix)
}
