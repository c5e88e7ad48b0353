// ==========================================
// 供应商订单文件系统 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输入: 对象存储中取回的原始字节
// ==========================================

use crate::domain::table::{CellValue, Table};
use crate::domain::types::FileKind;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveTime;
use csv::ReaderBuilder;
use std::io::Cursor;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser: Send + Sync {
    /// 将原始字节解析为表格（首行为表头，跳过完全空白的行）
    fn parse_table(&self, bytes: &[u8]) -> ImportResult<Table>;
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_table(&self, bytes: &[u8]) -> ImportResult<Table> {
        let text = decode_text(bytes)?;
        let delimiter = sniff_delimiter(&text);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        // 读取表头
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, h)| normalize_header(h, idx))
            .collect();

        if headers.is_empty() {
            return Err(ImportError::MissingHeader);
        }

        // 读取所有行
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row: Vec<CellValue> = record
                .iter()
                .map(|value| CellValue::text(value.trim()))
                .collect();

            // 跳过完全空白的行
            if row.iter().all(|c| c.is_empty()) {
                continue;
            }

            rows.push(row);
        }

        Ok(Table::new(headers, rows))
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_table(&self, bytes: &[u8]) -> ImportResult<Table> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        // 读取第一个 sheet
        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows.next().ok_or(ImportError::MissingHeader)?;

        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(idx, cell)| normalize_header(&cell.to_string(), idx))
            .collect();

        // 读取数据行
        let mut rows = Vec::new();
        for data_row in sheet_rows {
            let row: Vec<CellValue> = data_row.iter().map(cell_from_excel).collect();

            if row.iter().all(|c| c.is_empty()) {
                continue;
            }

            rows.push(row);
        }

        Ok(Table::new(headers, rows))
    }
}

// ==========================================
// 通用文件解析器（根据文件类型选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse(&self, kind: FileKind, bytes: &[u8]) -> ImportResult<Table> {
        match kind {
            FileKind::Csv => CsvParser.parse_table(bytes),
            FileKind::Xlsx | FileKind::Xls => ExcelParser.parse_table(bytes),
        }
    }

    /// 根据文件名扩展名选择解析器
    pub fn parse_named(&self, filename: &str, bytes: &[u8]) -> ImportResult<Table> {
        let kind = FileKind::from_filename(filename)
            .ok_or_else(|| ImportError::UnsupportedFormat(filename.to_string()))?;
        self.parse(kind, bytes)
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 文本解码: UTF-8（去除 BOM），失败时按 Latin-1 解码
fn decode_text(bytes: &[u8]) -> ImportResult<String> {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(ImportError::EncodingError("UTF-16 编码不受支持".to_string()));
    }

    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            tracing::debug!("CSV 非 UTF-8 编码，按 Latin-1 解码");
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// 根据首个非空行判断分隔符（, ; 制表符）
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let candidates = [b',', b';', b'\t'];
    let mut best = b',';
    let mut best_count = 0;
    for c in candidates {
        let count = header.bytes().filter(|b| *b == c).count();
        if count > best_count {
            best = c;
            best_count = count;
        }
    }
    best
}

fn normalize_header(raw: &str, idx: usize) -> String {
    let trimmed = raw.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() {
        format!("Unnamed: {}", idx)
    } else {
        trimmed.to_string()
    }
}

fn cell_from_excel(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.trim()),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time() == NaiveTime::MIN => CellValue::Date(ndt.date()),
            Some(ndt) => CellValue::DateTime(ndt),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s.trim()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_parser_comma() {
        let bytes = "Ref,Qté\nABC123,10\nXYZ9,2\n".as_bytes();
        let table = CsvParser.parse_table(bytes).unwrap();

        assert_eq!(table.columns, vec!["Ref", "Qté"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "Ref"), Some(&CellValue::Text("ABC123".into())));
    }

    #[test]
    fn test_csv_parser_semicolon_and_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("Ref;Quantité;Prix\nA1;3;2,50\n".as_bytes());
        let table = CsvParser.parse_table(&bytes).unwrap();

        assert_eq!(table.columns, vec!["Ref", "Quantité", "Prix"]);
        assert_eq!(table.cell(0, "Prix"), Some(&CellValue::Text("2,50".into())));
    }

    #[test]
    fn test_csv_parser_latin1_fallback() {
        // "Qté" 的 Latin-1 编码: 0xE9
        let bytes: Vec<u8> = vec![b'Q', b't', 0xE9, b'\n', b'1', b'0', b'\n'];
        let table = CsvParser.parse_table(&bytes).unwrap();
        assert_eq!(table.columns, vec!["Qté"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_csv_parser_rejects_utf16() {
        let bytes: Vec<u8> = vec![0xFF, 0xFE, b'a', 0];
        assert!(matches!(
            CsvParser.parse_table(&bytes),
            Err(ImportError::EncodingError(_))
        ));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let bytes = "材料号,重量\nMAT001,2.5\n,\nMAT002,3.0\n".as_bytes();
        let table = CsvParser.parse_table(bytes).unwrap();

        // 应跳过空行
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_csv_parser_ragged_rows_are_padded() {
        let bytes = "a,b,c\n1\n1,2,3,4\n".as_bytes();
        let table = CsvParser.parse_table(bytes).unwrap();
        assert_eq!(table.rows[0], vec![CellValue::text("1"), CellValue::Empty, CellValue::Empty]);
        assert_eq!(table.rows[1].len(), 3);
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let result = UniversalFileParser.parse_named("commande.pdf", b"%PDF");
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_excel_parser_rejects_garbage() {
        assert!(ExcelParser.parse_table(b"not a workbook").is_err());
    }
}
