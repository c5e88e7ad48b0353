// ==========================================
// 供应商订单文件系统 - 单元格格式化
// ==========================================
// 红线: 无法解析的值保持原样（不报错、不丢行）
// 对已规范的 integer / float / date 值重复格式化是幂等的
// ==========================================

use crate::domain::rule::Formatter;
use crate::domain::table::CellValue;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// 对单元格应用格式化器
pub fn apply(formatter: &Formatter, cell: &CellValue) -> CellValue {
    match formatter {
        Formatter::Uppercase => map_text(cell, |s| s.to_uppercase()),
        Formatter::Lowercase => map_text(cell, |s| s.to_lowercase()),
        Formatter::Trim => map_text(cell, |s| s.trim().to_string()),
        Formatter::Integer => to_integer(cell).unwrap_or_else(|| cell.clone()),
        Formatter::Float => to_float(cell).unwrap_or_else(|| cell.clone()),
        Formatter::Date => to_date(cell).unwrap_or_else(|| cell.clone()),
        Formatter::Unknown(_) => cell.clone(),
    }
}

fn map_text(cell: &CellValue, f: impl Fn(&str) -> String) -> CellValue {
    match cell {
        CellValue::Empty => CellValue::Empty,
        CellValue::Text(s) => CellValue::Text(f(s)),
        other => CellValue::Text(f(&other.render())),
    }
}

// ==========================================
// 数值
// ==========================================

fn to_integer(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Integer(i) => Some(CellValue::Integer(*i)),
        CellValue::Float(f) => truncate_f64(*f).map(CellValue::Integer),
        CellValue::Text(s) => {
            let cleaned = clean_number(s);
            if let Ok(i) = cleaned.parse::<i64>() {
                return Some(CellValue::Integer(i));
            }
            parse_decimal(s).and_then(truncate_f64).map(CellValue::Integer)
        }
        _ => None,
    }
}

fn to_float(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Float(f) => Some(CellValue::Float(*f)),
        CellValue::Integer(i) => Some(CellValue::Float(*i as f64)),
        CellValue::Text(s) => parse_decimal(s).map(CellValue::Float),
        _ => None,
    }
}

/// 向零截断; 超出 i64 范围或非有限值返回 None
fn truncate_f64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t > i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

/// 去除空白与千分位空格（含不换行空格）
fn clean_number(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect()
}

/// 解析十进制数: 支持 "12.5" / "12,5" / "1.234,5" / "1,234.5"
///
/// 同时出现 '.' 与 ',' 时，最后出现的一个作为小数点，另一个视为千分位。
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cleaned = clean_number(s);
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

// ==========================================
// 日期（日/月/年顺序）
// ==========================================

const DATE_FORMATS_FULL_YEAR: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d",
];
const DATE_FORMATS_SHORT_YEAR: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

fn to_date(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Date(d) => Some(CellValue::Date(*d)),
        CellValue::DateTime(dt) => Some(CellValue::Date(dt.date())),
        CellValue::Text(s) => parse_date_day_first(s).map(CellValue::Date),
        _ => None,
    }
}

/// 解析日期: 优先日/月/年，输出统一为 NaiveDate
pub fn parse_date_day_first(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS_FULL_YEAR {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            // "%Y" 也能吃下两位年份，这里排除掉交给短年份格式
            if d.year() >= 1000 {
                return Some(d);
            }
        }
    }

    for fmt in DATE_FORMATS_SHORT_YEAR {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(apply(&Formatter::Uppercase, &text("abc123")), text("ABC123"));
        assert_eq!(apply(&Formatter::Lowercase, &text("ABC")), text("abc"));
        assert_eq!(apply(&Formatter::Trim, &text("  a b  ")), text("a b"));
        assert_eq!(apply(&Formatter::Uppercase, &CellValue::Empty), CellValue::Empty);
        assert_eq!(apply(&Formatter::Uppercase, &CellValue::Integer(7)), text("7"));
    }

    #[test]
    fn test_integer_truncates_toward_zero() {
        assert_eq!(apply(&Formatter::Integer, &text("10")), CellValue::Integer(10));
        assert_eq!(apply(&Formatter::Integer, &text("10.7")), CellValue::Integer(10));
        assert_eq!(apply(&Formatter::Integer, &text("-3,9")), CellValue::Integer(-3));
        assert_eq!(apply(&Formatter::Integer, &CellValue::Float(2.99)), CellValue::Integer(2));
        assert_eq!(apply(&Formatter::Integer, &text("1 200")), CellValue::Integer(1200));
    }

    #[test]
    fn test_integer_unparsable_left_unchanged() {
        assert_eq!(apply(&Formatter::Integer, &text("dix")), text("dix"));
        assert_eq!(apply(&Formatter::Integer, &CellValue::Empty), CellValue::Empty);
    }

    #[test]
    fn test_float_comma_decimal() {
        assert_eq!(apply(&Formatter::Float, &text("12,5")), CellValue::Float(12.5));
        assert_eq!(apply(&Formatter::Float, &text("1.234,5")), CellValue::Float(1234.5));
        assert_eq!(apply(&Formatter::Float, &text("1,234.5")), CellValue::Float(1234.5));
        assert_eq!(apply(&Formatter::Float, &CellValue::Integer(3)), CellValue::Float(3.0));
        assert_eq!(apply(&Formatter::Float, &text("n/a")), text("n/a"));
    }

    #[test]
    fn test_date_day_first() {
        assert_eq!(apply(&Formatter::Date, &text("10/03/2025")), CellValue::Date(ymd(2025, 3, 10)));
        assert_eq!(apply(&Formatter::Date, &text("10.03.25")), CellValue::Date(ymd(2025, 3, 10)));
        assert_eq!(apply(&Formatter::Date, &text("2025-03-10")), CellValue::Date(ymd(2025, 3, 10)));
        assert_eq!(
            apply(&Formatter::Date, &text("10/03/2025 14:30")),
            CellValue::Date(ymd(2025, 3, 10))
        );
        assert_eq!(apply(&Formatter::Date, &text("31/02/2025")), text("31/02/2025"));
    }

    #[test]
    fn test_well_formed_values_are_idempotent() {
        for (f, v) in [
            (Formatter::Integer, text("42")),
            (Formatter::Float, text("4,2")),
            (Formatter::Date, text("05/01/2024")),
        ] {
            let once = apply(&f, &v);
            let twice = apply(&f, &once);
            assert_eq!(once, twice);
            // 渲染后再解析也保持不变
            let reparsed = apply(&f, &text(&once.render()));
            assert_eq!(once, reparsed);
        }
    }

    #[test]
    fn test_unknown_formatter_is_noop() {
        let f = Formatter::Unknown("currency".to_string());
        assert_eq!(apply(&f, &text(" x ")), text(" x "));
    }
}
