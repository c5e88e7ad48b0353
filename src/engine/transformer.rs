// ==========================================
// 供应商订单文件系统 - 转换引擎
// ==========================================
// 契约: transform(table, rule) -> table'，纯函数
// 阶段顺序固定: 1.重命名 2.新增 3.删除 4.格式化
// 红线: 不丢行、不重排行
// ==========================================

use crate::domain::rule::{Formatter, OrderedMap, RuleModel, ValueSpec};
use crate::domain::table::{CellValue, Table};
use crate::engine::error::TransformError;
use crate::engine::formatter;
use crate::importer::table_validator::validate_columns;
use chrono::{Local, NaiveDateTime};
use std::collections::{HashMap, HashSet};

// ==========================================
// TransformationEngine - 转换引擎
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformationEngine;

impl TransformationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 使用当前本地时间执行转换
    pub fn transform(&self, table: &Table, rule: &RuleModel) -> Table {
        self.transform_at(table, rule, Local::now().naive_local())
    }

    /// 以指定时间执行转换（today / now 取值来自 `now`）
    pub fn transform_at(&self, table: &Table, rule: &RuleModel, now: NaiveDateTime) -> Table {
        let renamed = rename_columns(table, &rule.rename);
        let added = add_columns(renamed, &rule.add, now);
        let removed = remove_columns(added, &rule.remove);
        format_columns(removed, &rule.format)
    }

    /// 转换前检查规则声明的必需列
    pub fn check_required_columns(&self, table: &Table, rule: &RuleModel) -> Result<(), TransformError> {
        let validation = validate_columns(table, &rule.required_columns);
        if validation.valid {
            Ok(())
        } else {
            Err(TransformError::MissingRequiredColumns(validation.missing_columns))
        }
    }
}

// ==========================================
// 阶段 1: 重命名
// ==========================================
// - 表中不存在的旧列名忽略
// - 多个旧列映射到同一新列名: 按映射顺序后写者胜出，列位置取该名称首次出现的位置
// - 所有映射同时作用于原始列名（A→B, B→C 不会链式变成 C）
// - 新列名与某个未被重命名的原有列同名时，重命名结果胜出，原有列被丢弃
fn rename_columns(table: &Table, rename: &OrderedMap<String>) -> Table {
    if rename.is_empty() {
        return table.clone();
    }

    let mut names = table.columns.clone();
    let mut winner: HashMap<String, usize> = HashMap::new();
    for (old, new) in rename.iter() {
        for (idx, original) in table.columns.iter().enumerate() {
            if original == old {
                names[idx] = new.clone();
                winner.insert(new.clone(), idx);
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources: Vec<usize> = Vec::with_capacity(names.len());
    let mut columns: Vec<String> = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        match winner.get(name) {
            Some(&src) => {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                sources.push(src);
            }
            None => sources.push(idx),
        }
        columns.push(name.clone());
    }

    let rows = table
        .rows
        .iter()
        .map(|row| sources.iter().map(|&src| row[src].clone()).collect())
        .collect();

    Table { columns, rows }
}

// ==========================================
// 阶段 2: 新增
// ==========================================
// 同名列已存在时原位覆盖，否则追加到末尾（按映射顺序）
fn add_columns(mut table: Table, add: &OrderedMap<ValueSpec>, now: NaiveDateTime) -> Table {
    for (name, spec) in add.iter() {
        let value = match spec {
            ValueSpec::Today => CellValue::Date(now.date()),
            ValueSpec::Now => CellValue::DateTime(now),
            ValueSpec::Literal(s) => CellValue::text(s.clone()),
        };

        match table.column_index(name) {
            Some(idx) => {
                for row in table.rows.iter_mut() {
                    row[idx] = value.clone();
                }
            }
            None => {
                table.columns.push(name.to_string());
                for row in table.rows.iter_mut() {
                    row.push(value.clone());
                }
            }
        }
    }
    table
}

// ==========================================
// 阶段 3: 删除
// ==========================================
fn remove_columns(table: Table, remove: &[String]) -> Table {
    if remove.is_empty() {
        return table;
    }

    let drop: HashSet<&str> = remove.iter().map(|s| s.as_str()).collect();
    let keep: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !drop.contains(name.as_str()))
        .map(|(idx, _)| idx)
        .collect();

    let columns = keep.iter().map(|&i| table.columns[i].clone()).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Table { columns, rows }
}

// ==========================================
// 阶段 4: 格式化
// ==========================================
fn format_columns(mut table: Table, format: &OrderedMap<Formatter>) -> Table {
    for (name, f) in format.iter() {
        if matches!(f, Formatter::Unknown(_)) {
            continue;
        }
        let targets: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == name)
            .map(|(idx, _)| idx)
            .collect();

        for row in table.rows.iter_mut() {
            for &idx in &targets {
                row[idx] = formatter::apply(f, &row[idx]);
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn rule(json: &str) -> RuleModel {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_reference_scenario() {
        let table = Table::from_text_grid(&[vec!["Ref", "Qté"], vec!["ABC123", "10"]]);
        let r = rule(
            r#"{
                "rename": {"Ref": "product_ref", "Qté": "quantity"},
                "add": {"date_commande": "today"},
                "remove": [],
                "format": {"product_ref": "uppercase", "quantity": "integer"}
            }"#,
        );

        let out = TransformationEngine.transform_at(&table, &r, now());

        assert_eq!(out.columns, vec!["product_ref", "quantity", "date_commande"]);
        assert_eq!(
            out.rows[0],
            vec![
                CellValue::Text("ABC123".into()),
                CellValue::Integer(10),
                CellValue::Date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
            ]
        );
    }

    #[test]
    fn test_rename_ignores_missing_columns() {
        let table = Table::from_text_grid(&[vec!["a", "b"], vec!["1", "2"]]);
        let out = TransformationEngine.transform_at(&table, &rule(r#"{"rename": {"zz": "y", "a": "x"}}"#), now());
        assert_eq!(out.columns, vec!["x", "b"]);
    }

    #[test]
    fn test_rename_collision_last_write_wins() {
        let table = Table::from_text_grid(&[vec!["Ref", "Désignation", "Reference"], vec!["r1", "d", "r2"]]);
        let out = TransformationEngine.transform_at(
            &table,
            &rule(r#"{"rename": {"Ref": "ref", "Reference": "ref"}}"#),
            now(),
        );
        assert_eq!(out.columns, vec!["ref", "Désignation"]);
        assert_eq!(out.rows[0][0], CellValue::text("r2"));
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_rename_is_simultaneous() {
        let table = Table::from_text_grid(&[vec!["A", "B"], vec!["1", "2"]]);
        let out = TransformationEngine.transform_at(&table, &rule(r#"{"rename": {"A": "B", "B": "C"}}"#), now());
        assert_eq!(out.columns, vec!["B", "C"]);
        assert_eq!(out.rows[0], vec![CellValue::text("1"), CellValue::text("2")]);
    }

    #[test]
    fn test_add_literal_and_now_then_remove() {
        let table = Table::from_text_grid(&[vec!["a", "tmp"], vec!["1", "x"], vec!["2", "y"]]);
        let out = TransformationEngine.transform_at(
            &table,
            &rule(r#"{"add": {"source": "FTP", "stamp": "now"}, "remove": ["tmp", "absent"]}"#),
            now(),
        );
        assert_eq!(out.columns, vec!["a", "source", "stamp"]);
        assert_eq!(out.rows[1][1], CellValue::text("FTP"));
        assert_eq!(out.rows[1][2].render(), "2025-03-10 09:30:00");
    }

    #[test]
    fn test_add_existing_column_overwrites_in_place() {
        let table = Table::from_text_grid(&[vec!["a", "b"], vec!["1", "2"]]);
        let out = TransformationEngine.transform_at(&table, &rule(r#"{"add": {"a": "X"}}"#), now());
        assert_eq!(out.columns, vec!["a", "b"]);
        assert_eq!(out.rows[0][0], CellValue::text("X"));
    }

    #[test]
    fn test_format_added_column_and_unknown_tag() {
        let table = Table::from_text_grid(&[vec!["q"], vec!["3,0"]]);
        let out = TransformationEngine.transform_at(
            &table,
            &rule(r#"{"add": {"n": "7.9"}, "format": {"n": "integer", "q": "shiny", "missing": "float"}}"#),
            now(),
        );
        assert_eq!(out.rows[0], vec![CellValue::text("3,0"), CellValue::Integer(7)]);
    }

    #[test]
    fn test_row_count_preserved_with_unparsable_values() {
        let table = Table::from_text_grid(&[vec!["q"], vec!["1"], vec!["abc"], vec![""], vec!["4"]]);
        let out = TransformationEngine.transform_at(&table, &rule(r#"{"format": {"q": "integer"}}"#), now());
        assert_eq!(out.row_count(), table.row_count());
        assert_eq!(out.rows[1][0], CellValue::text("abc"));
        assert_eq!(out.rows[2][0], CellValue::Empty);
    }

    #[test]
    fn test_reapplying_rename_remove_format_is_stable() {
        let table = Table::from_text_grid(&[vec!["Ref", "Qté", "junk"], vec!["abc", "10,5", "x"]]);
        let r = rule(r#"{"rename": {"Ref": "ref", "Qté": "qty"}, "remove": ["junk"], "format": {"ref": "uppercase", "qty": "float"}}"#);
        let once = TransformationEngine.transform_at(&table, &r, now());
        let twice = TransformationEngine.transform_at(&once, &r, now());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_check_required_columns() {
        let table = Table::from_text_grid(&[vec!["Ref"], vec!["a"]]);
        let r = rule(r#"{"required_columns": ["Ref", "Qté"]}"#);
        match TransformationEngine.check_required_columns(&table, &r) {
            Err(TransformError::MissingRequiredColumns(cols)) => assert_eq!(cols, vec!["Qté".to_string()]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rename_onto_untouched_column_drops_original() {
        let table = Table::from_text_grid(&[vec!["Ref", "product_ref", "Qté"], vec!["r1", "old", "2"]]);
        let out = TransformationEngine.transform_at(&table, &rule(r#"{"rename": {"Ref": "product_ref"}}"#), now());
        assert_eq!(out.columns, vec!["product_ref", "Qté"]);
        assert_eq!(out.rows[0], vec![CellValue::text("r1"), CellValue::text("2")]);
    }

    fn sample_table(columns: &[&str], rows: usize) -> Table {
        let rows = (0..rows)
            .map(|i| {
                columns
                    .iter()
                    .map(|c| if i % 2 == 1 { CellValue::Empty } else { CellValue::text(format!("{}-{}", c, i)) })
                    .collect()
            })
            .collect();
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn test_rename_and_row_count_properties_over_cases() {
        let cases: Vec<(Vec<&str>, &str)> = vec![
            (vec!["Ref", "Qté", "Prix"], r#"{"Ref": "ref", "Qté": "qty"}"#),
            (vec!["a", "b", "c", "d"], r#"{"a": "b", "b": "a"}"#),
            (vec!["Ref", "product_ref", "x"], r#"{"Ref": "product_ref"}"#),
            (vec!["A", "B"], r#"{"A": "B", "B": "C"}"#),
            (vec!["col1", "col2"], r#"{"missing": "z", "col2": "Z"}"#),
            (vec!["seul"], r#"{}"#),
        ];
        let other_stages = [
            r#""#,
            r#", "add": {"source": "FTP", "jour": "today"}"#,
            r#", "remove": ["Prix", "c", "x", "absent"]"#,
            r#", "add": {"Ref": "X"}, "remove": ["qty"], "format": {"ref": "uppercase", "b": "integer", "Z": "date"}"#,
        ];

        for (columns, rename) in &cases {
            for rows in [0, 1, 4] {
                let table = sample_table(columns, rows);

                // 仅重命名: 列集合 = (原列 \ 命中的旧列) ∪ 对应新列
                let renaming = rule(&format!(r#"{{"rename": {}}}"#, rename));
                let out = TransformationEngine.transform_at(&table, &renaming, now());
                let hit: Vec<(&str, &String)> = renaming
                    .rename
                    .iter()
                    .filter(|(old, _)| table.has_column(old))
                    .collect();
                let mut expected: BTreeSet<String> = table
                    .columns
                    .iter()
                    .filter(|c| !hit.iter().any(|(old, _)| *old == c.as_str()))
                    .cloned()
                    .collect();
                expected.extend(hit.iter().map(|(_, new)| (*new).clone()));
                let actual: BTreeSet<String> = out.columns.iter().cloned().collect();
                assert_eq!(actual, expected, "columns {:?} rename {}", columns, rename);
                assert_eq!(actual.len(), out.columns.len(), "duplicate columns for {}", rename);

                // 任意规则组合: 行数不变，每行宽度等于列数
                for stages in &other_stages {
                    let full = rule(&format!(r#"{{"rename": {}{}}}"#, rename, stages));
                    let out = TransformationEngine.transform_at(&table, &full, now());
                    assert_eq!(out.row_count(), table.row_count(), "rule {} on {:?}", stages, columns);
                    assert!(out.rows.iter().all(|r| r.len() == out.columns.len()));
                }
            }
        }
    }
}
