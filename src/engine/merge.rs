// ==========================================
// 供应商订单文件系统 - 合并引擎
// ==========================================
// 输入: 同一供应商的若干 completed 文件
// 输出: 一个合并表（按收件日期升序，文件内保持原行序）+ MergeRecord
// 红线: 原子性 - 任一前置条件不满足则整体中止，不提交任何状态变化
// ==========================================

use crate::domain::file_record::FileRecord;
use crate::domain::merge_record::MergeRecord;
use crate::domain::table::{CellValue, Table};
use crate::domain::types::FileStatus;
use crate::engine::error::{MergeError, MergeResult};
use crate::importer::file_writer::{read_csv, write_csv};
use crate::repository::file_record_repo::FileRecordRepository;
use crate::repository::merge_record_repo::{MergeCommit, MergeRecordRepository};
use crate::storage::{artifact_key, Namespace, ObjectStore, StorageError};
use chrono::{NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// 合并结果中标记来源文件的列名
pub const SOURCE_FILE_COLUMN: &str = "_source_file";

pub struct MergeEngine {
    files: Arc<FileRecordRepository>,
    merges: Arc<MergeRecordRepository>,
    store: Arc<dyn ObjectStore>,
    tag_source_file: bool,
}

impl MergeEngine {
    pub fn new(
        files: Arc<FileRecordRepository>,
        merges: Arc<MergeRecordRepository>,
        store: Arc<dyn ObjectStore>,
        tag_source_file: bool,
    ) -> Self {
        Self {
            files,
            merges,
            store,
            tag_source_file,
        }
    }

    pub fn merge_files(&self, supplier_id: &str, file_ids: &[String], operator: &str) -> MergeResult<MergeRecord> {
        self.merge_files_at(supplier_id, file_ids, operator, Utc::now().naive_utc())
    }

    pub fn merge_files_at(
        &self,
        supplier_id: &str,
        file_ids: &[String],
        operator: &str,
        now: NaiveDateTime,
    ) -> MergeResult<MergeRecord> {
        // ===== 1. 前置条件 =====
        let mut seen = HashSet::new();
        let ids: Vec<&String> = file_ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        if ids.is_empty() {
            return Err(MergeError::EmptySelection);
        }

        let mut records: Vec<FileRecord> = Vec::with_capacity(ids.len());
        for id in ids {
            let record = self
                .files
                .find_by_id(id)?
                .ok_or_else(|| MergeError::FileNotFound(id.clone()))?;
            if record.supplier_id != supplier_id {
                return Err(MergeError::SupplierMismatch {
                    file_id: id.clone(),
                    expected: supplier_id.to_string(),
                    actual: record.supplier_id,
                });
            }
            if record.status != FileStatus::Completed {
                return Err(MergeError::NotCompleted {
                    file_id: id.clone(),
                    status: record.status,
                });
            }
            if record.transformed_path.is_none() {
                return Err(MergeError::MissingArtifact(id.clone()));
            }
            records.push(record);
        }

        // 收件日期升序（稳定排序，同日按选择顺序）
        records.sort_by_key(|r| r.received_date);

        // ===== 2. 读取转换结果 =====
        let mut tables: Vec<(&FileRecord, Table)> = Vec::with_capacity(records.len());
        for record in &records {
            tables.push((record, self.read_artifact(record)?));
        }

        // ===== 3. 拼接 =====
        let merged = concat_tables(&tables, self.tag_source_file);
        let row_count = merged.row_count() as i64;

        // ===== 4. 写出 =====
        let date_from = records.first().map(|r| r.received_date).unwrap_or_else(|| now.date());
        let date_to = records.last().map(|r| r.received_date).unwrap_or_else(|| now.date());
        let supplier_code = &records[0].supplier_code;
        let filename = format!(
            "{}_merged_{}_{}.csv",
            supplier_code,
            date_from.format("%Y%m%d"),
            date_to.format("%Y%m%d")
        );
        let bytes = write_csv(&merged).map_err(|e| MergeError::OutputWriteFailed(e.to_string()))?;
        let output_path = self
            .store
            .put(Namespace::Merged, &artifact_key(supplier_code, date_to, &filename), &bytes)?;

        // ===== 5. 原子提交 =====
        let record = MergeRecord {
            merge_id: uuid::Uuid::new_v4().to_string(),
            supplier_id: supplier_id.to_string(),
            output_path: output_path.clone(),
            file_ids: records.iter().map(|r| r.file_id.clone()).collect(),
            date_from,
            date_to,
            row_count,
            created_by: operator.to_string(),
            created_at: now,
        };

        match self.merges.commit_merge(&record) {
            Ok(MergeCommit::Committed) => {
                info!(
                    merge_id = %record.merge_id,
                    supplier_id,
                    files = record.file_ids.len(),
                    row_count,
                    output_path = %record.output_path,
                    "合并完成"
                );
                Ok(record)
            }
            Ok(MergeCommit::Conflict { file_id }) => {
                let _ = self.store.delete(&output_path);
                warn!(supplier_id, file_id = %file_id, "合并期间文件状态已变化，合并中止");
                Err(MergeError::ConcurrentModification(file_id))
            }
            Err(e) => {
                let _ = self.store.delete(&output_path);
                warn!(supplier_id, error = %e, "合并提交失败，合并中止");
                Err(e.into())
            }
        }
    }

    fn read_artifact(&self, record: &FileRecord) -> MergeResult<Table> {
        let path = record
            .transformed_path
            .as_deref()
            .ok_or_else(|| MergeError::MissingArtifact(record.file_id.clone()))?;
        let bytes = match self.store.get(path) {
            Ok(b) => b,
            Err(StorageError::NotFound(_)) => return Err(MergeError::MissingArtifact(record.file_id.clone())),
            Err(e) => {
                return Err(MergeError::UnreadableArtifact {
                    file_id: record.file_id.clone(),
                    message: e.to_string(),
                })
            }
        };
        read_csv(&bytes).map_err(|e| MergeError::UnreadableArtifact {
            file_id: record.file_id.clone(),
            message: e.to_string(),
        })
    }
}

/// 按行拼接; 列取并集（首次出现顺序），缺失单元格为空
fn concat_tables(tables: &[(&FileRecord, Table)], tag_source_file: bool) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (_, table) in tables {
        for col in &table.columns {
            if !index.contains_key(col) {
                index.insert(col.clone(), columns.len());
                columns.push(col.clone());
            }
        }
    }
    let width = columns.len();
    if tag_source_file {
        columns.push(SOURCE_FILE_COLUMN.to_string());
    }

    let mut rows = Vec::new();
    for (record, table) in tables {
        let positions: Vec<usize> = table.columns.iter().map(|c| index[c]).collect();
        for row in &table.rows {
            let mut out = vec![CellValue::Empty; width];
            for (cell, &pos) in row.iter().zip(&positions) {
                out[pos] = cell.clone();
            }
            if tag_source_file {
                out.push(CellValue::text(record.filename.clone()));
            }
            rows.push(out);
        }
    }

    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_tables_unions_columns() {
        use crate::domain::types::FileKind;
        use chrono::NaiveDate;

        let mk = |name: &str| FileRecord {
            file_id: name.to_string(),
            filename: format!("{}.csv", name),
            supplier_id: "s".into(),
            supplier_code: "S".into(),
            received_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            file_kind: FileKind::Csv,
            status: FileStatus::Completed,
            locked_by: None,
            locked_at: None,
            processed_by: None,
            processed_at: None,
            original_path: String::new(),
            transformed_path: Some(String::new()),
            row_count: None,
            file_size: 0,
            content_hash: None,
            error_message: None,
            created_at: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            updated_at: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        };
        let a = mk("a");
        let b = mk("b");
        let ta = Table::from_text_grid(&[vec!["ref", "qty"], vec!["x", "1"]]);
        let tb = Table::from_text_grid(&[vec!["qty", "note"], vec!["2", "urgent"], vec!["3", ""]]);

        let merged = concat_tables(&[(&a, ta), (&b, tb)], true);
        assert_eq!(merged.columns, vec!["ref", "qty", "note", SOURCE_FILE_COLUMN]);
        assert_eq!(merged.row_count(), 3);
        assert_eq!(merged.rows[1][0], CellValue::Empty);
        assert_eq!(merged.rows[1][1], CellValue::text("2"));
        assert_eq!(merged.rows[2][3], CellValue::text("b.csv"));
    }
}
