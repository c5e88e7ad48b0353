use super::core::{map_file_record, FileRecordRepository, FILE_COLUMNS};
use crate::domain::file_record::{FileQuery, FileRecord};
use crate::domain::types::FileStatus;
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::fmt_date;
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

/// 各状态文件数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: FileStatus,
    pub count: i64,
}

impl FileRecordRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, file_id: &str) -> RepositoryResult<Option<FileRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM file_record WHERE file_id = ?1", FILE_COLUMNS);
        Ok(conn.query_row(&sql, params![file_id], map_file_record).optional()?)
    }

    /// 按身份键查找
    ///
    /// - content_hash = None: 匹配同供应商同名的任意记录
    /// - content_hash = Some(h): 仅匹配内容哈希相同的记录
    pub fn find_by_identity(
        &self,
        supplier_code: &str,
        filename: &str,
        content_hash: Option<&str>,
    ) -> RepositoryResult<Option<FileRecord>> {
        let conn = self.get_conn()?;
        let record = match content_hash {
            Some(hash) => {
                let sql = format!(
                    "SELECT {} FROM file_record \
                     WHERE supplier_code = ?1 AND filename = ?2 AND content_hash = ?3 LIMIT 1",
                    FILE_COLUMNS
                );
                conn.query_row(&sql, params![supplier_code, filename, hash], map_file_record)
                    .optional()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM file_record WHERE supplier_code = ?1 AND filename = ?2 LIMIT 1",
                    FILE_COLUMNS
                );
                conn.query_row(&sql, params![supplier_code, filename], map_file_record)
                    .optional()?
            }
        };
        Ok(record)
    }

    /// 按过滤条件列出文件（收件日期倒序）
    pub fn list(&self, query: &FileQuery) -> RepositoryResult<Vec<FileRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = query.status {
            clauses.push("status = ?");
            args.push(Box::new(status.as_str()));
        }
        if let Some(id) = &query.supplier_id {
            clauses.push("supplier_id = ?");
            args.push(Box::new(id.clone()));
        }
        if let Some(code) = &query.supplier_code {
            clauses.push("supplier_code = ?");
            args.push(Box::new(code.clone()));
        }
        if let Some(from) = &query.received_from {
            clauses.push("received_date >= ?");
            args.push(Box::new(fmt_date(from)));
        }
        if let Some(to) = &query.received_to {
            clauses.push("received_date <= ?");
            args.push(Box::new(fmt_date(to)));
        }
        if let Some(part) = &query.filename_contains {
            clauses.push("filename LIKE ? ESCAPE '\\'");
            args.push(Box::new(format!("%{}%", escape_like(part))));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit_sql = match query.limit {
            Some(n) if n > 0 => format!("LIMIT {}", n),
            _ => String::new(),
        };
        let sql = format!(
            "SELECT {} FROM file_record {} ORDER BY received_date DESC, created_at DESC, file_id {}",
            FILE_COLUMNS, where_sql, limit_sql
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(args.iter().map(|a| a.as_ref())), map_file_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// 各状态文件数（全部状态都返回，无记录为 0）
    pub fn status_summary(&self, supplier_id: Option<&str>) -> RepositoryResult<Vec<StatusCount>> {
        let conn = self.get_conn()?;
        let mut counts: HashMap<String, i64> = HashMap::new();

        {
            let (sql, args): (&str, Vec<&dyn ToSql>) = match &supplier_id {
                Some(id) => (
                    "SELECT status, COUNT(*) FROM file_record WHERE supplier_id = ?1 GROUP BY status",
                    vec![id as &dyn ToSql],
                ),
                None => ("SELECT status, COUNT(*) FROM file_record GROUP BY status", vec![]),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, n) = row?;
                counts.insert(status, n);
            }
        }

        Ok(FileStatus::all()
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: counts.get(status.as_str()).copied().unwrap_or(0),
            })
            .collect())
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
