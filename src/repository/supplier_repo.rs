// ==========================================
// 供应商订单文件系统 - 供应商数据仓储
// ==========================================
// 红线: 不做物理删除,停用走 set_active(false)
// ==========================================

use crate::domain::supplier::{Supplier, SupplierDocument, SupplierDraft};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{fmt_ts, get_json, get_ts};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::info;

const SUPPLIER_COLUMNS: &str = "supplier_id, supplier_code, name, active, file_patterns_json, \
     source_json, rule_id, min_order_amount, notes, created_at, updated_at";

/// 批量导入结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupplierImportSummary {
    pub created: usize,
    pub updated: usize,
}

// ==========================================
// SupplierRepository - 供应商仓储
// ==========================================
pub struct SupplierRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SupplierRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建供应商，返回 supplier_id
    pub fn create(&self, draft: &SupplierDraft) -> RepositoryResult<String> {
        validate_draft(draft)?;
        let conn = self.get_conn()?;
        let now = Utc::now().naive_utc();
        let supplier_id = uuid::Uuid::new_v4().to_string();
        insert_row(&conn, &supplier_id, draft, now)?;
        Ok(supplier_id)
    }

    /// 按 supplier_id 更新全部可编辑字段
    pub fn update(&self, supplier_id: &str, draft: &SupplierDraft) -> RepositoryResult<()> {
        validate_draft(draft)?;
        let conn = self.get_conn()?;
        let rows = update_row(&conn, supplier_id, draft, Utc::now().naive_utc())?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Supplier".to_string(),
                id: supplier_id.to_string(),
            });
        }
        Ok(())
    }

    /// 启用/停用
    pub fn set_active(&self, supplier_id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE supplier SET active = ?1, updated_at = ?2 WHERE supplier_id = ?3",
            params![active, fmt_ts(&Utc::now().naive_utc()), supplier_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Supplier".to_string(),
                id: supplier_id.to_string(),
            });
        }
        info!(supplier_id, active, "供应商启用状态已更新");
        Ok(())
    }

    /// 从 JSON 文档批量导入（按 supplier_code 幂等: 已存在则更新）
    pub fn import_json(&self, raw: &str) -> RepositoryResult<SupplierImportSummary> {
        let doc: SupplierDocument = serde_json::from_str(raw)?;
        for draft in &doc.suppliers {
            validate_draft(draft)?;
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().naive_utc();
        let mut summary = SupplierImportSummary::default();

        for draft in &doc.suppliers {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT supplier_id FROM supplier WHERE supplier_code = ?1",
                    params![draft.supplier_code],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    update_row(&tx, &id, draft, now)?;
                    summary.updated += 1;
                }
                None => {
                    insert_row(&tx, &uuid::Uuid::new_v4().to_string(), draft, now)?;
                    summary.created += 1;
                }
            }
        }

        tx.commit()?;
        info!(created = summary.created, updated = summary.updated, "供应商导入完成");
        Ok(summary)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, supplier_id: &str) -> RepositoryResult<Option<Supplier>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM supplier WHERE supplier_id = ?1", SUPPLIER_COLUMNS);
        Ok(conn.query_row(&sql, params![supplier_id], map_supplier).optional()?)
    }

    pub fn find_by_code(&self, supplier_code: &str) -> RepositoryResult<Option<Supplier>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM supplier WHERE supplier_code = ?1", SUPPLIER_COLUMNS);
        Ok(conn.query_row(&sql, params![supplier_code], map_supplier).optional()?)
    }

    /// 列出供应商（按编码排序）
    pub fn list(&self, active_only: bool) -> RepositoryResult<Vec<Supplier>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM supplier {} ORDER BY supplier_code",
            SUPPLIER_COLUMNS,
            if active_only { "WHERE active = 1" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let suppliers = stmt
            .query_map([], map_supplier)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(suppliers)
    }
}

fn validate_draft(draft: &SupplierDraft) -> RepositoryResult<()> {
    if draft.supplier_code.trim().is_empty() {
        return Err(RepositoryError::FieldValueError {
            field: "supplier_code".to_string(),
            message: "不能为空".to_string(),
        });
    }
    if draft.name.trim().is_empty() {
        return Err(RepositoryError::FieldValueError {
            field: "name".to_string(),
            message: "不能为空".to_string(),
        });
    }
    Ok(())
}

fn insert_row(conn: &Connection, supplier_id: &str, draft: &SupplierDraft, now: NaiveDateTime) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO supplier (
            supplier_id, supplier_code, name, active, file_patterns_json,
            source_json, rule_id, min_order_amount, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
        params![
            supplier_id,
            draft.supplier_code.trim(),
            draft.name,
            draft.active,
            serde_json::to_string(&draft.file_patterns)?,
            serde_json::to_string(&draft.source)?,
            draft.rule_id,
            draft.min_order_amount,
            draft.notes,
            fmt_ts(&now),
        ],
    )?;
    Ok(())
}

fn update_row(conn: &Connection, supplier_id: &str, draft: &SupplierDraft, now: NaiveDateTime) -> RepositoryResult<usize> {
    let rows = conn.execute(
        r#"
        UPDATE supplier SET
            supplier_code = ?1, name = ?2, active = ?3, file_patterns_json = ?4,
            source_json = ?5, rule_id = ?6, min_order_amount = ?7, notes = ?8, updated_at = ?9
        WHERE supplier_id = ?10
        "#,
        params![
            draft.supplier_code.trim(),
            draft.name,
            draft.active,
            serde_json::to_string(&draft.file_patterns)?,
            serde_json::to_string(&draft.source)?,
            draft.rule_id,
            draft.min_order_amount,
            draft.notes,
            fmt_ts(&now),
            supplier_id,
        ],
    )?;
    Ok(rows)
}

fn map_supplier(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        supplier_id: row.get(0)?,
        supplier_code: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        file_patterns: get_json(row, 4)?,
        source: get_json(row, 5)?,
        rule_id: row.get(6)?,
        min_order_amount: row.get(7)?,
        notes: row.get(8)?,
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}
