// ==========================================
// 供应商订单文件系统 - 订单文件 API
// ==========================================
// 职责: 前端（GUI / CLI）调用的全部操作入口
// - 文件查询、加锁/解锁、转换、合并
// - 人工导入、发送标记、处理历史、状态统计
// 红线: 操作员身份必须显式传入,不允许匿名操作
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::config::rule_book::RuleBook;
use crate::domain::file_record::{FileQuery, FileRecord};
use crate::domain::merge_record::MergeRecord;
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::supplier::Supplier;
use crate::domain::types::SourceKind;
use crate::engine::file_lifecycle::{
    FileLifecycleService, LockOutcome, RegisterOutcome, RegisterRequest, ReleaseOutcome, TransformOutcome,
};
use crate::engine::merge::MergeEngine;
use crate::repository::file_record_repo::{FileRecordRepository, StatusCount};
use crate::repository::supplier_repo::SupplierRepository;

/// 单次查询最多返回的文件数
const MAX_LIST_LIMIT: i64 = 1000;

// ==========================================
// OrderFileApi
// ==========================================
pub struct OrderFileApi {
    files: Arc<FileRecordRepository>,
    suppliers: Arc<SupplierRepository>,
    lifecycle: Arc<FileLifecycleService>,
    merge_engine: Arc<MergeEngine>,
    rules: Arc<RuleBook>,
    dedupe_by_content_hash: bool,
}

impl OrderFileApi {
    pub fn new(
        files: Arc<FileRecordRepository>,
        suppliers: Arc<SupplierRepository>,
        lifecycle: Arc<FileLifecycleService>,
        merge_engine: Arc<MergeEngine>,
        rules: Arc<RuleBook>,
        dedupe_by_content_hash: bool,
    ) -> Self {
        Self {
            files,
            suppliers,
            lifecycle,
            merge_engine,
            rules,
            dedupe_by_content_hash,
        }
    }

    fn require_operator(operator: &str) -> ApiResult<&str> {
        let trimmed = operator.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(trimmed)
    }

    fn require_supplier(&self, supplier_id: &str) -> ApiResult<Supplier> {
        self.suppliers
            .find_by_id(supplier_id)?
            .ok_or_else(|| ApiError::NotFound(format!("供应商(id={})不存在", supplier_id)))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按条件列出文件（收件日期倒序）
    pub fn list_files(&self, query: &FileQuery) -> ApiResult<Vec<FileRecord>> {
        if let (Some(from), Some(to)) = (query.received_from, query.received_to) {
            if from > to {
                return Err(ApiError::InvalidInput(format!("日期范围无效: {} > {}", from, to)));
            }
        }
        let mut query = query.clone();
        query.limit = Some(query.limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT));

        let files = self.files.list(&query)?;
        debug!(count = files.len(), "list_files");
        Ok(files)
    }

    pub fn get_file(&self, file_id: &str) -> ApiResult<FileRecord> {
        self.files
            .find_by_id(file_id)?
            .ok_or_else(|| ApiError::NotFound(format!("文件(id={})不存在", file_id)))
    }

    pub fn file_history(&self, file_id: &str) -> ApiResult<Vec<ProcessingEvent>> {
        Ok(self.lifecycle.file_history(file_id)?)
    }

    /// 各状态文件数（可按供应商过滤）
    pub fn status_summary(&self, supplier_id: Option<&str>) -> ApiResult<Vec<StatusCount>> {
        Ok(self.files.status_summary(supplier_id)?)
    }

    pub fn list_suppliers(&self, active_only: bool) -> ApiResult<Vec<Supplier>> {
        Ok(self.suppliers.list(active_only)?)
    }

    // ==========================================
    // 协同锁定
    // ==========================================

    /// 加锁; 已被他人有效持有时返回 ApiError::LockConflict
    pub fn acquire_lock(&self, file_id: &str, operator: &str) -> ApiResult<LockOutcome> {
        let operator = Self::require_operator(operator)?;
        Ok(self.lifecycle.acquire_lock(file_id, operator)?)
    }

    /// 解锁; 对未加锁文件是无操作
    pub fn release_lock(&self, file_id: &str, operator: &str) -> ApiResult<ReleaseOutcome> {
        let operator = Self::require_operator(operator)?;
        Ok(self.lifecycle.release_lock(file_id, operator)?)
    }

    // ==========================================
    // 转换 / 合并
    // ==========================================

    /// 转换（调用方必须持有租约）
    pub fn run_transform(&self, file_id: &str, operator: &str) -> ApiResult<TransformOutcome> {
        let operator = Self::require_operator(operator)?;
        Ok(self.lifecycle.run_transform(file_id, operator, &self.rules)?)
    }

    pub fn merge_files(&self, supplier_id: &str, file_ids: &[String], operator: &str) -> ApiResult<MergeRecord> {
        let operator = Self::require_operator(operator)?;
        self.require_supplier(supplier_id)?;
        Ok(self.merge_engine.merge_files(supplier_id, file_ids, operator)?)
    }

    // ==========================================
    // 人工导入 / 发送标记
    // ==========================================

    /// 人工导入文件; 与自动采集相同的去重规则
    pub fn register_manual_file(
        &self,
        supplier_id: &str,
        filename: &str,
        payload: &[u8],
        operator: &str,
        received_date: Option<NaiveDate>,
    ) -> ApiResult<RegisterOutcome> {
        let operator = Self::require_operator(operator)?;
        let filename = filename.trim();
        if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
            return Err(ApiError::InvalidInput(format!("文件名无效: {:?}", filename)));
        }
        let supplier = self.require_supplier(supplier_id)?;
        if !supplier.active {
            return Err(ApiError::BusinessRuleViolation(format!(
                "供应商 {} 已停用",
                supplier.supplier_code
            )));
        }

        let request = RegisterRequest {
            supplier: &supplier,
            filename,
            payload,
            received_date: received_date.unwrap_or_else(|| Utc::now().date_naive()),
            actor: operator,
            source: SourceKind::Manual,
            dedupe_by_content_hash: self.dedupe_by_content_hash,
        };
        let outcome = self.lifecycle.register_file(&request)?;
        if let RegisterOutcome::Created(record) = &outcome {
            info!(file_id = %record.file_id, operator, filename, "人工导入文件");
        }
        Ok(outcome)
    }

    pub fn mark_sent(&self, file_id: &str, operator: &str, detail: serde_json::Value) -> ApiResult<ProcessingEvent> {
        let operator = Self::require_operator(operator)?;
        Ok(self.lifecycle.mark_sent(file_id, operator, detail)?)
    }
}
