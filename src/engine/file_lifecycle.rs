// ==========================================
// 供应商订单文件系统 - 文件状态机服务
// ==========================================
// 状态机: pending → processing → {completed | error}
//         completed → merged (由合并引擎执行)
//         processing → pending (持有者解锁 / 租约过期回收)
// 红线: 加锁是唯一的串行化点，必须走条件更新（不允许先读后写）
// 红线: 转换错误落到文件记录（error 状态）,不吞掉
// ==========================================

use crate::config::rule_book::RuleBook;
use crate::domain::file_record::{FileRecord, NewFileRecord};
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::supplier::Supplier;
use crate::domain::types::{EventAction, FileKind, FileStatus, SourceKind};
use crate::engine::error::{FileFlowError, FileFlowResult, TransformError};
use crate::engine::transformer::TransformationEngine;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::file_writer::{output_filename, write_csv};
use crate::repository::error::RepositoryError;
use crate::repository::file_record_repo::{FileRecordRepository, LeaseAttempt, ReleaseAttempt, StaleLease};
use crate::repository::processing_event_repo::ProcessingEventRepository;
use crate::repository::supplier_repo::SupplierRepository;
use crate::storage::{artifact_key, Namespace, ObjectStore};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ==========================================
// 操作结果类型
// ==========================================

/// 加锁结果（冲突以 FileFlowError::LockConflict 返回）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LockOutcome {
    Acquired { reclaimed_from: Option<String> },
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    AlreadyUnlocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutcome {
    pub file_id: String,
    pub transformed_path: String,
    pub row_count: i64,
    pub columns: Vec<String>,
}

/// 新文件登记参数
#[derive(Debug, Clone)]
pub struct RegisterRequest<'a> {
    pub supplier: &'a Supplier,
    pub filename: &'a str,
    pub payload: &'a [u8],
    pub received_date: NaiveDate,
    pub actor: &'a str,
    pub source: SourceKind,
    pub dedupe_by_content_hash: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    Created(FileRecord),
    /// 身份键已存在，未登记
    Duplicate { existing_file_id: Option<String> },
}

/// SHA-256 十六进制摘要
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ==========================================
// FileLifecycleService - 文件状态机服务
// ==========================================
pub struct FileLifecycleService {
    files: Arc<FileRecordRepository>,
    events: Arc<ProcessingEventRepository>,
    suppliers: Arc<SupplierRepository>,
    store: Arc<dyn ObjectStore>,
    engine: TransformationEngine,
    parser: UniversalFileParser,
    lease_timeout: Duration,
}

impl FileLifecycleService {
    pub fn new(
        files: Arc<FileRecordRepository>,
        events: Arc<ProcessingEventRepository>,
        suppliers: Arc<SupplierRepository>,
        store: Arc<dyn ObjectStore>,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            files,
            events,
            suppliers,
            store,
            engine: TransformationEngine::new(),
            parser: UniversalFileParser,
            lease_timeout,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn load(&self, file_id: &str) -> FileFlowResult<FileRecord> {
        self.files
            .find_by_id(file_id)?
            .ok_or_else(|| FileFlowError::NotFound(file_id.to_string()))
    }

    // ==========================================
    // 登记: 新文件 → pending
    // ==========================================

    /// 登记新文件: 去重 → 保存原始文件 → 创建 pending 记录 + uploaded 事件
    pub fn register_file(&self, req: &RegisterRequest<'_>) -> FileFlowResult<RegisterOutcome> {
        let file_kind = FileKind::from_filename(req.filename)
            .ok_or_else(|| FileFlowError::UnsupportedFile(req.filename.to_string()))?;
        let supplier = req.supplier;
        let hash = req.dedupe_by_content_hash.then(|| content_hash(req.payload));

        if let Some(existing) = self
            .files
            .find_by_identity(&supplier.supplier_code, req.filename, hash.as_deref())?
        {
            debug!(
                supplier_code = %supplier.supplier_code,
                filename = req.filename,
                file_id = %existing.file_id,
                "文件已登记，跳过"
            );
            return Ok(RegisterOutcome::Duplicate {
                existing_file_id: Some(existing.file_id),
            });
        }

        // 行数仅作参考，解析失败不阻止登记（转换时再报错）
        let row_count = match self.parser.parse(file_kind, req.payload) {
            Ok(table) => Some(table.row_count() as i64),
            Err(e) => {
                warn!(filename = req.filename, error = %e, "登记时无法解析文件，行数未知");
                None
            }
        };

        let key = artifact_key(&supplier.supplier_code, req.received_date, req.filename);
        let original_path = self.store.put(Namespace::Original, &key, req.payload)?;

        let now = Self::now();
        let record = NewFileRecord {
            filename: req.filename.to_string(),
            supplier_id: supplier.supplier_id.clone(),
            supplier_code: supplier.supplier_code.clone(),
            received_date: req.received_date,
            file_kind,
            original_path,
            row_count,
            file_size: req.payload.len() as i64,
            content_hash: hash,
        }
        .into_pending(now);
        let event = ProcessingEvent::new(
            &record.file_id,
            req.actor,
            EventAction::Uploaded,
            json!({
                "source": req.source.as_str(),
                "size": record.file_size,
                "original_path": record.original_path,
            }),
            now,
        );

        match self.files.insert_with_event(&record, &event) {
            Ok(()) => {
                info!(
                    file_id = %record.file_id,
                    supplier_code = %record.supplier_code,
                    filename = %record.filename,
                    source = %req.source,
                    "新文件已登记"
                );
                Ok(RegisterOutcome::Created(record))
            }
            Err(RepositoryError::UniqueConstraintViolation(_)) => {
                // 并发登记: 另一方已先写入
                let _ = self.store.delete(&record.original_path);
                let existing = self
                    .files
                    .find_by_identity(&supplier.supplier_code, req.filename, record.content_hash.as_deref())?
                    .map(|r| r.file_id);
                Ok(RegisterOutcome::Duplicate {
                    existing_file_id: existing,
                })
            }
            Err(e) => {
                let _ = self.store.delete(&record.original_path);
                Err(e.into())
            }
        }
    }

    // ==========================================
    // 加锁 / 解锁
    // ==========================================

    pub fn acquire_lock(&self, file_id: &str, operator: &str) -> FileFlowResult<LockOutcome> {
        self.acquire_lock_at(file_id, operator, Self::now())
    }

    pub fn acquire_lock_at(&self, file_id: &str, operator: &str, now: NaiveDateTime) -> FileFlowResult<LockOutcome> {
        match self.files.try_acquire_lease(file_id, operator, now, self.lease_timeout)? {
            LeaseAttempt::Acquired { reclaimed_from } => {
                match &reclaimed_from {
                    Some(prev) => info!(file_id, operator, reclaimed_from = %prev, "回收过期租约并加锁"),
                    None => info!(file_id, operator, "文件已加锁"),
                }
                Ok(LockOutcome::Acquired { reclaimed_from })
            }
            LeaseAttempt::Refreshed => {
                debug!(file_id, operator, "租约已续期");
                Ok(LockOutcome::Refreshed)
            }
            LeaseAttempt::Held { holder, locked_at } => {
                info!(file_id, operator, holder = %holder, "加锁冲突");
                Err(FileFlowError::LockConflict { holder, locked_at })
            }
            LeaseAttempt::NotLockable(status) => Err(FileFlowError::NotLockable { status }),
            LeaseAttempt::NotFound => Err(FileFlowError::NotFound(file_id.to_string())),
        }
    }

    pub fn release_lock(&self, file_id: &str, operator: &str) -> FileFlowResult<ReleaseOutcome> {
        self.release_lock_at(file_id, operator, Self::now())
    }

    pub fn release_lock_at(&self, file_id: &str, operator: &str, now: NaiveDateTime) -> FileFlowResult<ReleaseOutcome> {
        match self.files.release_lease(file_id, operator, now)? {
            ReleaseAttempt::Released => {
                info!(file_id, operator, "文件已解锁");
                Ok(ReleaseOutcome::Released)
            }
            ReleaseAttempt::AlreadyUnlocked(_) => Ok(ReleaseOutcome::AlreadyUnlocked),
            ReleaseAttempt::HeldByOther { .. } => Err(FileFlowError::LeaseNotHeld {
                file_id: file_id.to_string(),
                operator: operator.to_string(),
            }),
            ReleaseAttempt::NotFound => Err(FileFlowError::NotFound(file_id.to_string())),
        }
    }

    // ==========================================
    // 转换: processing → completed | error
    // ==========================================

    pub fn run_transform(&self, file_id: &str, operator: &str, rules: &RuleBook) -> FileFlowResult<TransformOutcome> {
        self.run_transform_at(file_id, operator, rules, Self::now())
    }

    pub fn run_transform_at(
        &self,
        file_id: &str,
        operator: &str,
        rules: &RuleBook,
        now: NaiveDateTime,
    ) -> FileFlowResult<TransformOutcome> {
        let record = self.load(file_id)?;
        if !record.is_held_by(operator, now, self.lease_timeout) {
            return Err(FileFlowError::LeaseNotHeld {
                file_id: file_id.to_string(),
                operator: operator.to_string(),
            });
        }

        let rule_id = match self.suppliers.find_by_id(&record.supplier_id)? {
            Some(s) => s.effective_rule_id().to_string(),
            None => record.supplier_code.clone(),
        };

        match self.transform_record(&record, rules, &rule_id, now) {
            Ok((transformed_path, columns, row_count)) => {
                let detail = json!({
                    "rule_id": rule_id,
                    "transformed_path": transformed_path,
                    "row_count": row_count,
                });
                let moved = self.files.complete_with_event(
                    file_id,
                    operator,
                    &transformed_path,
                    row_count,
                    now,
                    detail,
                )?;
                if !moved {
                    let _ = self.store.delete(&transformed_path);
                    warn!(file_id, operator, "转换完成时租约已失效，结果已丢弃");
                    return Err(FileFlowError::LeaseNotHeld {
                        file_id: file_id.to_string(),
                        operator: operator.to_string(),
                    });
                }
                info!(file_id, operator, row_count, "文件转换完成");
                Ok(TransformOutcome {
                    file_id: file_id.to_string(),
                    transformed_path,
                    row_count,
                    columns,
                })
            }
            Err(e) => {
                let message = e.to_string();
                warn!(file_id, operator, error = %message, "文件转换失败");
                self.files.fail_with_event(file_id, operator, &message, now)?;
                Err(FileFlowError::Transform(e))
            }
        }
    }

    fn transform_record(
        &self,
        record: &FileRecord,
        rules: &RuleBook,
        rule_id: &str,
        now: NaiveDateTime,
    ) -> Result<(String, Vec<String>, i64), TransformError> {
        let rule = rules
            .get(rule_id)
            .ok_or_else(|| TransformError::RuleNotFound(rule_id.to_string()))?;

        let bytes = self
            .store
            .get(&record.original_path)
            .map_err(|e| TransformError::OriginalUnavailable(e.to_string()))?;
        let table = self.parser.parse(record.file_kind, &bytes)?;

        self.engine.check_required_columns(&table, rule)?;
        // today / now 列取本地时间，now 为 UTC
        let local_now = Local.from_utc_datetime(&now).naive_local();
        let output = self.engine.transform_at(&table, rule, local_now);

        let out_bytes = write_csv(&output).map_err(|e| TransformError::OutputWriteFailed(e.to_string()))?;
        let key = artifact_key(
            &record.supplier_code,
            record.received_date,
            &output_filename(&record.filename, "_transformed"),
        );
        let path = self
            .store
            .put(Namespace::Transformed, &key, &out_bytes)
            .map_err(|e| TransformError::OutputWriteFailed(e.to_string()))?;

        let row_count = output.row_count() as i64;
        Ok((path, output.columns, row_count))
    }

    // ==========================================
    // 发送标记 / 历史
    // ==========================================

    /// 记录已发送（不改变状态，仅 completed / merged 文件）
    pub fn mark_sent(&self, file_id: &str, operator: &str, detail: serde_json::Value) -> FileFlowResult<ProcessingEvent> {
        let record = self.load(file_id)?;
        if !matches!(record.status, FileStatus::Completed | FileStatus::Merged) {
            return Err(FileFlowError::InvalidStatus {
                status: record.status,
                action: EventAction::Sent.to_string(),
            });
        }
        let event = ProcessingEvent::new(file_id, operator, EventAction::Sent, detail, Self::now());
        self.events.insert(&event)?;
        info!(file_id, operator, "文件已标记为发送");
        Ok(event)
    }

    pub fn file_history(&self, file_id: &str) -> FileFlowResult<Vec<ProcessingEvent>> {
        self.load(file_id)?;
        Ok(self.events.list_by_file(file_id)?)
    }

    // ==========================================
    // 过期租约回收
    // ==========================================

    pub fn sweep_stale(&self) -> FileFlowResult<Vec<StaleLease>> {
        self.sweep_stale_at(Self::now())
    }

    pub fn sweep_stale_at(&self, now: NaiveDateTime) -> FileFlowResult<Vec<StaleLease>> {
        let reclaimed = self.files.reset_stale_leases(now, self.lease_timeout)?;
        for lease in &reclaimed {
            info!(
                file_id = %lease.file_id,
                holder = %lease.holder,
                locked_at = %lease.locked_at,
                "过期租约已回收"
            );
        }
        Ok(reclaimed)
    }
}
