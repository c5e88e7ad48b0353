// ==========================================
// 供应商订单文件系统 - 采集编排器
// ==========================================
// 流程: 启用的供应商 → 对应采集器 → 候选文件 → 去重登记（pending + uploaded 事件）
// 红线: run() 永不失败; 单个供应商的采集错误只记录, 不影响其他供应商
// 并发: 供应商之间并发（collector_concurrency），同一供应商内顺序登记
// ==========================================

use crate::collector::fetcher::{Candidate, SourceFetcher};
use crate::collector::mailbox_fetcher::{MailboxFetcher, MaildirStore};
use crate::collector::remote_dir_fetcher::RemoteDirectoryFetcher;
use crate::config::config_manager::PipelineSettings;
use crate::config::snapshot::PipelineSnapshot;
use crate::domain::supplier::Supplier;
use crate::domain::types::SourceKind;
use crate::engine::file_lifecycle::{FileLifecycleService, RegisterOutcome, RegisterRequest};
use chrono::{NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 自动采集登记时记录的操作人
pub const COLLECTOR_ACTOR: &str = "collector";

/// 单个供应商的采集结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierCollection {
    pub supplier_code: String,
    pub source: SourceKind,
    pub created: usize,
    pub skipped: usize,
    pub errored: usize,
    /// 采集器整体失败时的错误信息
    pub error: Option<String>,
}

impl SupplierCollection {
    fn new(supplier: &Supplier) -> Self {
        Self {
            supplier_code: supplier.supplier_code.clone(),
            source: supplier.source_kind(),
            created: 0,
            skipped: 0,
            errored: 0,
            error: None,
        }
    }
}

/// 一次采集运行的汇总
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub created: usize,
    pub skipped: usize,
    pub errored: usize,
    pub suppliers: Vec<SupplierCollection>,
}

pub struct CollectorOrchestrator {
    lifecycle: Arc<FileLifecycleService>,
    fetchers: HashMap<SourceKind, Arc<dyn SourceFetcher>>,
}

impl CollectorOrchestrator {
    pub fn new(lifecycle: Arc<FileLifecycleService>) -> Self {
        Self {
            lifecycle,
            fetchers: HashMap::new(),
        }
    }

    pub fn with_fetcher(mut self, kind: SourceKind, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetchers.insert(kind, fetcher);
        self
    }

    /// 按配置装配默认采集器; 未配置 mailbox_root 时邮箱供应商会被记为错误
    pub fn with_default_fetchers(lifecycle: Arc<FileLifecycleService>, settings: &PipelineSettings) -> Self {
        let mut orchestrator =
            Self::new(lifecycle).with_fetcher(SourceKind::RemoteDirectory, Arc::new(RemoteDirectoryFetcher::new()));
        if let Some(root) = &settings.mailbox_root {
            let store = Arc::new(MaildirStore::new(root.clone()));
            orchestrator = orchestrator.with_fetcher(
                SourceKind::Mailbox,
                Arc::new(MailboxFetcher::new(store, settings.mailbox_lookback_days)),
            );
        }
        orchestrator
    }

    /// 对快照中全部启用的非人工供应商执行一次采集
    pub async fn run(&self, snapshot: &PipelineSnapshot) -> CollectionSummary {
        let started_at = Utc::now().naive_utc();
        let settings = &snapshot.settings;

        let targets: Vec<&Supplier> = snapshot
            .suppliers
            .iter()
            .filter(|s| s.active && s.source_kind() != SourceKind::Manual)
            .collect();
        info!(
            suppliers = targets.len(),
            concurrency = settings.collector_concurrency,
            "开始采集"
        );

        let mut suppliers: Vec<SupplierCollection> = stream::iter(targets)
            .map(|supplier| self.collect_supplier(supplier, settings.dedupe_by_content_hash))
            .buffer_unordered(settings.collector_concurrency.max(1))
            .collect()
            .await;
        suppliers.sort_by(|a, b| a.supplier_code.cmp(&b.supplier_code));

        let summary = CollectionSummary {
            started_at,
            finished_at: Utc::now().naive_utc(),
            created: suppliers.iter().map(|s| s.created).sum(),
            skipped: suppliers.iter().map(|s| s.skipped).sum(),
            errored: suppliers.iter().map(|s| s.errored).sum(),
            suppliers,
        };
        info!(
            created = summary.created,
            skipped = summary.skipped,
            errored = summary.errored,
            "采集完成"
        );
        summary
    }

    async fn collect_supplier(&self, supplier: &Supplier, dedupe_by_content_hash: bool) -> SupplierCollection {
        let mut outcome = SupplierCollection::new(supplier);

        let Some(fetcher) = self.fetchers.get(&supplier.source_kind()) else {
            warn!(
                supplier_code = %supplier.supplier_code,
                source = %supplier.source_kind(),
                "未配置该来源的采集器"
            );
            outcome.errored = 1;
            outcome.error = Some(format!("未配置来源采集器: {}", supplier.source_kind()));
            return outcome;
        };

        let candidates = match fetcher.list_candidates(supplier).await {
            Ok(c) => c,
            Err(e) => {
                error!(supplier_code = %supplier.supplier_code, error = %e, "供应商采集失败");
                outcome.errored = 1;
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        debug!(
            supplier_code = %supplier.supplier_code,
            candidates = candidates.len(),
            "候选文件"
        );

        let lifecycle = self.lifecycle.clone();
        let owned = supplier.clone();
        let registered = tokio::task::spawn_blocking(move || {
            register_candidates(&lifecycle, &owned, candidates, dedupe_by_content_hash)
        })
        .await;

        match registered {
            Ok((created, skipped, errored)) => {
                outcome.created = created;
                outcome.skipped = skipped;
                outcome.errored = errored;
            }
            Err(e) => {
                error!(supplier_code = %supplier.supplier_code, error = %e, "登记任务异常退出");
                outcome.errored += 1;
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }
}

/// 逐个登记候选文件，返回 (created, skipped, errored)
fn register_candidates(
    lifecycle: &FileLifecycleService,
    supplier: &Supplier,
    candidates: Vec<Candidate>,
    dedupe_by_content_hash: bool,
) -> (usize, usize, usize) {
    let (mut created, mut skipped, mut errored) = (0, 0, 0);

    for candidate in candidates {
        let request = RegisterRequest {
            supplier,
            filename: &candidate.name,
            payload: &candidate.payload,
            received_date: candidate.observed_at.date(),
            actor: COLLECTOR_ACTOR,
            source: supplier.source_kind(),
            dedupe_by_content_hash,
        };
        match lifecycle.register_file(&request) {
            Ok(RegisterOutcome::Created(_)) => created += 1,
            Ok(RegisterOutcome::Duplicate { .. }) => skipped += 1,
            Err(e) => {
                warn!(
                    supplier_code = %supplier.supplier_code,
                    filename = %candidate.name,
                    error = %e,
                    "候选文件登记失败"
                );
                errored += 1;
            }
        }
    }

    (created, skipped, errored)
}
