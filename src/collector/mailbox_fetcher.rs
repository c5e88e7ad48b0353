// ==========================================
// 供应商订单文件系统 - 邮箱附件采集器
// ==========================================
// 消息存储: maildir 风格目录（new/ + cur/，每个文件一封 RFC 822 邮件）
// 过滤: 回溯窗口（Date 头，缺失时取文件修改时间）+ 发件人模式 + 附件名模式
// 工具: mailparse
// ==========================================

use crate::collector::error::{FetchError, FetchResult};
use crate::collector::fetcher::{Candidate, SourceFetcher};
use crate::collector::pattern::PatternSet;
use crate::domain::supplier::{SourceConfig, Supplier};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

// ==========================================
// MessageStore - 原始邮件来源
// ==========================================

/// 存储中的一封原始邮件
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub raw: Vec<u8>,
    /// 投递时间（存储侧元数据）
    pub stored_at: NaiveDateTime,
}

pub trait MessageStore: Send + Sync {
    fn load_messages(&self) -> FetchResult<Vec<RawMessage>>;
}

/// maildir 目录; new/ 与 cur/ 都会扫描, tmp/ 忽略
pub struct MaildirStore {
    root: PathBuf,
}

impl MaildirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_folder(&self, folder: &str, out: &mut Vec<RawMessage>) -> FetchResult<()> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Ok(());
        }
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| FetchError::MessageStore(format!("{}: {}", dir.display(), e)))?;

        for entry in entries {
            let entry = entry.map_err(|e| FetchError::MessageStore(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let raw = std::fs::read(&path)
                .map_err(|e| FetchError::MessageStore(format!("{}: {}", path.display(), e)))?;
            let stored_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|t| DateTime::<Utc>::from(t).naive_utc())
                .unwrap_or_else(|_| Utc::now().naive_utc());
            out.push(RawMessage {
                id: format!("{}/{}", folder, entry.file_name().to_string_lossy()),
                raw,
                stored_at,
            });
        }
        Ok(())
    }
}

impl MessageStore for MaildirStore {
    fn load_messages(&self) -> FetchResult<Vec<RawMessage>> {
        let mut out = Vec::new();
        for folder in ["new", "cur"] {
            self.read_folder(folder, &mut out)?;
        }
        // 目录遍历顺序不稳定
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

// ==========================================
// MailboxFetcher
// ==========================================

pub struct MailboxFetcher {
    store: Arc<dyn MessageStore>,
    default_lookback_days: u32,
}

impl MailboxFetcher {
    pub fn new(store: Arc<dyn MessageStore>, default_lookback_days: u32) -> Self {
        Self {
            store,
            default_lookback_days,
        }
    }

    /// 以给定时间为基准收集附件（同步）
    pub fn collect_at(&self, supplier: &Supplier, now: NaiveDateTime) -> FetchResult<Vec<Candidate>> {
        collect_attachments(self.store.as_ref(), supplier, self.default_lookback_days, now)
    }
}

#[async_trait]
impl SourceFetcher for MailboxFetcher {
    async fn list_candidates(&self, supplier: &Supplier) -> FetchResult<Vec<Candidate>> {
        let store = self.store.clone();
        let supplier = supplier.clone();
        let lookback = self.default_lookback_days;
        tokio::task::spawn_blocking(move || {
            collect_attachments(store.as_ref(), &supplier, lookback, Utc::now().naive_utc())
        })
        .await?
    }
}

fn collect_attachments(
    store: &dyn MessageStore,
    supplier: &Supplier,
    default_lookback_days: u32,
    now: NaiveDateTime,
) -> FetchResult<Vec<Candidate>> {
    let (sender_pattern, lookback_days) = match &supplier.source {
        SourceConfig::Mailbox {
            sender_pattern,
            lookback_days,
        } => (sender_pattern.as_deref(), lookback_days.unwrap_or(default_lookback_days)),
        other => {
            return Err(FetchError::SourceMismatch {
                supplier_code: supplier.supplier_code.clone(),
                source_kind: other.kind().to_string(),
            })
        }
    };

    let filename_patterns = PatternSet::compile(&supplier.file_patterns)?;
    let sender_filter = sender_pattern.map(PatternSet::single).transpose()?;
    let cutoff = now - Duration::days(i64::from(lookback_days));

    let mut candidates = Vec::new();
    for message in store.load_messages()? {
        let parsed = match mailparse::parse_mail(&message.raw) {
            Ok(p) => p,
            Err(e) => {
                // 单封坏邮件不影响其余邮件
                warn!(
                    supplier_code = %supplier.supplier_code,
                    message_id = %message.id,
                    error = %e,
                    "邮件解析失败，已跳过"
                );
                continue;
            }
        };

        let received_at = header_date(&parsed).unwrap_or(message.stored_at);
        if received_at < cutoff {
            continue;
        }

        if let Some(filter) = &sender_filter {
            let senders = sender_addresses(&parsed);
            if !senders.iter().any(|s| filter.matches(s)) {
                debug!(message_id = %message.id, senders = ?senders, "发件人不匹配");
                continue;
            }
        }

        let mut attachments = Vec::new();
        visit_parts(&parsed, &mut attachments);
        for part in attachments {
            let Some(name) = attachment_name(part) else {
                continue;
            };
            if !filename_patterns.matches(&name) {
                continue;
            }
            let payload = part.get_body_raw().map_err(|e| FetchError::MessageParse {
                message_id: message.id.clone(),
                message: e.to_string(),
            })?;
            candidates.push(Candidate::new(name, payload, received_at));
        }
    }

    debug!(
        supplier_code = %supplier.supplier_code,
        candidates = candidates.len(),
        cutoff = %cutoff,
        "邮箱扫描完成"
    );
    Ok(candidates)
}

fn header_date(mail: &ParsedMail<'_>) -> Option<NaiveDateTime> {
    let value = mail.headers.get_first_value("Date")?;
    let ts = mailparse::dateparse(&value).ok()?;
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

fn sender_addresses(mail: &ParsedMail<'_>) -> Vec<String> {
    let Some(from) = mail.headers.get_first_value("From") else {
        return Vec::new();
    };
    match mailparse::addrparse(&from) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![info.addr.clone()],
                MailAddr::Group(group) => group.addrs.iter().map(|i| i.addr.clone()).collect(),
            })
            .collect(),
        Err(_) => vec![from.trim().to_string()],
    }
}

/// 深度优先收集叶子部件
fn visit_parts<'a>(part: &'a ParsedMail<'a>, out: &mut Vec<&'a ParsedMail<'a>>) {
    if part.subparts.is_empty() {
        out.push(part);
    } else {
        for sub in &part.subparts {
            visit_parts(sub, out);
        }
    }
}

/// 附件名: Content-Disposition 的 filename, 其次 Content-Type 的 name
fn attachment_name(part: &ParsedMail<'_>) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
