// ==========================================
// 供应商订单文件系统 - 采集层
// ==========================================
// 职责: 从邮箱 / 远程目录发现供应商订单文件, 去重后登记为 pending
// ==========================================

pub mod error;
pub mod fetcher;
pub mod mailbox_fetcher;
pub mod orchestrator;
pub mod pattern;
pub mod remote_dir_fetcher;

pub use error::{FetchError, FetchResult};
pub use fetcher::{Candidate, SourceFetcher};
pub use mailbox_fetcher::{MailboxFetcher, MaildirStore, MessageStore, RawMessage};
pub use orchestrator::{CollectionSummary, CollectorOrchestrator, SupplierCollection, COLLECTOR_ACTOR};
pub use pattern::PatternSet;
pub use remote_dir_fetcher::{
    DirectoryClient, FtpDirectoryClient, FtpSettings, MountedDirectoryClient, RemoteDirectoryFetcher, RemoteEntry,
};
