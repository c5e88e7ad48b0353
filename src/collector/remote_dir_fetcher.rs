// ==========================================
// 供应商订单文件系统 - 远程目录采集器
// ==========================================
// 端点: FTP（suppaftp, 阻塞 API 放入 spawn_blocking）或本机挂载目录（walkdir）
// 规则: exclude_dirs 中的目录名不下钻; recursive=false 时只看顶层
// FTP 操作失败重试 MAX_RETRIES 次, 线性退避
// ==========================================

use crate::collector::error::{FetchError, FetchResult};
use crate::collector::fetcher::{Candidate, SourceFetcher};
use crate::collector::pattern::PatternSet;
use crate::domain::supplier::{RemoteEndpoint, SourceConfig, Supplier};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// FTP 操作最大尝试次数
pub const MAX_RETRIES: u32 = 3;

/// 重试基础间隔（秒），第 n 次失败后等待 n 倍
pub const RETRY_DELAY_SECS: u64 = 5;

// ==========================================
// RemoteEntry - 目录项
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub modified: Option<NaiveDateTime>,
}

impl RemoteEntry {
    /// 解析 Unix 风格 LIST 行:
    /// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 commande 0115.csv`
    pub fn parse_list_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return None;
        }

        let is_directory = parts[0].starts_with('d');
        // 文件名可能包含空格
        let name = if parts.len() >= 9 {
            parts[8..].join(" ")
        } else {
            parts.last()?.to_string()
        };
        if name == "." || name == ".." {
            return None;
        }

        let size = if parts.len() >= 5 { parts[4].parse().ok() } else { None };

        Some(Self {
            name,
            is_directory,
            size,
            modified: None,
        })
    }
}

// ==========================================
// DirectoryClient - 端点抽象
// ==========================================
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn list(&self, path: &str) -> FetchResult<Vec<RemoteEntry>>;
    async fn download(&self, path: &str) -> FetchResult<Vec<u8>>;
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

// ==========================================
// FtpDirectoryClient
// ==========================================
#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl FtpSettings {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct FtpDirectoryClient {
    settings: FtpSettings,
    retry_delay_secs: u64,
}

impl FtpDirectoryClient {
    pub fn new(settings: FtpSettings) -> Self {
        Self {
            settings,
            retry_delay_secs: RETRY_DELAY_SECS,
        }
    }

    pub fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    async fn with_retry<T, F>(&self, op_name: &str, path: &str, op: F) -> FetchResult<T>
    where
        T: Send + 'static,
        F: Fn(&FtpSettings, &str) -> FetchResult<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        for attempt in 1..=MAX_RETRIES {
            debug!(attempt, max = MAX_RETRIES, op = op_name, path, "FTP 操作");

            let result = tokio::task::spawn_blocking({
                let op = op.clone();
                let settings = self.settings.clone();
                let path = path.to_string();
                move || op(&settings, &path)
            })
            .await?;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_RETRIES => {
                    let delay = self.retry_delay_secs * u64::from(attempt);
                    warn!(
                        attempt,
                        max = MAX_RETRIES,
                        op = op_name,
                        path,
                        error = %e,
                        delay_secs = delay,
                        "FTP 操作失败，稍后重试"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FetchError::Connection {
            endpoint: self.settings.endpoint(),
            message: format!("{} 在 {} 次尝试后仍失败", op_name, MAX_RETRIES),
        })
    }

    fn connect(settings: &FtpSettings) -> FetchResult<FtpStream> {
        let endpoint = settings.endpoint();
        let mut ftp = FtpStream::connect(&endpoint).map_err(|e| FetchError::Connection {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;
        ftp.set_mode(suppaftp::Mode::ExtendedPassive);
        ftp.login(&settings.username, &settings.password)
            .map_err(|e| FetchError::Connection {
                endpoint: endpoint.clone(),
                message: format!("登录失败: {}", e),
            })?;
        ftp.transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| FetchError::Connection {
                endpoint,
                message: format!("切换二进制模式失败: {}", e),
            })?;
        Ok(ftp)
    }

    fn quit(mut ftp: FtpStream) {
        if let Err(e) = ftp.quit() {
            warn!(error = %e, "FTP 会话未正常关闭");
        }
    }

    fn list_sync(settings: &FtpSettings, path: &str) -> FetchResult<Vec<RemoteEntry>> {
        let mut ftp = Self::connect(settings)?;
        let lines = ftp.list(Some(path)).map_err(|e| FetchError::Listing {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let mut entries: Vec<RemoteEntry> = lines.iter().filter_map(|l| RemoteEntry::parse_list_line(l)).collect();
        for entry in entries.iter_mut().filter(|e| !e.is_directory) {
            entry.modified = ftp.mdtm(&join_remote(path, &entry.name)).ok();
        }

        Self::quit(ftp);
        Ok(entries)
    }

    fn download_sync(settings: &FtpSettings, path: &str) -> FetchResult<Vec<u8>> {
        let mut ftp = Self::connect(settings)?;
        let buffer = ftp.retr_as_buffer(path).map_err(|e| FetchError::Download {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::quit(ftp);
        Ok(buffer.into_inner())
    }
}

#[async_trait]
impl DirectoryClient for FtpDirectoryClient {
    async fn list(&self, path: &str) -> FetchResult<Vec<RemoteEntry>> {
        self.with_retry("LIST", path, Self::list_sync).await
    }

    async fn download(&self, path: &str) -> FetchResult<Vec<u8>> {
        let data = self.with_retry("RETR", path, Self::download_sync).await?;
        info!(path, bytes = data.len(), "FTP 下载完成");
        Ok(data)
    }
}

// ==========================================
// MountedDirectoryClient
// ==========================================
pub struct MountedDirectoryClient {
    root: PathBuf,
}

impl MountedDirectoryClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl DirectoryClient for MountedDirectoryClient {
    async fn list(&self, path: &str) -> FetchResult<Vec<RemoteEntry>> {
        let dir = self.resolve(path);
        let display = path.to_string();
        tokio::task::spawn_blocking(move || {
            if !dir.is_dir() {
                return Err(FetchError::Listing {
                    path: display,
                    message: format!("目录不存在: {}", dir.display()),
                });
            }
            let mut entries = Vec::new();
            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|e| FetchError::Listing {
                    path: display.clone(),
                    message: e.to_string(),
                })?;
                let metadata = entry.metadata().map_err(|e| FetchError::Listing {
                    path: display.clone(),
                    message: e.to_string(),
                })?;
                entries.push(RemoteEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_directory: metadata.is_dir(),
                    size: Some(metadata.len()),
                    modified: metadata
                        .modified()
                        .ok()
                        .map(|t| DateTime::<Utc>::from(t).naive_utc()),
                });
            }
            Ok(entries)
        })
        .await?
    }

    async fn download(&self, path: &str) -> FetchResult<Vec<u8>> {
        let file = self.resolve(path);
        let display = path.to_string();
        tokio::task::spawn_blocking(move || {
            std::fs::read(&file).map_err(|e| FetchError::Download {
                path: display,
                message: e.to_string(),
            })
        })
        .await?
    }
}

// ==========================================
// RemoteDirectoryFetcher
// ==========================================
#[derive(Default)]
pub struct RemoteDirectoryFetcher {
    ftp_retry_delay_secs: Option<u64>,
}

impl RemoteDirectoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ftp_retry_delay_secs(mut self, secs: u64) -> Self {
        self.ftp_retry_delay_secs = Some(secs);
        self
    }

    fn client_for(&self, endpoint: &RemoteEndpoint) -> Box<dyn DirectoryClient> {
        match endpoint {
            RemoteEndpoint::Ftp {
                host,
                port,
                username,
                password,
            } => {
                let client = FtpDirectoryClient::new(FtpSettings {
                    host: host.clone(),
                    port: *port,
                    username: username.clone(),
                    password: password.clone(),
                });
                match self.ftp_retry_delay_secs {
                    Some(secs) => Box::new(client.with_retry_delay_secs(secs)),
                    None => Box::new(client),
                }
            }
            RemoteEndpoint::Mounted { root } => Box::new(MountedDirectoryClient::new(root)),
        }
    }
}

/// 深度优先遍历目录树（按名称顺序），收集匹配模式的文件
pub async fn collect_from_client(
    client: &dyn DirectoryClient,
    base_path: &str,
    patterns: &PatternSet,
    exclude_dirs: &[String],
    recursive: bool,
) -> FetchResult<Vec<Candidate>> {
    let mut pending = vec![base_path.to_string()];
    let mut candidates = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = client.list(&dir).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut subdirs = Vec::new();
        for entry in entries {
            let full = join_remote(&dir, &entry.name);
            if entry.is_directory {
                if recursive && !exclude_dirs.iter().any(|x| x.eq_ignore_ascii_case(&entry.name)) {
                    subdirs.push(full);
                }
                continue;
            }
            if !patterns.matches(&entry.name) {
                continue;
            }
            let payload = client.download(&full).await?;
            let observed_at = entry.modified.unwrap_or_else(|| Utc::now().naive_utc());
            candidates.push(Candidate::new(entry.name, payload, observed_at));
        }
        // 逆序压栈, 保证按名称顺序访问子目录
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(candidates)
}

#[async_trait]
impl SourceFetcher for RemoteDirectoryFetcher {
    async fn list_candidates(&self, supplier: &Supplier) -> FetchResult<Vec<Candidate>> {
        let SourceConfig::RemoteDirectory {
            endpoint,
            path,
            exclude_dirs,
            recursive,
        } = &supplier.source
        else {
            return Err(FetchError::SourceMismatch {
                supplier_code: supplier.supplier_code.clone(),
                source_kind: supplier.source_kind().to_string(),
            });
        };

        let patterns = PatternSet::compile(&supplier.file_patterns)?;
        let client = self.client_for(endpoint);
        let candidates = collect_from_client(client.as_ref(), path, &patterns, exclude_dirs, *recursive).await?;

        debug!(
            supplier_code = %supplier.supplier_code,
            path = %path,
            candidates = candidates.len(),
            "远程目录扫描完成"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_entry() {
        let e = RemoteEntry::parse_list_line("-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 commande_0115.csv").unwrap();
        assert!(!e.is_directory);
        assert_eq!(e.name, "commande_0115.csv");
        assert_eq!(e.size, Some(1234));
    }

    #[test]
    fn test_parse_directory_and_spaces() {
        let d = RemoteEntry::parse_list_line("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 old").unwrap();
        assert!(d.is_directory);
        assert_eq!(d.name, "old");

        let f = RemoteEntry::parse_list_line("-rw-r--r--   1 ftp ftp  10 Jan 15 12:00 bon de commande.csv").unwrap();
        assert_eq!(f.name, "bon de commande.csv");
    }

    #[test]
    fn test_parse_skips_dot_entries_and_garbage() {
        assert!(RemoteEntry::parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Jan 15 12:00 .").is_none());
        assert!(RemoteEntry::parse_list_line("").is_none());
        assert!(RemoteEntry::parse_list_line("total 8").is_none());
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/", "a.csv"), "/a.csv");
        assert_eq!(join_remote("/in", "a.csv"), "/in/a.csv");
    }

    #[tokio::test]
    async fn test_mounted_directory_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("inbox/old")).unwrap();
        std::fs::create_dir_all(root.join("inbox/2025")).unwrap();
        std::fs::write(root.join("inbox/commande_1.csv"), b"Ref\nA").unwrap();
        std::fs::write(root.join("inbox/readme.txt"), b"x").unwrap();
        std::fs::write(root.join("inbox/old/commande_0.csv"), b"Ref\nZ").unwrap();
        std::fs::write(root.join("inbox/2025/COMMANDE_2.CSV"), b"Ref\nB").unwrap();

        let client = MountedDirectoryClient::new(root);
        let patterns = PatternSet::single("commande_*.csv").unwrap();
        let excluded = vec!["old".to_string()];

        let flat = collect_from_client(&client, "/inbox", &patterns, &excluded, false).await.unwrap();
        assert_eq!(flat.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["commande_1.csv"]);

        let deep = collect_from_client(&client, "/inbox", &patterns, &excluded, true).await.unwrap();
        let names: Vec<&str> = deep.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["commande_1.csv", "COMMANDE_2.CSV"]);
        assert_eq!(deep[1].payload, b"Ref\nB");
    }
}
