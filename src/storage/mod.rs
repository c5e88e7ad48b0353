// ==========================================
// 供应商订单文件系统 - 对象存储
// ==========================================
// 命名空间: original / transformed / merged
// 契约: put(bytes) -> path, get(path) -> bytes
// 红线: 已写入的对象不覆盖（同名追加 -n 后缀，占位为原子操作）
// ==========================================

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// 对象存储错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("非法对象路径: {0}")]
    InvalidKey(String),

    #[error("对象不存在: {0}")]
    NotFound(String),

    #[error("对象写入失败 ({path}): {message}")]
    WriteFailed { path: String, message: String },

    #[error("对象读取失败 ({path}): {message}")]
    ReadFailed { path: String, message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

// ==========================================
// Namespace - 存储命名空间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Original,
    Transformed,
    Merged,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Original => "original",
            Namespace::Transformed => "transformed",
            Namespace::Merged => "merged",
        }
    }
}

// ==========================================
// ObjectStore - 对象存储接口
// ==========================================
pub trait ObjectStore: Send + Sync {
    /// 写入对象，返回实际存储路径（命名空间内的相对路径）
    fn put(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> StorageResult<String>;

    fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// 删除对象（不存在时视为成功）
    fn delete(&self, path: &str) -> StorageResult<()>;

    fn exists(&self, path: &str) -> bool;
}

// ==========================================
// FsObjectStore - 本地目录实现
// ==========================================
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::WriteFailed {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }
}

/// 第 n 个候选路径: n=0 为原名，其后追加 -1, -2 ... 后缀
fn suffixed_path(relative: &str, n: usize) -> String {
    if n == 0 {
        return relative.to_string();
    }
    let p = Path::new(relative);
    let parent = p.parent().map(|d| d.to_string_lossy().to_string()).unwrap_or_default();
    let stem = p.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = p.extension().map(|s| format!(".{}", s.to_string_lossy())).unwrap_or_default();
    let name = format!("{}-{}{}", stem, n, ext);
    if parent.is_empty() {
        name
    } else {
        format!("{}/{}", parent, name)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> StorageResult<String> {
        validate_relative(key)?;
        let base = format!("{}/{}", namespace.as_str(), key);
        let target = self.resolve(&base)?;

        let write_err = |path: &str, e: std::io::Error| StorageError::WriteFailed {
            path: path.to_string(),
            message: e.to_string(),
        };

        let parent = target.parent().unwrap_or(self.root.as_path()).to_path_buf();
        fs::create_dir_all(&parent).map_err(|e| write_err(&base, e))?;

        // 先写同目录临时文件，再以不覆盖方式落到目标名
        let mut tmp = tempfile::Builder::new()
            .prefix(".put-")
            .tempfile_in(&parent)
            .map_err(|e| write_err(&base, e))?;
        tmp.write_all(bytes).map_err(|e| write_err(&base, e))?;
        tmp.as_file().sync_all().map_err(|e| write_err(&base, e))?;

        let mut n = 0;
        loop {
            let relative = suffixed_path(&base, n);
            match tmp.persist_noclobber(self.root.join(&relative)) {
                Ok(_) => {
                    debug!(path = %relative, size = bytes.len(), "对象已写入");
                    return Ok(relative);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    n += 1;
                }
                Err(e) => return Err(write_err(&relative, e.error)),
            }
        }
    }

    fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::ReadFailed {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFailed {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// 只接受不含 ".." 的相对路径
fn validate_relative(path: &str) -> StorageResult<()> {
    if path.trim().is_empty() {
        return Err(StorageError::InvalidKey(path.to_string()));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(path.to_string()))
    }
}

/// 构造对象键: {supplier_code}/{yyyy-mm-dd}/{filename}
pub fn artifact_key(supplier_code: &str, date: chrono::NaiveDate, filename: &str) -> String {
    let safe_name: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}/{}/{}", supplier_code, date.format("%Y-%m-%d"), safe_name)
}
