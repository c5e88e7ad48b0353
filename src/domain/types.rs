// ==========================================
// 供应商订单文件系统 - 领域类型定义
// ==========================================
// 职责: 文件状态 / 文件类型 / 来源类型 / 审计动作
// 约定: 数据库存储统一使用小写字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 文件状态 (File Status)
// ==========================================
// 状态机: pending → processing → {completed | error}
//         completed → merged (终态)
//         error → processing (重新加锁)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,    // 待处理
    Processing, // 处理中(已加锁)
    Completed,  // 已转换
    Error,      // 转换失败
    Merged,     // 已合并(终态)
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
            FileStatus::Merged => "merged",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FileStatus::Pending),
            "processing" => Some(FileStatus::Processing),
            "completed" => Some(FileStatus::Completed),
            "error" => Some(FileStatus::Error),
            "merged" => Some(FileStatus::Merged),
            _ => None,
        }
    }

    /// 是否允许进入 processing（加锁）
    pub fn is_lockable(&self) -> bool {
        matches!(
            self,
            FileStatus::Pending | FileStatus::Processing | FileStatus::Error
        )
    }

    pub fn all() -> [FileStatus; 5] {
        [
            FileStatus::Pending,
            FileStatus::Processing,
            FileStatus::Completed,
            FileStatus::Error,
            FileStatus::Merged,
        ]
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 文件类型 (File Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Xls => "xls",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(FileKind::Csv),
            "xlsx" => Some(FileKind::Xlsx),
            "xls" => Some(FileKind::Xls),
            _ => None,
        }
    }

    /// 根据文件名扩展名判断类型（大小写不敏感）
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();
        Self::from_db_str(&ext)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 来源类型 (Source Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Mailbox,         // 邮箱附件
    RemoteDirectory, // 远程目录 (FTP / 挂载目录)
    Manual,          // 人工导入
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Mailbox => "mailbox",
            SourceKind::RemoteDirectory => "remote-directory",
            SourceKind::Manual => "manual",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "mailbox" | "email" => Some(SourceKind::Mailbox),
            "remote-directory" | "ftp" => Some(SourceKind::RemoteDirectory),
            "manual" => Some(SourceKind::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 审计动作 (Event Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Uploaded,
    Locked,
    Unlocked,
    Transformed,
    Sent,
    Merged,
    Error,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Uploaded => "uploaded",
            EventAction::Locked => "locked",
            EventAction::Unlocked => "unlocked",
            EventAction::Transformed => "transformed",
            EventAction::Sent => "sent",
            EventAction::Merged => "merged",
            EventAction::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(EventAction::Uploaded),
            "locked" => Some(EventAction::Locked),
            "unlocked" => Some(EventAction::Unlocked),
            "transformed" => Some(EventAction::Transformed),
            "sent" => Some(EventAction::Sent),
            "merged" => Some(EventAction::Merged),
            "error" => Some(EventAction::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_roundtrip_db_str() {
        for status in FileStatus::all() {
            assert_eq!(FileStatus::from_db_str(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::from_db_str("unknown"), None);
    }

    #[test]
    fn test_file_kind_from_filename() {
        assert_eq!(FileKind::from_filename("commande.CSV"), Some(FileKind::Csv));
        assert_eq!(FileKind::from_filename("a.b.xlsx"), Some(FileKind::Xlsx));
        assert_eq!(FileKind::from_filename("legacy.xls"), Some(FileKind::Xls));
        assert_eq!(FileKind::from_filename("notes.pdf"), None);
        assert_eq!(FileKind::from_filename("noext"), None);
    }

    #[test]
    fn test_source_kind_accepts_legacy_names() {
        assert_eq!(SourceKind::from_db_str("email"), Some(SourceKind::Mailbox));
        assert_eq!(SourceKind::from_db_str("ftp"), Some(SourceKind::RemoteDirectory));
        assert_eq!(SourceKind::RemoteDirectory.as_str(), "remote-directory");
    }

    #[test]
    fn test_lockable_statuses() {
        assert!(FileStatus::Pending.is_lockable());
        assert!(FileStatus::Error.is_lockable());
        assert!(FileStatus::Processing.is_lockable());
        assert!(!FileStatus::Completed.is_lockable());
        assert!(!FileStatus::Merged.is_lockable());
    }
}
