// ==========================================
// 供应商订单文件系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 缺省: 配置不存在或格式错误时使用默认值（记录 warn）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::file_record::DEFAULT_LEASE_TIMEOUT_MINUTES;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// PipelineSettings - 运行参数快照（只读）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub lease_timeout_minutes: i64,
    pub mailbox_lookback_days: u32,
    pub stale_sweep_interval_secs: u64,
    pub dedupe_by_content_hash: bool,
    pub merge_tag_source_file: bool,
    pub collector_concurrency: usize,
    pub storage_root: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub mailbox_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lease_timeout_minutes: DEFAULT_LEASE_TIMEOUT_MINUTES,
            mailbox_lookback_days: 2,
            stale_sweep_interval_secs: 60,
            dedupe_by_content_hash: false,
            merge_tag_source_file: true,
            collector_concurrency: 4,
            storage_root: default_storage_root(),
            rules_path: None,
            mailbox_root: None,
        }
    }
}

impl PipelineSettings {
    pub fn lease_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lease_timeout_minutes)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_sweep_interval_secs.max(1))
    }
}

/// 默认对象存储目录: {data_dir}/supplier-order-flow/storage
pub fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("supplier-order-flow")
        .join("storage")
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置，缺失或格式错误时返回默认值
    fn get_parsed_or_default<T: FromStr>(&self, key: &str, default: T) -> ConfigResult<T> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    fn get_bool_or_default(&self, key: &str, default: bool) -> ConfigResult<bool> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => {
                    tracing::warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    fn get_path(&self, key: &str) -> ConfigResult<Option<PathBuf>> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from))
    }

    /// 加载完整运行参数
    pub fn load_settings(&self) -> ConfigResult<PipelineSettings> {
        let d = PipelineSettings::default();

        let mut lease_timeout_minutes =
            self.get_parsed_or_default(config_keys::LEASE_TIMEOUT_MINUTES, d.lease_timeout_minutes)?;
        if lease_timeout_minutes <= 0 {
            tracing::warn!(lease_timeout_minutes, "租约超时必须为正数，使用默认值");
            lease_timeout_minutes = d.lease_timeout_minutes;
        }

        let collector_concurrency = self
            .get_parsed_or_default(config_keys::COLLECTOR_CONCURRENCY, d.collector_concurrency)?
            .max(1);

        Ok(PipelineSettings {
            lease_timeout_minutes,
            mailbox_lookback_days: self
                .get_parsed_or_default(config_keys::MAILBOX_LOOKBACK_DAYS, d.mailbox_lookback_days)?,
            stale_sweep_interval_secs: self
                .get_parsed_or_default(config_keys::STALE_SWEEP_INTERVAL_SECS, d.stale_sweep_interval_secs)?,
            dedupe_by_content_hash: self
                .get_bool_or_default(config_keys::DEDUPE_BY_CONTENT_HASH, d.dedupe_by_content_hash)?,
            merge_tag_source_file: self
                .get_bool_or_default(config_keys::MERGE_TAG_SOURCE_FILE, d.merge_tag_source_file)?,
            collector_concurrency,
            storage_root: self.get_path(config_keys::STORAGE_ROOT)?.unwrap_or(d.storage_root),
            rules_path: self.get_path(config_keys::RULES_PATH)?,
            mailbox_root: self.get_path(config_keys::MAILBOX_ROOT)?,
        })
    }

    /// 获取所有 global 配置（按键排序），用于运行日志
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&config_map)?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // ===== 租约 =====
    pub const LEASE_TIMEOUT_MINUTES: &str = "lease_timeout_minutes";
    pub const STALE_SWEEP_INTERVAL_SECS: &str = "stale_sweep_interval_secs";

    // ===== 采集 =====
    pub const MAILBOX_LOOKBACK_DAYS: &str = "mailbox_lookback_days";
    pub const DEDUPE_BY_CONTENT_HASH: &str = "dedupe_by_content_hash";
    pub const COLLECTOR_CONCURRENCY: &str = "collector_concurrency";
    pub const MAILBOX_ROOT: &str = "mailbox_root";

    // ===== 合并 =====
    pub const MERGE_TAG_SOURCE_FILE: &str = "merge_tag_source_file";

    // ===== 路径 =====
    pub const STORAGE_ROOT: &str = "storage_root";
    pub const RULES_PATH: &str = "rules_path";
}
