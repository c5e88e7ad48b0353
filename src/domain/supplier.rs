// ==========================================
// 供应商订单文件系统 - 供应商领域模型
// ==========================================
// 红线: 供应商不做物理删除,只通过 active 标记停用（保留历史）
// ==========================================

use crate::domain::types::SourceKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Supplier - 供应商
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub supplier_id: String,
    pub supplier_code: String, // 唯一编码
    pub name: String,          // 显示名称
    pub active: bool,

    // ===== 采集配置 =====
    pub file_patterns: Vec<String>, // 文件名 glob 模式 (如 "commande_*.csv")
    pub source: SourceConfig,

    // ===== 转换配置 =====
    pub rule_id: Option<String>, // RuleBook 中的规则 ID

    // ===== 业务字段 =====
    pub min_order_amount: Option<f64>, // 最小起订额
    pub notes: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Supplier {
    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// 规则 ID 缺省时使用供应商编码
    pub fn effective_rule_id(&self) -> &str {
        self.rule_id.as_deref().unwrap_or(&self.supplier_code)
    }
}

// ==========================================
// SupplierDraft - 新建/编辑/批量导入参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierDraft {
    pub supplier_code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    pub source: SourceConfig,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub min_order_amount: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 供应商批量导入文档: {"suppliers": [...]}
#[derive(Debug, Clone, Deserialize)]
pub struct SupplierDocument {
    pub suppliers: Vec<SupplierDraft>,
}

fn default_active() -> bool {
    true
}

// ==========================================
// SourceConfig - 来源连接参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// 邮箱附件
    Mailbox {
        /// 发件人过滤 (glob, 大小写不敏感)，如 "*@fournisseur.fr"
        #[serde(default)]
        sender_pattern: Option<String>,
        /// 回溯天数，缺省使用全局配置
        #[serde(default)]
        lookback_days: Option<u32>,
    },
    /// 远程目录
    RemoteDirectory {
        endpoint: RemoteEndpoint,
        #[serde(default = "default_remote_path")]
        path: String,
        #[serde(default = "default_exclude_dirs")]
        exclude_dirs: Vec<String>,
        #[serde(default)]
        recursive: bool,
    },
    /// 人工导入（不参与自动采集）
    Manual,
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::Mailbox { .. } => SourceKind::Mailbox,
            SourceConfig::RemoteDirectory { .. } => SourceKind::RemoteDirectory,
            SourceConfig::Manual => SourceKind::Manual,
        }
    }
}

fn default_remote_path() -> String {
    "/".to_string()
}

fn default_exclude_dirs() -> Vec<String> {
    vec!["old".to_string()]
}

// ==========================================
// RemoteEndpoint - 远程目录端点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RemoteEndpoint {
    Ftp {
        host: String,
        #[serde(default = "default_ftp_port")]
        port: u16,
        username: String,
        password: String,
    },
    /// 已挂载到本机的共享目录（路径即根目录）
    Mounted { root: String },
}

fn default_ftp_port() -> u16 {
    21
}
