// ==========================================
// 供应商订单文件系统 - 运行快照
// ==========================================
// 一次采集/处理运行所需的全部配置: 参数 + 启用的供应商 + 规则文档
// 构建一次后显式传入各引擎，运行期间不再读取全局配置
// ==========================================

use crate::config::config_manager::{ConfigManager, PipelineSettings};
use crate::config::rule_book::{RuleBook, RuleBookError};
use crate::domain::rule::RuleModel;
use crate::domain::supplier::Supplier;
use crate::repository::error::RepositoryError;
use crate::repository::supplier_repo::SupplierRepository;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("配置读取失败: {0}")]
    Config(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    RuleBook(#[from] RuleBookError),
}

#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub settings: PipelineSettings,
    /// 仅包含 active 供应商
    pub suppliers: Vec<Supplier>,
    pub rules: Arc<RuleBook>,
}

impl PipelineSnapshot {
    pub fn new(settings: PipelineSettings, suppliers: Vec<Supplier>, rules: RuleBook) -> Self {
        let suppliers = suppliers.into_iter().filter(|s| s.active).collect();
        Self {
            settings,
            suppliers,
            rules: Arc::new(rules),
        }
    }

    /// 从配置库与供应商表构建快照; 未配置 rules_path 时规则文档为空
    pub fn load(config: &ConfigManager, suppliers: &SupplierRepository) -> Result<Self, SnapshotError> {
        let settings = config
            .load_settings()
            .map_err(|e| SnapshotError::Config(e.to_string()))?;
        let rules = match &settings.rules_path {
            Some(path) => RuleBook::load(path)?,
            None => {
                tracing::warn!("未配置 rules_path，转换规则为空");
                RuleBook::empty()
            }
        };
        let active = suppliers.list(true)?;
        Ok(Self::new(settings, active, rules))
    }

    /// 供应商对应的转换规则
    pub fn rule_for(&self, supplier: &Supplier) -> Option<&RuleModel> {
        self.rules.get(supplier.effective_rule_id())
    }

    pub fn supplier_by_id(&self, supplier_id: &str) -> Option<&Supplier> {
        self.suppliers.iter().find(|s| s.supplier_id == supplier_id)
    }
}
