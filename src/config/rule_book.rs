// ==========================================
// 供应商订单文件系统 - 转换规则文档
// ==========================================
// 格式: { "<rule_id>": RuleModel, ... }（JSON）
// 启动时加载一次，运行期间只读
// ==========================================

use crate::domain::rule::{OrderedMap, RuleModel};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RuleBookError {
    #[error("规则文件读取失败 ({path}): {message}")]
    Io { path: String, message: String },

    #[error("规则文档格式错误: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleBook {
    rules: OrderedMap<RuleModel>,
}

impl RuleBook {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleBookError> {
        let rules: OrderedMap<RuleModel> = serde_json::from_str(raw)?;
        let book = Self { rules };
        book.report_ambiguities();
        Ok(book)
    }

    pub fn load(path: &Path) -> Result<Self, RuleBookError> {
        let raw = std::fs::read_to_string(path).map_err(|e| RuleBookError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let book = Self::from_json_str(&raw)?;
        info!(path = %path.display(), rules = book.len(), "转换规则已加载");
        Ok(book)
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleModel> {
        self.rules.get(rule_id)
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 重命名冲突与未知格式化标签只告警，不拒绝加载
    fn report_ambiguities(&self) {
        for (rule_id, rule) in self.rules.iter() {
            for (target, sources) in rule.rename_collisions() {
                warn!(
                    rule_id,
                    target = %target,
                    sources = ?sources,
                    "多个旧列映射到同一新列名，按映射顺序后者生效"
                );
            }
            for (column, tag) in rule.unknown_formatters() {
                warn!(rule_id, column = %column, tag = %tag, "未识别的格式化标签，该列不做处理");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rule_book() {
        let raw = r#"{
            "ACME": {"rename": {"Ref": "product_ref"}, "format": {"product_ref": "uppercase"}},
            "BETA": {"column_mapping": {"Art": "ref", "Article": "ref"}, "format_rules": {"q": "money"}}
        }"#;
        let book = RuleBook::from_json_str(raw).unwrap();
        assert_eq!(book.rule_ids().collect::<Vec<_>>(), vec!["ACME", "BETA"]);
        assert!(book.get("ACME").is_some());
        assert!(book.get("GAMMA").is_none());
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(RuleBook::from_json_str("[1,2]"), Err(RuleBookError::Parse(_))));
        assert!(matches!(
            RuleBook::load(Path::new("/nonexistent/rules.json")),
            Err(RuleBookError::Io { .. })
        ));
    }
}
