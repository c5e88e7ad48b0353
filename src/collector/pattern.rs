// ==========================================
// 供应商订单文件系统 - 文件名模式匹配
// ==========================================
// glob 语法, 大小写不敏感; 任一模式命中即匹配
// ==========================================

use crate::collector::error::{FetchError, FetchResult};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// 编译模式列表; 空白模式被忽略
    pub fn compile(raw: &[String]) -> FetchResult<Self> {
        let mut patterns = Vec::with_capacity(raw.len());
        for p in raw.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let compiled = Pattern::new(p).map_err(|e| FetchError::InvalidPattern {
                pattern: p.to_string(),
                message: e.to_string(),
            })?;
            patterns.push(compiled);
        }
        Ok(Self { patterns })
    }

    pub fn single(raw: &str) -> FetchResult<Self> {
        Self::compile(&[raw.to_string()])
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 空模式集不匹配任何名称
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> PatternSet {
        PatternSet::compile(&items.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_matches_case_insensitive() {
        let s = set(&["commande_*.csv", "*.XLSX"]);
        assert!(s.matches("commande_0312.csv"));
        assert!(s.matches("COMMANDE_0312.CSV"));
        assert!(s.matches("stock.xlsx"));
        assert!(!s.matches("facture_0312.csv"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let s = set(&["", "  "]);
        assert!(s.is_empty());
        assert!(!s.matches("anything.csv"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = PatternSet::compile(&["[abc".to_string()]).unwrap_err();
        assert!(matches!(err, FetchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_sender_pattern() {
        let s = PatternSet::single("*@fournisseur.fr").unwrap();
        assert!(s.matches("Commandes@Fournisseur.FR"));
        assert!(!s.matches("spam@example.com"));
    }
}
