// ==========================================
// 供应商订单文件系统 - 转换规则模型
// ==========================================
// 四阶段（顺序固定）: 重命名 → 新增 → 删除 → 格式化
// 映射类字段保持文档中的书写顺序（后续阶段依赖前序阶段产生的列名）
// ==========================================

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

// ==========================================
// OrderedMap - 保序映射
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: Vec<(String, V)>) -> Self {
        Self(pairs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map with unique string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut pairs: Vec<(String, V)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(serde::de::Error::custom(format!("重复的键: {}", key)));
            }
            pairs.push((key, value));
        }
        Ok(OrderedMap(pairs))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

// ==========================================
// ValueSpec - 新增列取值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "String")]
pub enum ValueSpec {
    Today,           // 当前本地日期 YYYY-MM-DD
    Now,             // 当前本地日期时间
    Literal(String), // 字面量
}

impl From<serde_json::Value> for ValueSpec {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => match s.as_str() {
                "today" => ValueSpec::Today,
                "now" => ValueSpec::Now,
                _ => ValueSpec::Literal(s),
            },
            serde_json::Value::Null => ValueSpec::Literal(String::new()),
            other => ValueSpec::Literal(other.to_string()),
        }
    }
}

impl From<ValueSpec> for String {
    fn from(spec: ValueSpec) -> Self {
        match spec {
            ValueSpec::Today => "today".to_string(),
            ValueSpec::Now => "now".to_string(),
            ValueSpec::Literal(s) => s,
        }
    }
}

// ==========================================
// Formatter - 格式化器
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Formatter {
    Uppercase,
    Lowercase,
    Trim,
    Integer,
    Float,
    Date,
    /// 未识别的标签: 对该列不做处理
    Unknown(String),
}

impl From<String> for Formatter {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "uppercase" => Formatter::Uppercase,
            "lowercase" => Formatter::Lowercase,
            "trim" => Formatter::Trim,
            "integer" => Formatter::Integer,
            "float" => Formatter::Float,
            "date" => Formatter::Date,
            _ => Formatter::Unknown(tag),
        }
    }
}

impl From<Formatter> for String {
    fn from(f: Formatter) -> Self {
        match f {
            Formatter::Uppercase => "uppercase".to_string(),
            Formatter::Lowercase => "lowercase".to_string(),
            Formatter::Trim => "trim".to_string(),
            Formatter::Integer => "integer".to_string(),
            Formatter::Float => "float".to_string(),
            Formatter::Date => "date".to_string(),
            Formatter::Unknown(tag) => tag,
        }
    }
}

// ==========================================
// RuleModel - 供应商转换规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleModel {
    #[serde(default, alias = "column_mapping")]
    pub rename: OrderedMap<String>,

    #[serde(default, alias = "columns_to_add")]
    pub add: OrderedMap<ValueSpec>,

    #[serde(default, alias = "columns_to_remove")]
    pub remove: Vec<String>,

    #[serde(default, alias = "format_rules")]
    pub format: OrderedMap<Formatter>,

    /// 转换前必须存在的原始列
    #[serde(default)]
    pub required_columns: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl RuleModel {
    /// 重命名冲突: 多个旧列映射到同一新列名 (new → [old...])
    pub fn rename_collisions(&self) -> Vec<(String, Vec<String>)> {
        let mut targets: HashMap<&str, Vec<String>> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for (old, new) in self.rename.iter() {
            let entry = targets.entry(new.as_str()).or_default();
            if entry.is_empty() {
                order.push(new.as_str());
            }
            entry.push(old.to_string());
        }
        order
            .into_iter()
            .filter_map(|new| {
                let olds = targets.remove(new)?;
                (olds.len() > 1).then(|| (new.to_string(), olds))
            })
            .collect()
    }

    /// 规则中出现的未识别格式化标签
    pub fn unknown_formatters(&self) -> Vec<(String, String)> {
        self.format
            .iter()
            .filter_map(|(col, f)| match f {
                Formatter::Unknown(tag) => Some((col.to_string(), tag.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_model_preserves_document_order() {
        let raw = r#"{
            "column_mapping": {"Z": "z", "A": "a", "M": "m"},
            "columns_to_add": {"date_commande": "today", "source": "FTP", "qty": 5},
            "columns_to_remove": ["x"],
            "format_rules": {"z": "uppercase", "a": "fancy"}
        }"#;
        let rule: RuleModel = serde_json::from_str(raw).unwrap();
        assert_eq!(rule.rename.keys().collect::<Vec<_>>(), vec!["Z", "A", "M"]);
        assert_eq!(rule.add.get("date_commande"), Some(&ValueSpec::Today));
        assert_eq!(rule.add.get("source"), Some(&ValueSpec::Literal("FTP".into())));
        assert_eq!(rule.add.get("qty"), Some(&ValueSpec::Literal("5".into())));
        assert_eq!(rule.format.get("a"), Some(&Formatter::Unknown("fancy".into())));
        assert_eq!(rule.unknown_formatters(), vec![("a".to_string(), "fancy".to_string())]);
    }

    #[test]
    fn test_rule_model_short_field_names() {
        let raw = r#"{"rename": {"Ref": "product_ref"}, "add": {}, "remove": [], "format": {}}"#;
        let rule: RuleModel = serde_json::from_str(raw).unwrap();
        assert_eq!(rule.rename.get("Ref"), Some(&"product_ref".to_string()));
    }

    #[test]
    fn test_rule_model_missing_fields_default_empty() {
        let rule: RuleModel = serde_json::from_str("{}").unwrap();
        assert_eq!(rule, RuleModel::default());
        assert!(rule.add.is_empty());
        assert!(rule.format.is_empty());
        assert!(OrderedMap::<Formatter>::default().is_empty());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let raw = r#"{"rename": {"A": "x", "A": "y"}}"#;
        assert!(serde_json::from_str::<RuleModel>(raw).is_err());
    }

    #[test]
    fn test_rename_collisions() {
        let raw = r#"{"rename": {"Ref": "ref", "Reference": "ref", "Qty": "quantity"}}"#;
        let rule: RuleModel = serde_json::from_str(raw).unwrap();
        assert_eq!(
            rule.rename_collisions(),
            vec![("ref".to_string(), vec!["Ref".to_string(), "Reference".to_string()])]
        );
    }

    #[test]
    fn test_rule_model_serialize_roundtrip_tags() {
        let raw = r#"{"format": {"q": "integer"}, "add": {"d": "now"}}"#;
        let rule: RuleModel = serde_json::from_str(raw).unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["format"]["q"], "integer");
        assert_eq!(json["add"]["d"], "now");
    }
}
