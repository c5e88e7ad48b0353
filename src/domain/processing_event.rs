// ==========================================
// 供应商订单文件系统 - 处理事件（审计）领域模型
// ==========================================
// 红线: 只追加,不修改,不删除
// ==========================================

use crate::domain::types::EventAction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub event_id: String,
    pub file_id: String,
    pub actor: String,
    pub action: EventAction,
    pub detail: JsonValue,
    pub created_at: NaiveDateTime,
}

impl ProcessingEvent {
    pub fn new(file_id: &str, actor: &str, action: EventAction, detail: JsonValue, at: NaiveDateTime) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            actor: actor.to_string(),
            action,
            detail,
            created_at: at,
        }
    }
}
