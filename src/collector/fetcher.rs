// ==========================================
// 供应商订单文件系统 - 来源采集器契约
// ==========================================
// 两种适配器（邮箱 / 远程目录）实现同一 trait
// 红线: 采集器不做去重,去重由编排器负责
// ==========================================

use crate::collector::error::FetchResult;
use crate::domain::supplier::Supplier;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// 候选文件（名称 + 原始字节 + 元数据）
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub payload: Vec<u8>,
    pub size: u64,
    /// 来源侧观察到的时间（邮件日期 / 文件修改时间）
    pub observed_at: NaiveDateTime,
}

impl Candidate {
    pub fn new(name: impl Into<String>, payload: Vec<u8>, observed_at: NaiveDateTime) -> Self {
        let size = payload.len() as u64;
        Self {
            name: name.into(),
            payload,
            size,
            observed_at,
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// 列出该供应商当前可见、文件名匹配其模式的全部候选文件
    async fn list_candidates(&self, supplier: &Supplier) -> FetchResult<Vec<Candidate>>;
}
