// ==========================================
// 供应商订单文件系统 - 采集模块错误类型
// ==========================================
// 红线: FetchError 只影响单个供应商,由编排器捕获并归约为结构化结果
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    // ===== 连接 =====
    #[error("连接失败: {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    // ===== 列目录 / 下载 =====
    #[error("目录列举失败: {path}: {message}")]
    Listing { path: String, message: String },

    #[error("文件下载失败: {path}: {message}")]
    Download { path: String, message: String },

    // ===== 邮件 =====
    #[error("邮件解析失败: {message_id}: {message}")]
    MessageParse { message_id: String, message: String },

    #[error("邮件存储读取失败: {0}")]
    MessageStore(String),

    // ===== 配置 =====
    #[error("文件名模式无效: {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("供应商来源配置与采集器不匹配: supplier={supplier_code}, source={source_kind}")]
    SourceMismatch {
        supplier_code: String,
        source_kind: String,
    },

    #[error("采集任务异常退出: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::TaskFailed(err.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
