// ==========================================
// 供应商订单文件系统 - 文件记录数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 状态迁移一律使用条件更新（UPDATE ... WHERE <guard>），由影响行数判定结果
// ==========================================

mod core;
mod lease;
mod queries;

#[cfg(test)]
mod tests;

pub use self::core::FileRecordRepository;
pub use self::lease::{LeaseAttempt, ReleaseAttempt, StaleLease, SYSTEM_ACTOR};
pub use self::queries::StatusCount;
