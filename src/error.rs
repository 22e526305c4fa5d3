use thiserror::Error;
use uuid::Uuid;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 记录版本与读取时不一致 (并发修改)
    #[error("version conflict on record {id}")]
    Conflict { id: Uuid },

    /// 批次尚未到达存储即失败，可安全重试
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// 分配引擎对外的错误
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("allocation for {customer} kept conflicting after {attempts} attempts")]
    ConcurrencyConflict { customer: String, attempts: u32 },

    #[error("atomic commit failed: {0}")]
    StoreCommitFailure(#[source] StoreError),

    #[error("payment {0} has already been applied to invoices or credit and cannot be deleted")]
    PaymentAllocated(Uuid),

    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
