use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CreditEntry, CustomerKey, LedgerRecord, LedgerSources, Payment, SaleInvoice};

/// 批次中的单条变更
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(LedgerRecord),
    /// 以记录携带的版本号为前置条件，成功后版本号加一
    Update(LedgerRecord),
    Delete { id: Uuid, version: i64 },
    CreatePayment(Payment),
    DeletePayment(Uuid),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
            Self::CreatePayment(_) => "create_payment",
            Self::DeletePayment(_) => "delete_payment",
        }
    }
}

/// 账目存储契约
///
/// `commit_batch` 必须全部成功或全部失败；读取返回快照，不持有任何锁。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn read_invoices(&self, key: &CustomerKey) -> Result<Vec<SaleInvoice>, StoreError>;

    async fn read_credits(&self, key: &CustomerKey) -> Result<Vec<CreditEntry>, StoreError>;

    async fn read_payment(
        &self,
        key: &CustomerKey,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// 读取汇总与账目所需的全部来源
    async fn read_sources(&self, key: &CustomerKey) -> Result<LedgerSources, StoreError>;

    async fn list_customers(&self, tenant_id: Uuid) -> Result<Vec<String>, StoreError>;

    async fn commit_batch(&self, mutations: Vec<Mutation>) -> Result<(), StoreError>;
}
