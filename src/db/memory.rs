use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{LedgerStore, Mutation};
use crate::error::StoreError;
use crate::models::{
    CreditEntry, CustomerKey, EmbeddedPayment, LedgerRecord, LedgerSources, Payment, SaleInvoice,
    SupplierReceipt,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    records: IndexMap<Uuid, LedgerRecord>,
    payments: IndexMap<Uuid, Payment>,
    embedded_payments: Vec<EmbeddedPayment>,
    supplier_receipts: Vec<SupplierReceipt>,
}

impl Tables {
    /// 在工作副本上依次应用变更，任何一条失败则整个批次作废
    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Create(record) => {
                let id = record.id();
                if self.records.contains_key(&id) {
                    return Err(StoreError::Database(format!("duplicate record {id}")));
                }
                self.records.insert(id, record);
            }
            Mutation::Update(mut record) => {
                let id = record.id();
                let stored = self.records.get_mut(&id).ok_or(StoreError::Conflict { id })?;
                if stored.version() != record.version()
                    || std::mem::discriminant(stored) != std::mem::discriminant(&record)
                {
                    return Err(StoreError::Conflict { id });
                }
                record.bump_version();
                *stored = record;
            }
            Mutation::Delete { id, version } => match self.records.get(&id) {
                Some(stored) if stored.version() == version => {
                    self.records.shift_remove(&id);
                }
                _ => return Err(StoreError::Conflict { id }),
            },
            Mutation::CreatePayment(payment) => {
                if self.payments.contains_key(&payment.id) {
                    return Err(StoreError::Database(format!(
                        "duplicate payment {}",
                        payment.id
                    )));
                }
                self.payments.insert(payment.id, payment);
            }
            Mutation::DeletePayment(id) => {
                if self.payments.shift_remove(&id).is_none() {
                    return Err(StoreError::Conflict { id });
                }
            }
        }
        Ok(())
    }

    fn invoices(&self, key: &CustomerKey) -> Vec<SaleInvoice> {
        self.records
            .values()
            .filter_map(|r| match r {
                LedgerRecord::Invoice(i) if in_scope(i.tenant_id, &i.customer_name, key) => {
                    Some(i.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn credits(&self, key: &CustomerKey) -> Vec<CreditEntry> {
        self.records
            .values()
            .filter_map(|r| match r {
                LedgerRecord::Credit(c) if in_scope(c.tenant_id, &c.customer_name, key) => {
                    Some(c.clone())
                }
                _ => None,
            })
            .collect()
    }
}

fn in_scope(tenant_id: Uuid, customer_name: &str, key: &CustomerKey) -> bool {
    tenant_id == key.tenant_id && customer_name == key.customer_name
}

/// 内存账目存储，用于独立运行与测试
///
/// 提交时先在副本上校验并应用全部变更，成功后整体替换，保证原子性。
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    tables: RwLock<Tables>,
    fail_on_commit: AtomicBool,
    transient_failures: AtomicU32,
    injected_conflicts: AtomicU32,
    commits: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的提交全部以数据库错误失败
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// 接下来 `n` 次提交以可重试错误失败
    pub fn fail_next_commits_transiently(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// 接下来 `n` 次提交以版本冲突失败
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// 成功提交的批次数
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn insert_record(&self, record: LedgerRecord) {
        self.tables.write().await.records.insert(record.id(), record);
    }

    pub async fn insert_payment(&self, payment: Payment) {
        self.tables.write().await.payments.insert(payment.id, payment);
    }

    pub async fn insert_embedded_payment(&self, payment: EmbeddedPayment) {
        self.tables.write().await.embedded_payments.push(payment);
    }

    pub async fn insert_supplier_receipt(&self, receipt: SupplierReceipt) {
        self.tables.write().await.supplier_receipts.push(receipt);
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn read_invoices(&self, key: &CustomerKey) -> Result<Vec<SaleInvoice>, StoreError> {
        Ok(self.tables.read().await.invoices(key))
    }

    async fn read_credits(&self, key: &CustomerKey) -> Result<Vec<CreditEntry>, StoreError> {
        Ok(self.tables.read().await.credits(key))
    }

    async fn read_payment(
        &self,
        key: &CustomerKey,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .get(&payment_id)
            .filter(|p| in_scope(p.tenant_id, &p.customer_name, key))
            .cloned())
    }

    /// 同一把读锁下取全部来源，不会看到提交了一半的批次
    async fn read_sources(&self, key: &CustomerKey) -> Result<LedgerSources, StoreError> {
        let tables = self.tables.read().await;
        Ok(LedgerSources {
            invoices: tables.invoices(key),
            credits: tables.credits(key),
            payments: tables
                .payments
                .values()
                .filter(|p| in_scope(p.tenant_id, &p.customer_name, key))
                .cloned()
                .collect(),
            embedded_payments: tables
                .embedded_payments
                .iter()
                .filter(|p| in_scope(p.tenant_id, &p.customer_name, key))
                .cloned()
                .collect(),
            supplier_receipts: tables
                .supplier_receipts
                .iter()
                .filter(|r| in_scope(r.tenant_id, &r.customer_name, key))
                .cloned()
                .collect(),
        })
    }

    async fn list_customers(&self, tenant_id: Uuid) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let mut names = BTreeSet::new();
        for record in tables.records.values() {
            if record.tenant_id() == tenant_id {
                names.insert(record.customer_name().to_string());
            }
        }
        for p in tables.payments.values().filter(|p| p.tenant_id == tenant_id) {
            names.insert(p.customer_name.clone());
        }
        for p in tables.embedded_payments.iter().filter(|p| p.tenant_id == tenant_id) {
            names.insert(p.customer_name.clone());
        }
        for r in tables.supplier_receipts.iter().filter(|r| r.tenant_id == tenant_id) {
            names.insert(r.customer_name.clone());
        }
        Ok(names.into_iter().collect())
    }

    async fn commit_batch(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        if Self::take_one(&self.transient_failures) {
            return Err(StoreError::Unavailable("injected transient failure".to_string()));
        }
        if self.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }
        if Self::take_one(&self.injected_conflicts) {
            let id = mutations
                .first()
                .map(|m| match m {
                    Mutation::Create(r) | Mutation::Update(r) => r.id(),
                    Mutation::Delete { id, .. } | Mutation::DeletePayment(id) => *id,
                    Mutation::CreatePayment(p) => p.id,
                })
                .unwrap_or_default();
            return Err(StoreError::Conflict { id });
        }

        let mut tables = self.tables.write().await;
        let mut working = tables.clone();
        for mutation in mutations {
            working.apply(mutation)?;
        }
        *tables = working;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
