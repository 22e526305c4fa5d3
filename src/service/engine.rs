use backon::Retryable;
use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::allocation::{allocate_payment, consume_credits};
use crate::config::AllocationConfig;
use crate::db::{LedgerStore, Mutation};
use crate::error::{LedgerError, StoreError};
use crate::models::{
    CreditEntry, CustomerKey, LedgerRecord, Payment, PaymentMethod, SaleInvoice,
};

/// 客户付款请求
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub key: CustomerKey,
    pub supplier_name: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

/// 新销售发票请求
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub key: CustomerKey,
    pub supplier_name: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}

/// 付款分配结果 (已提交)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub updated_invoices: Vec<SaleInvoice>,
    pub credit: Option<CreditEntry>,
}

/// 新发票结果 (已提交)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleOutcome {
    pub invoice: SaleInvoice,
    pub updated_credits: Vec<CreditEntry>,
    pub consumed_credits: Vec<Uuid>,
}

fn validate(key: &CustomerKey, amount: &BigDecimal) -> Result<(), LedgerError> {
    if key.customer_name.trim().is_empty() {
        return Err(LedgerError::validation("customer name is required"));
    }
    if *amount <= BigDecimal::zero() {
        return Err(LedgerError::validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// 付款分配引擎
///
/// 同一客户的分配在进程内由客户级互斥锁串行化；跨进程依赖记录版本号，
/// 冲突时整轮重新读取、计算、提交。
pub struct AllocationEngine {
    store: Arc<dyn LedgerStore>,
    locks: DashMap<CustomerKey, Arc<Mutex<()>>>,
    config: AllocationConfig,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: AllocationConfig) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            config,
        }
    }

    fn customer_lock(&self, key: &CustomerKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// 持客户锁执行；释放后若无其他持有者则移除该锁
    async fn with_customer_lock<T, Fut>(&self, key: &CustomerKey, work: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let lock = self.customer_lock(key);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        // 映射表与本地各持一份
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 2);
        result
    }

    /// 记录一笔客户付款并按先进先出冲抵未付发票，剩余部分转为贷方余额
    pub async fn apply_payment(&self, req: PaymentRequest) -> Result<PaymentOutcome, LedgerError> {
        validate(&req.key, &req.amount)?;

        let payment = Payment {
            id: Uuid::new_v4(),
            tenant_id: req.key.tenant_id,
            customer_name: req.key.customer_name.clone(),
            supplier_name: req.supplier_name.clone(),
            date: req.date,
            amount: req.amount.clone(),
            method: req.method,
            notes: req.notes.clone(),
            created_at: Utc::now(),
        };

        let outcome = self
            .with_customer_lock(
                &req.key,
                self.retry_on_conflict(&req.key, || self.try_apply_payment(&req, &payment)),
            )
            .await
            .inspect_err(|e| {
                tracing::error!(customer = %req.key, amount = %req.amount, error = %e, "Payment allocation failed");
            })?;

        tracing::info!(
            customer = %req.key,
            payment_id = %outcome.payment.id,
            amount = %outcome.payment.amount,
            invoices = outcome.updated_invoices.len(),
            credit = ?outcome.credit.as_ref().map(|c| c.amount.to_string()),
            "Payment allocated"
        );
        Ok(outcome)
    }

    async fn try_apply_payment(
        &self,
        req: &PaymentRequest,
        payment: &Payment,
    ) -> Result<PaymentOutcome, LedgerError> {
        let invoices = self.store.read_invoices(&req.key).await?;
        let allocation = allocate_payment(invoices, &req.amount, req.date);

        let credit = (allocation.remainder > BigDecimal::zero()).then(|| {
            CreditEntry::from_payment_remainder(
                &req.key,
                req.supplier_name.clone(),
                payment.id,
                req.date,
                allocation.remainder.clone(),
            )
        });

        let mut mutations: Vec<Mutation> = allocation
            .updated_invoices
            .iter()
            .cloned()
            .map(|i| Mutation::Update(LedgerRecord::Invoice(i)))
            .collect();
        if let Some(credit) = &credit {
            mutations.push(Mutation::Create(LedgerRecord::Credit(credit.clone())));
        }
        mutations.push(Mutation::CreatePayment(payment.clone()));

        self.commit(&req.key, mutations).await?;

        let updated_invoices = allocation
            .updated_invoices
            .into_iter()
            .map(|mut i| {
                i.version += 1;
                i
            })
            .collect();
        Ok(PaymentOutcome {
            payment: payment.clone(),
            updated_invoices,
            credit,
        })
    }

    /// 记录一张新销售发票，先用客户已有的贷方余额抵扣
    pub async fn record_sale(&self, req: SaleRequest) -> Result<SaleOutcome, LedgerError> {
        validate(&req.key, &req.amount)?;

        let outcome = self
            .with_customer_lock(
                &req.key,
                self.retry_on_conflict(&req.key, || self.try_record_sale(&req)),
            )
            .await
            .inspect_err(|e| {
                tracing::error!(customer = %req.key, amount = %req.amount, error = %e, "Recording sale failed");
            })?;

        tracing::info!(
            customer = %req.key,
            invoice_id = %outcome.invoice.id,
            amount = %outcome.invoice.amount,
            paid_from_credit = %outcome.invoice.paid_amount,
            status = %outcome.invoice.status,
            "Sale recorded"
        );
        Ok(outcome)
    }

    async fn try_record_sale(&self, req: &SaleRequest) -> Result<SaleOutcome, LedgerError> {
        let credits = self.store.read_credits(&req.key).await?;
        let consumption = consume_credits(credits, &req.amount);

        let mut invoice = SaleInvoice::new(
            &req.key,
            req.supplier_name.clone(),
            req.date,
            req.amount.clone(),
            consumption.applied.clone(),
        );
        invoice.description = req.description.clone();

        let mut mutations: Vec<Mutation> = consumption
            .updated_credits
            .iter()
            .cloned()
            .map(|c| Mutation::Update(LedgerRecord::Credit(c)))
            .collect();
        mutations.extend(consumption.exhausted_credits.iter().map(|c| Mutation::Delete {
            id: c.id,
            version: c.version,
        }));
        mutations.push(Mutation::Create(LedgerRecord::Invoice(invoice.clone())));

        self.commit(&req.key, mutations).await?;

        Ok(SaleOutcome {
            invoice,
            updated_credits: consumption
                .updated_credits
                .into_iter()
                .map(|mut c| {
                    c.version += 1;
                    c
                })
                .collect(),
            consumed_credits: consumption.exhausted_credits.iter().map(|c| c.id).collect(),
        })
    }

    /// 删除付款
    ///
    /// 付款一旦冲抵过发票或其贷方余额被抵扣过，就无法准确回滚，直接拒绝；
    /// 只有整笔付款仍原样停留在其产生的贷方余额中时，才连同该余额一起删除。
    pub async fn delete_payment(&self, key: &CustomerKey, payment_id: Uuid) -> Result<(), LedgerError> {
        self.with_customer_lock(
            key,
            self.retry_on_conflict(key, || self.try_delete_payment(key, payment_id)),
        )
        .await?;

        tracing::info!(customer = %key, payment_id = %payment_id, "Payment deleted with its credit balance");
        Ok(())
    }

    async fn try_delete_payment(&self, key: &CustomerKey, payment_id: Uuid) -> Result<(), LedgerError> {
        let payment = self
            .store
            .read_payment(key, payment_id)
            .await?
            .ok_or(LedgerError::PaymentNotFound(payment_id))?;

        let credits = self.store.read_credits(key).await?;
        let reversible = credits.into_iter().find(|c| {
            c.payment_id == Some(payment_id) && c.is_untouched() && c.amount == payment.amount
        });

        let Some(credit) = reversible else {
            tracing::warn!(customer = %key, payment_id = %payment_id, "Refusing to delete allocated payment");
            return Err(LedgerError::PaymentAllocated(payment_id));
        };

        self.commit(
            key,
            vec![
                Mutation::Delete {
                    id: credit.id,
                    version: credit.version,
                },
                Mutation::DeletePayment(payment_id),
            ],
        )
        .await
    }

    /// 版本冲突时整轮重试 (从读取开始)，超过上限报告 ConcurrencyConflict
    async fn retry_on_conflict<T, F, Fut>(&self, key: &CustomerKey, mut attempt_fn: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.config.max_conflict_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Err(LedgerError::Store(StoreError::Conflict { id })) => {
                    if attempt >= max_attempts {
                        return Err(LedgerError::ConcurrencyConflict {
                            customer: key.customer_name.clone(),
                            attempts: attempt,
                        });
                    }
                    tracing::warn!(
                        customer = %key,
                        record_id = %id,
                        attempt,
                        "Ledger record changed since read, retrying allocation"
                    );
                }
                other => return other,
            }
        }
    }

    /// 原子提交；只对批次未到达存储的错误做退避重试
    async fn commit(&self, key: &CustomerKey, mutations: Vec<Mutation>) -> Result<(), LedgerError> {
        let result = (|| async { self.store.commit_batch(mutations.clone()).await })
            .retry(self.config.commit_backoff())
            .when(StoreError::is_transient)
            .notify(|err: &StoreError, dur: Duration| {
                tracing::warn!(customer = %key, error = %err, delay = ?dur, "Ledger store unavailable, retrying commit");
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e @ StoreError::Conflict { .. }) => Err(LedgerError::Store(e)),
            Err(e) => Err(LedgerError::StoreCommitFailure(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedgerStore;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn engine() -> AllocationEngine {
        AllocationEngine::new(Arc::new(MemoryLedgerStore::new()), AllocationConfig::default())
    }

    fn payment(key: &CustomerKey, amount: &str) -> PaymentRequest {
        PaymentRequest {
            key: key.clone(),
            supplier_name: "Cemex".to_string(),
            amount: dec(amount),
            date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            method: PaymentMethod::Cash,
            notes: None,
        }
    }

    #[tokio::test]
    async fn customer_locks_are_released_after_use() {
        let engine = engine();
        let tenant = Uuid::new_v4();

        for name in ["Acme", "Bravo", "Castle"] {
            let key = CustomerKey::new(tenant, name);
            engine.apply_payment(payment(&key, "10")).await.unwrap();
            engine.delete_payment(&key, Uuid::new_v4()).await.unwrap_err();
        }

        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn failed_operations_release_their_lock() {
        let engine = engine();
        let key = CustomerKey::new(Uuid::new_v4(), "Acme");

        engine.apply_payment(payment(&key, "-1")).await.unwrap_err();
        engine.delete_payment(&key, Uuid::new_v4()).await.unwrap_err();

        assert!(engine.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_lock_and_leave_none() {
        let engine = Arc::new(engine());
        let key = CustomerKey::new(Uuid::new_v4(), "Acme");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let key = key.clone();
                tokio::spawn(async move { engine.apply_payment(payment(&key, "5")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(engine.locks.is_empty());
    }
}
