use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::queries;
use super::store::{LedgerStore, Mutation};
use crate::error::StoreError;
use crate::models::{CreditEntry, CustomerKey, LedgerRecord, LedgerSources, Payment, SaleInvoice};

/// 批次语句执行超时 (不含 COMMIT)
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// 连接层面的错误：批次尚未写入，可重试
fn unavailable_or_db(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

fn db(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// PostgreSQL 账目存储，每个批次一个数据库事务
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn read_records(&self, key: &CustomerKey) -> Result<Vec<LedgerRecord>, StoreError> {
        queries::list_invoice_rows(&self.pool, key)
            .await
            .map_err(unavailable_or_db)?
            .into_iter()
            .map(LedgerRecord::try_from)
            .collect()
    }

    /// 在事务中执行全部语句，返回尚未提交的事务
    async fn stage_batch(
        &self,
        mutations: Vec<Mutation>,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable_or_db)?;

        for mutation in &mutations {
            match mutation {
                Mutation::Create(record) => {
                    queries::insert_record(&mut tx, record).await.map_err(db)?;
                }
                Mutation::Update(record) => {
                    let affected = queries::update_record(&mut tx, record).await.map_err(db)?;
                    if affected == 0 {
                        tx.rollback().await.ok();
                        return Err(StoreError::Conflict { id: record.id() });
                    }
                }
                Mutation::Delete { id, version } => {
                    let affected = queries::delete_record(&mut tx, *id, *version)
                        .await
                        .map_err(db)?;
                    if affected == 0 {
                        tx.rollback().await.ok();
                        return Err(StoreError::Conflict { id: *id });
                    }
                }
                Mutation::CreatePayment(payment) => {
                    queries::insert_payment(&mut tx, payment).await.map_err(db)?;
                }
                Mutation::DeletePayment(id) => {
                    let affected = queries::delete_payment(&mut tx, *id).await.map_err(db)?;
                    if affected == 0 {
                        tx.rollback().await.ok();
                        return Err(StoreError::Conflict { id: *id });
                    }
                }
            }
        }

        Ok(tx)
    }
}

/// 超时只约束提交前的语句；COMMIT 一旦发出就等待其结束，
/// 超时丢弃的是未提交的事务，随之回滚。
pub(crate) async fn stage_then_commit<T, S, C, CF>(
    limit: Duration,
    stage: S,
    commit: C,
) -> Result<(), StoreError>
where
    S: Future<Output = Result<T, StoreError>>,
    C: FnOnce(T) -> CF,
    CF: Future<Output = Result<(), StoreError>>,
{
    let staged = tokio::time::timeout(limit, stage)
        .await
        .map_err(|_| StoreError::Database(format!("batch statements timed out (>{limit:?})")))??;
    commit(staged).await
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn read_invoices(&self, key: &CustomerKey) -> Result<Vec<SaleInvoice>, StoreError> {
        Ok(self
            .read_records(key)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                LedgerRecord::Invoice(i) => Some(i),
                LedgerRecord::Credit(_) => None,
            })
            .collect())
    }

    async fn read_credits(&self, key: &CustomerKey) -> Result<Vec<CreditEntry>, StoreError> {
        Ok(self
            .read_records(key)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                LedgerRecord::Credit(c) => Some(c),
                LedgerRecord::Invoice(_) => None,
            })
            .collect())
    }

    async fn read_payment(
        &self,
        key: &CustomerKey,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        queries::get_payment(&self.pool, key, payment_id)
            .await
            .map_err(unavailable_or_db)
    }

    /// 四张表在同一个只读快照事务中读取，看不到提交了一半的批次
    async fn read_sources(&self, key: &CustomerKey) -> Result<LedgerSources, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable_or_db)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        let records = queries::list_invoice_rows(&mut *tx, key).await.map_err(db)?;
        let payments = queries::list_payments(&mut *tx, key).await.map_err(db)?;
        let embedded_payments = queries::list_embedded_payments(&mut *tx, key)
            .await
            .map_err(db)?;
        let supplier_receipts = queries::list_supplier_receipts(&mut *tx, key)
            .await
            .map_err(db)?;
        tx.commit().await.map_err(db)?;

        let mut sources = LedgerSources {
            payments,
            embedded_payments,
            supplier_receipts,
            ..Default::default()
        };
        for row in records {
            match LedgerRecord::try_from(row)? {
                LedgerRecord::Invoice(i) => sources.invoices.push(i),
                LedgerRecord::Credit(c) => sources.credits.push(c),
            }
        }
        Ok(sources)
    }

    async fn list_customers(&self, tenant_id: Uuid) -> Result<Vec<String>, StoreError> {
        queries::list_customer_names(&self.pool, tenant_id)
            .await
            .map_err(unavailable_or_db)
    }

    async fn commit_batch(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        let count = mutations.len();
        tracing::debug!(mutations = count, "Committing ledger batch");
        let start = Instant::now();

        let result = stage_then_commit(STATEMENT_TIMEOUT, self.stage_batch(mutations), |tx| async move {
            tx.commit().await.map_err(db)
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(mutations = count, elapsed = ?start.elapsed(), "Ledger batch committed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(mutations = count, elapsed = ?start.elapsed(), error = %e, "Ledger batch failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const LIMIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn slow_commit_still_reports_success() {
        let committed = Arc::new(AtomicBool::new(false));
        let flag = committed.clone();

        let result = stage_then_commit(LIMIT, async { Ok(()) }, |()| async move {
            tokio::time::sleep(LIMIT * 4).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(result.is_ok());
        assert!(committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn slow_statements_time_out_without_committing() {
        let committed = Arc::new(AtomicBool::new(false));
        let flag = committed.clone();

        let result = stage_then_commit(
            LIMIT,
            async {
                tokio::time::sleep(LIMIT * 10).await;
                Ok(())
            },
            |()| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn staging_errors_skip_the_commit() {
        let id = Uuid::new_v4();

        let result = stage_then_commit(
            LIMIT,
            async move { Err::<(), _>(StoreError::Conflict { id }) },
            |()| async { Err(StoreError::Database("committed after a failed stage".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(StoreError::Conflict { id: got }) if got == id));
    }
}
