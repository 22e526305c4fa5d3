//! 余额汇总与逐笔累计账目
//!
//! 两条独立的汇总口径：
//! - 客户口径：销售合计取发票面值，已付合计只取独立付款记录；
//! - 客户+供应商口径：把销售、内嵌付款、独立付款 (以及可选的供应商代收款)
//!   合成一条事件流，按日期升序逐笔累计，同日销售排在付款之前。
//!
//! 每次查询都从头计算，没有缓存状态。

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::LedgerStore;
use crate::error::LedgerError;
use crate::models::{
    BalanceType, CustomerBalanceSummary, CustomerKey, EventSource, LedgerRow, LedgerSources,
    LedgerView,
};

/// 合并前的单个事件
#[derive(Debug, Clone)]
struct LedgerEvent<'a> {
    date: NaiveDate,
    created_at: DateTime<Utc>,
    source: EventSource,
    reference_id: Uuid,
    supplier_name: &'a str,
    description: Option<&'a str>,
    amount: BigDecimal,
}

fn or_zero(amount: &Option<BigDecimal>) -> BigDecimal {
    amount.clone().unwrap_or_else(BigDecimal::zero)
}

fn matches_supplier(supplier: Option<&str>, name: &str) -> bool {
    supplier.map_or(true, |s| s == name)
}

fn collect_events<'a>(
    sources: &'a LedgerSources,
    supplier: Option<&str>,
    view: LedgerView,
) -> Vec<LedgerEvent<'a>> {
    let mut events = Vec::new();

    for i in sources
        .invoices
        .iter()
        .filter(|i| matches_supplier(supplier, &i.supplier_name))
    {
        events.push(LedgerEvent {
            date: i.date,
            created_at: i.created_at,
            source: EventSource::Invoice,
            reference_id: i.id,
            supplier_name: &i.supplier_name,
            description: i.description.as_deref(),
            amount: i.amount.clone(),
        });
    }

    for p in sources
        .embedded_payments
        .iter()
        .filter(|p| matches_supplier(supplier, &p.supplier_name))
    {
        events.push(LedgerEvent {
            date: p.date,
            created_at: p.created_at,
            source: EventSource::TransactionPayment,
            reference_id: p.transaction_id,
            supplier_name: &p.supplier_name,
            description: None,
            amount: or_zero(&p.amount),
        });
    }

    for p in sources
        .payments
        .iter()
        .filter(|p| matches_supplier(supplier, &p.supplier_name))
    {
        events.push(LedgerEvent {
            date: p.date,
            created_at: p.created_at,
            source: EventSource::Payment,
            reference_id: p.id,
            supplier_name: &p.supplier_name,
            description: p.notes.as_deref(),
            amount: p.amount.clone(),
        });
    }

    if view.include_supplier_receipts {
        for r in sources
            .supplier_receipts
            .iter()
            .filter(|r| matches_supplier(supplier, &r.supplier_name))
        {
            events.push(LedgerEvent {
                date: r.date,
                created_at: r.created_at,
                source: EventSource::SupplierReceipt,
                reference_id: r.id,
                supplier_name: &r.supplier_name,
                description: None,
                amount: or_zero(&r.amount),
            });
        }
    }

    events
}

/// 逐笔累计账目，每行携带计入本行之后的余额
pub fn running_ledger(
    sources: &LedgerSources,
    supplier: Option<&str>,
    view: LedgerView,
) -> Vec<LedgerRow> {
    let mut events = collect_events(sources, supplier, view);
    events.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.source.transaction_type().cmp(&b.source.transaction_type()))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.reference_id.cmp(&b.reference_id))
    });

    let mut total_sales = BigDecimal::zero();
    let mut total_paid = BigDecimal::zero();
    let mut supplier_received = BigDecimal::zero();

    events
        .into_iter()
        .map(|event| {
            match event.source {
                EventSource::Invoice => total_sales += &event.amount,
                EventSource::SupplierReceipt => {
                    supplier_received += &event.amount;
                    total_paid += &event.amount;
                }
                EventSource::TransactionPayment | EventSource::Payment => {
                    total_paid += &event.amount
                }
            }
            let running_balance = &total_paid - &total_sales;

            LedgerRow {
                date: event.date,
                transaction_type: event.source.transaction_type(),
                source: event.source,
                reference_id: event.reference_id,
                supplier_name: event.supplier_name.to_string(),
                description: event.description.map(str::to_string),
                amount: event.amount,
                cumulative_total_sales: total_sales.clone(),
                cumulative_total_paid: total_paid.clone(),
                cumulative_supplier_received: supplier_received.clone(),
                balance_type: BalanceType::from_balance(&running_balance),
                running_balance,
            }
        })
        .collect()
}

/// 计算客户 (或客户+供应商) 余额汇总
///
/// 不指定供应商时按客户口径；指定供应商时取该组合逐笔累计的最终值。
pub fn summarize(
    customer_name: &str,
    sources: &LedgerSources,
    supplier: Option<&str>,
) -> CustomerBalanceSummary {
    let (total_sales, total_paid) = match supplier {
        None => (
            sources
                .invoices
                .iter()
                .fold(BigDecimal::zero(), |acc, i| acc + &i.amount),
            sources
                .payments
                .iter()
                .fold(BigDecimal::zero(), |acc, p| acc + &p.amount),
        ),
        Some(_) => running_ledger(sources, supplier, LedgerView::default())
            .pop()
            .map(|last| (last.cumulative_total_sales, last.cumulative_total_paid))
            .unwrap_or_else(|| (BigDecimal::zero(), BigDecimal::zero())),
    };

    let outstanding = sources
        .invoices
        .iter()
        .filter(|i| matches_supplier(supplier, &i.supplier_name))
        .fold(BigDecimal::zero(), |acc, i| acc + i.due());
    let credit_available = sources
        .credits
        .iter()
        .filter(|c| matches_supplier(supplier, &c.supplier_name))
        .fold(BigDecimal::zero(), |acc, c| acc + c.available());

    let balance = &total_paid - &total_sales;
    CustomerBalanceSummary {
        customer_name: customer_name.to_string(),
        supplier_name: supplier.map(str::to_string),
        total_sales,
        total_paid,
        balance_type: BalanceType::from_balance(&balance),
        balance,
        outstanding,
        credit_available,
    }
}

/// 余额汇总服务：读取快照后调用纯函数计算
#[derive(Clone)]
pub struct BalanceAggregator {
    store: Arc<dyn LedgerStore>,
}

impl BalanceAggregator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn compute_summary(
        &self,
        key: &CustomerKey,
        supplier: Option<&str>,
    ) -> Result<CustomerBalanceSummary, LedgerError> {
        let sources = self.store.read_sources(key).await?;
        Ok(summarize(&key.customer_name, &sources, supplier))
    }

    pub async fn compute_ledger(
        &self,
        key: &CustomerKey,
        supplier: Option<&str>,
        view: LedgerView,
    ) -> Result<Vec<LedgerRow>, LedgerError> {
        let sources = self.store.read_sources(key).await?;
        Ok(running_ledger(&sources, supplier, view))
    }

    /// 租户下全部客户的客户口径汇总，按客户名排序
    pub async fn customer_overview(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<CustomerBalanceSummary>, LedgerError> {
        let names = self.store.list_customers(tenant_id).await?;
        let snapshots = futures::future::try_join_all(names.into_iter().map(|name| async move {
            let key = CustomerKey::new(tenant_id, name);
            let sources = self.store.read_sources(&key).await?;
            Ok::<_, LedgerError>((key.customer_name, sources))
        }))
        .await?;

        tracing::debug!(tenant_id = %tenant_id, customers = snapshots.len(), "Computing customer overview");

        let mut overview: Vec<CustomerBalanceSummary> = snapshots
            .par_iter()
            .map(|(name, sources)| summarize(name, sources, None))
            .collect();
        overview.sort_by(|a, b| a.customer_name.cmp(&b.customer_name));
        Ok(overview)
    }
}
