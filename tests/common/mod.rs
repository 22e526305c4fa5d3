//! Shared fixtures for the allocation and balance integration tests.

#![allow(dead_code)]

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use customer_ledger_rust::config::AllocationConfig;
use customer_ledger_rust::db::{LedgerStore, MemoryLedgerStore};
use customer_ledger_rust::models::{CustomerKey, LedgerSources, PaymentMethod};
use customer_ledger_rust::service::{PaymentRequest, SaleRequest};
use customer_ledger_rust::{AllocationEngine, BalanceAggregator};
use std::sync::Arc;
use uuid::Uuid;

pub fn dec(s: &str) -> BigDecimal {
    s.parse().unwrap()
}

pub fn day(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, d).unwrap()
}

/// Millisecond backoff so retry tests stay fast.
pub fn fast_config() -> AllocationConfig {
    AllocationConfig {
        max_conflict_retries: 5,
        commit_retry_min_delay_ms: 1,
        commit_retry_max_delay_ms: 5,
        commit_retry_max_times: 3,
    }
}

pub struct TestLedger {
    pub store: Arc<MemoryLedgerStore>,
    pub engine: AllocationEngine,
    pub aggregator: BalanceAggregator,
    pub key: CustomerKey,
}

pub fn setup() -> TestLedger {
    setup_with(fast_config())
}

pub fn setup_with(config: AllocationConfig) -> TestLedger {
    let store = Arc::new(MemoryLedgerStore::new());
    let shared: Arc<dyn LedgerStore> = store.clone();
    TestLedger {
        engine: AllocationEngine::new(shared.clone(), config),
        aggregator: BalanceAggregator::new(shared),
        store,
        key: CustomerKey::new(Uuid::new_v4(), "Acme"),
    }
}

pub fn payment(key: &CustomerKey, amount: &str, date: NaiveDate) -> PaymentRequest {
    PaymentRequest {
        key: key.clone(),
        supplier_name: "Cemex".to_string(),
        amount: dec(amount),
        date,
        method: PaymentMethod::BankTransfer,
        notes: None,
    }
}

pub fn sale(key: &CustomerKey, amount: &str, date: NaiveDate) -> SaleRequest {
    SaleRequest {
        key: key.clone(),
        supplier_name: "Cemex".to_string(),
        amount: dec(amount),
        date,
        description: Some("Portland cement".to_string()),
    }
}

/// Σ payment.amount == Σ invoice.paid_amount + Σ unconsumed credit
pub fn assert_conserved(sources: &LedgerSources) {
    let paid_in = sources
        .payments
        .iter()
        .fold(BigDecimal::zero(), |acc, p| acc + &p.amount);
    let applied = sources
        .invoices
        .iter()
        .fold(BigDecimal::zero(), |acc, i| acc + &i.paid_amount);
    let unconsumed = sources
        .credits
        .iter()
        .fold(BigDecimal::zero(), |acc, c| acc + c.available());
    assert_eq!(paid_in, applied + unconsumed, "payments must equal applied + unconsumed credit");
}

/// 0 <= paid_amount <= amount for every invoice and credit
pub fn assert_bounded(sources: &LedgerSources) {
    for i in &sources.invoices {
        assert!(i.paid_amount >= BigDecimal::zero(), "invoice {} paid below zero", i.id);
        assert!(i.paid_amount <= i.amount, "invoice {} overpaid", i.id);
    }
    for c in &sources.credits {
        assert!(c.paid_amount >= BigDecimal::zero(), "credit {} consumed below zero", c.id);
        assert!(c.paid_amount < c.amount, "exhausted credit {} still stored", c.id);
    }
}
