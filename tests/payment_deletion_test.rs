//! Deleting payments that have not been allocated yet.

mod common;

use common::{day, payment, sale, setup};
use customer_ledger_rust::db::LedgerStore;
use customer_ledger_rust::models::CustomerKey;
use customer_ledger_rust::LedgerError;
use uuid::Uuid;

#[tokio::test]
async fn untouched_payment_is_deleted_with_its_credit() {
    let t = setup();
    let outcome = t.engine.apply_payment(payment(&t.key, "100", day(1, 1))).await.unwrap();

    t.engine.delete_payment(&t.key, outcome.payment.id).await.unwrap();

    let sources = t.store.read_sources(&t.key).await.unwrap();
    assert!(sources.payments.is_empty());
    assert!(sources.credits.is_empty());
}

#[tokio::test]
async fn payment_applied_to_invoices_cannot_be_deleted() {
    let t = setup();
    t.engine.record_sale(sale(&t.key, "80", day(1, 1))).await.unwrap();
    let outcome = t.engine.apply_payment(payment(&t.key, "100", day(1, 2))).await.unwrap();

    let result = t.engine.delete_payment(&t.key, outcome.payment.id).await;

    assert!(matches!(result, Err(LedgerError::PaymentAllocated(id)) if id == outcome.payment.id));
    let sources = t.store.read_sources(&t.key).await.unwrap();
    assert_eq!(sources.payments.len(), 1);
    assert_eq!(sources.credits.len(), 1);
}

#[tokio::test]
async fn payment_whose_credit_was_spent_cannot_be_deleted() {
    let t = setup();
    let outcome = t.engine.apply_payment(payment(&t.key, "100", day(1, 1))).await.unwrap();
    t.engine.record_sale(sale(&t.key, "30", day(1, 2))).await.unwrap();

    let result = t.engine.delete_payment(&t.key, outcome.payment.id).await;

    assert!(matches!(result, Err(LedgerError::PaymentAllocated(_))));
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let t = setup();
    let missing = Uuid::new_v4();

    let result = t.engine.delete_payment(&t.key, missing).await;

    assert!(matches!(result, Err(LedgerError::PaymentNotFound(id)) if id == missing));
}

#[tokio::test]
async fn payment_of_another_customer_is_not_found() {
    let t = setup();
    let outcome = t.engine.apply_payment(payment(&t.key, "100", day(1, 1))).await.unwrap();
    let other = CustomerKey::new(t.key.tenant_id, "Bravo Builders");

    let result = t.engine.delete_payment(&other, outcome.payment.id).await;

    assert!(matches!(result, Err(LedgerError::PaymentNotFound(_))));
    assert_eq!(t.store.read_sources(&t.key).await.unwrap().payments.len(), 1);
}
