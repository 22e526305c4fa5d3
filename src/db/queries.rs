use crate::error::StoreError;
use crate::models::{
    CreditEntry, CustomerKey, EmbeddedPayment, InvoiceStatus, LedgerRecord, Payment,
    SaleInvoice, SupplierReceipt, CREDIT_BALANCE_STATUS,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// sale_invoices 表的一行 (普通发票与贷方余额共用)
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub paid_amount: BigDecimal,
    pub status: String,
    pub payment_date: Option<NaiveDate>,
    pub payment_id: Option<Uuid>,
    pub description: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for LedgerRecord {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        if row.status == CREDIT_BALANCE_STATUS {
            return Ok(LedgerRecord::Credit(CreditEntry {
                id: row.id,
                tenant_id: row.tenant_id,
                customer_name: row.customer_name,
                supplier_name: row.supplier_name,
                date: row.date,
                amount: row.amount,
                paid_amount: row.paid_amount,
                payment_id: row.payment_id,
                description: row.description,
                version: row.version,
                created_at: row.created_at,
            }));
        }

        let status = row
            .status
            .parse::<InvoiceStatus>()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;
        Ok(LedgerRecord::Invoice(SaleInvoice {
            id: row.id,
            tenant_id: row.tenant_id,
            customer_name: row.customer_name,
            supplier_name: row.supplier_name,
            date: row.date,
            amount: row.amount,
            paid_amount: row.paid_amount,
            status,
            payment_date: row.payment_date,
            description: row.description,
            version: row.version,
            created_at: row.created_at,
        }))
    }
}

/// 查询客户的全部发票形记录 (按日期、创建时间、id 升序)
pub async fn list_invoice_rows(
    executor: impl Executor<'_, Database = Postgres>,
    key: &CustomerKey,
) -> Result<Vec<InvoiceRow>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRow>(
        r#"
        SELECT id, tenant_id, customer_name, supplier_name, date, amount, paid_amount,
               status, payment_date, payment_id, description, version, created_at
        FROM sale_invoices
        WHERE tenant_id = $1 AND customer_name = $2
        ORDER BY date ASC, created_at ASC, id ASC
        "#,
    )
    .bind(key.tenant_id)
    .bind(key.customer_name.clone())
    .fetch_all(executor)
    .await
}

/// 查询客户的独立付款
pub async fn list_payments(
    executor: impl Executor<'_, Database = Postgres>,
    key: &CustomerKey,
) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, tenant_id, customer_name, supplier_name, date, amount, method, notes, created_at
        FROM payments
        WHERE tenant_id = $1 AND customer_name = $2
        ORDER BY date ASC, created_at ASC, id ASC
        "#,
    )
    .bind(key.tenant_id)
    .bind(key.customer_name.clone())
    .fetch_all(executor)
    .await
}

pub async fn get_payment(
    pool: &PgPool,
    key: &CustomerKey,
    payment_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, tenant_id, customer_name, supplier_name, date, amount, method, notes, created_at
        FROM payments
        WHERE tenant_id = $1 AND customer_name = $2 AND id = $3
        "#,
    )
    .bind(key.tenant_id)
    .bind(&key.customer_name)
    .bind(payment_id)
    .fetch_optional(pool)
    .await
}

/// 查询交易内嵌付款
pub async fn list_embedded_payments(
    executor: impl Executor<'_, Database = Postgres>,
    key: &CustomerKey,
) -> Result<Vec<EmbeddedPayment>, sqlx::Error> {
    sqlx::query_as::<_, EmbeddedPayment>(
        r#"
        SELECT transaction_id, tenant_id, customer_name, supplier_name, date, amount, created_at
        FROM transaction_payments
        WHERE tenant_id = $1 AND customer_name = $2
        ORDER BY date ASC, created_at ASC, transaction_id ASC
        "#,
    )
    .bind(key.tenant_id)
    .bind(key.customer_name.clone())
    .fetch_all(executor)
    .await
}

/// 查询供应商代收款
pub async fn list_supplier_receipts(
    executor: impl Executor<'_, Database = Postgres>,
    key: &CustomerKey,
) -> Result<Vec<SupplierReceipt>, sqlx::Error> {
    sqlx::query_as::<_, SupplierReceipt>(
        r#"
        SELECT id, tenant_id, customer_name, supplier_name, date, amount, created_at
        FROM supplier_receipts
        WHERE tenant_id = $1 AND customer_name = $2
        ORDER BY date ASC, created_at ASC, id ASC
        "#,
    )
    .bind(key.tenant_id)
    .bind(key.customer_name.clone())
    .fetch_all(executor)
    .await
}

/// 租户下出现过的全部客户名
pub async fn list_customer_names(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT customer_name FROM sale_invoices WHERE tenant_id = $1
        UNION
        SELECT customer_name FROM payments WHERE tenant_id = $1
        UNION
        SELECT customer_name FROM transaction_payments WHERE tenant_id = $1
        UNION
        SELECT customer_name FROM supplier_receipts WHERE tenant_id = $1
        ORDER BY customer_name
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

/// 插入发票形记录
pub async fn insert_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &LedgerRecord,
) -> Result<(), sqlx::Error> {
    let (row_fields, payment_date, payment_id) = match record {
        LedgerRecord::Invoice(i) => (record_fields_invoice(i), i.payment_date, None),
        LedgerRecord::Credit(c) => (record_fields_credit(c), None, c.payment_id),
    };
    sqlx::query(
        r#"
        INSERT INTO sale_invoices (
            id, tenant_id, customer_name, supplier_name, date, amount, paid_amount,
            status, payment_date, payment_id, description, version, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(record.id())
    .bind(record.tenant_id())
    .bind(record.customer_name())
    .bind(row_fields.supplier_name)
    .bind(row_fields.date)
    .bind(row_fields.amount)
    .bind(row_fields.paid_amount)
    .bind(record.status_str())
    .bind(payment_date)
    .bind(payment_id)
    .bind(row_fields.description)
    .bind(record.version())
    .bind(row_fields.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 按版本号条件更新，返回受影响行数
pub async fn update_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &LedgerRecord,
) -> Result<u64, sqlx::Error> {
    let (paid_amount, payment_date) = match record {
        LedgerRecord::Invoice(i) => (i.paid_amount.clone(), i.payment_date),
        LedgerRecord::Credit(c) => (c.paid_amount.clone(), None),
    };
    let result = sqlx::query(
        r#"
        UPDATE sale_invoices
        SET paid_amount = $1, status = $2, payment_date = COALESCE($3, payment_date),
            version = version + 1
        WHERE id = $4 AND version = $5
        "#,
    )
    .bind(paid_amount)
    .bind(record.status_str())
    .bind(payment_date)
    .bind(record.id())
    .bind(record.version())
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_record(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    version: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sale_invoices WHERE id = $1 AND version = $2")
        .bind(id)
        .bind(version)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, tenant_id, customer_name, supplier_name, date, amount, method, notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(payment.id)
    .bind(payment.tenant_id)
    .bind(&payment.customer_name)
    .bind(&payment.supplier_name)
    .bind(payment.date)
    .bind(&payment.amount)
    .bind(payment.method)
    .bind(&payment.notes)
    .bind(payment.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(payment_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

struct RecordFields<'a> {
    supplier_name: &'a str,
    date: NaiveDate,
    amount: &'a BigDecimal,
    paid_amount: &'a BigDecimal,
    description: &'a Option<String>,
    created_at: DateTime<Utc>,
}

fn record_fields_invoice(i: &SaleInvoice) -> RecordFields<'_> {
    RecordFields {
        supplier_name: &i.supplier_name,
        date: i.date,
        amount: &i.amount,
        paid_amount: &i.paid_amount,
        description: &i.description,
        created_at: i.created_at,
    }
}

fn record_fields_credit(c: &CreditEntry) -> RecordFields<'_> {
    RecordFields {
        supplier_name: &c.supplier_name,
        date: c.date,
        amount: &c.amount,
        paid_amount: &c.paid_amount,
        description: &c.description,
        created_at: c.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> InvoiceRow {
        InvoiceRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_name: "Acme".to_string(),
            supplier_name: "Cemex".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            amount: "100".parse().unwrap(),
            paid_amount: "30".parse().unwrap(),
            status: status.to_string(),
            payment_date: None,
            payment_id: None,
            description: None,
            version: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn credit_balance_row_becomes_credit() {
        let payment_id = Uuid::new_v4();
        let mut credit_row = row(CREDIT_BALANCE_STATUS);
        credit_row.payment_id = Some(payment_id);
        let id = credit_row.id;

        match LedgerRecord::try_from(credit_row) {
            Ok(LedgerRecord::Credit(c)) => {
                assert_eq!(c.id, id);
                assert_eq!(c.payment_id, Some(payment_id));
                assert_eq!(c.paid_amount, "30".parse::<BigDecimal>().unwrap());
                assert_eq!(c.version, 3);
            }
            other => panic!("expected credit, got {other:?}"),
        }
    }

    #[test]
    fn partially_paid_row_becomes_invoice() {
        let mut invoice_row = row("partially_paid");
        invoice_row.payment_date = NaiveDate::from_ymd_opt(2026, 1, 25);

        match LedgerRecord::try_from(invoice_row) {
            Ok(LedgerRecord::Invoice(i)) => {
                assert_eq!(i.status, InvoiceStatus::PartiallyPaid);
                assert_eq!(i.payment_date, NaiveDate::from_ymd_opt(2026, 1, 25));
            }
            other => panic!("expected invoice, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let bad = row("refunded");
        let id = bad.id;

        let result = LedgerRecord::try_from(bad);

        assert!(matches!(result, Err(StoreError::Corrupt { id: got, .. }) if got == id));
    }
}
