use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{CreditEntry, SaleInvoice};

/// 付款方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    Cheque,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cheque" => Ok(Self::Cheque),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// 客户独立付款记录 (只追加，不记录分配到哪些发票)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    /// 名义供应商，付款不归属于具体发票
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 交易记录中内嵌的付款 (销售时当场收取)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct EmbeddedPayment {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

/// 供应商代客户收取的款项
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SupplierReceipt {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

/// 某客户的全部账目来源快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSources {
    pub invoices: Vec<SaleInvoice>,
    pub credits: Vec<CreditEntry>,
    pub payments: Vec<Payment>,
    pub embedded_payments: Vec<EmbeddedPayment>,
    pub supplier_receipts: Vec<SupplierReceipt>,
}
