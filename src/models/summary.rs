use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 余额方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    /// 客户多付，我方欠客户
    Creditor,
    /// 客户欠款
    Debtor,
    Balanced,
}

impl BalanceType {
    pub fn from_balance(balance: &BigDecimal) -> Self {
        if *balance > BigDecimal::zero() {
            Self::Creditor
        } else if *balance < BigDecimal::zero() {
            Self::Debtor
        } else {
            Self::Balanced
        }
    }
}

/// 客户余额汇总 (按需计算，不持久化)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerBalanceSummary {
    pub customer_name: String,
    pub supplier_name: Option<String>,
    pub total_sales: BigDecimal,
    pub total_paid: BigDecimal,
    /// total_paid - total_sales
    pub balance: BigDecimal,
    pub balance_type: BalanceType,
    /// 普通发票未付合计
    pub outstanding: BigDecimal,
    /// 未抵扣的贷方余额合计
    pub credit_available: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    // 声明顺序即同日排序顺序：销售在前
    Sale,
    Payment,
}

/// 账目行的数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Invoice,
    TransactionPayment,
    Payment,
    SupplierReceipt,
}

impl EventSource {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Invoice => TransactionType::Sale,
            Self::TransactionPayment | Self::Payment | Self::SupplierReceipt => {
                TransactionType::Payment
            }
        }
    }
}

/// 账目视图选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerView {
    /// 是否计入供应商代收款
    pub include_supplier_receipts: bool,
}

impl Default for LedgerView {
    fn default() -> Self {
        Self {
            include_supplier_receipts: true,
        }
    }
}

/// 账目行：含本行之后的累计值快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub source: EventSource,
    pub reference_id: Uuid,
    pub supplier_name: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub cumulative_total_sales: BigDecimal,
    pub cumulative_total_paid: BigDecimal,
    pub cumulative_supplier_received: BigDecimal,
    pub running_balance: BigDecimal,
    pub balance_type: BalanceType,
}
