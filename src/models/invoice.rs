use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::CustomerKey;

/// 存储层中贷方余额记录的状态标记
pub const CREDIT_BALANCE_STATUS: &str = "credit_balance";

/// 销售发票状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    /// 历史数据中的预付款记录，引擎不会产生，也不参与分配
    AdvancePayment,
}

impl InvoiceStatus {
    /// 根据已付金额与面值推导状态
    pub fn derive(paid_amount: &BigDecimal, amount: &BigDecimal) -> Self {
        if paid_amount >= amount {
            Self::Paid
        } else if *paid_amount > BigDecimal::zero() {
            Self::PartiallyPaid
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::AdvancePayment => "advance_payment",
        }
    }

    /// 是否仍有待付金额 (pending / partially_paid)
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyPaid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            "advance_payment" => Ok(Self::AdvancePayment),
            other => Err(format!("unknown invoice status '{other}'")),
        }
    }
}

/// 销售发票
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleInvoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub paid_amount: BigDecimal,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleInvoice {
    /// 创建一张新发票，状态由已付金额推导
    pub fn new(
        key: &CustomerKey,
        supplier_name: impl Into<String>,
        date: NaiveDate,
        amount: BigDecimal,
        paid_amount: BigDecimal,
    ) -> Self {
        let status = InvoiceStatus::derive(&paid_amount, &amount);
        let payment_date = (paid_amount > BigDecimal::zero()).then_some(date);
        Self {
            id: Uuid::new_v4(),
            tenant_id: key.tenant_id,
            customer_name: key.customer_name.clone(),
            supplier_name: supplier_name.into(),
            date,
            amount,
            paid_amount,
            status,
            payment_date,
            description: None,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// 剩余应付金额
    pub fn due(&self) -> BigDecimal {
        let due = &self.amount - &self.paid_amount;
        if due > BigDecimal::zero() {
            due
        } else {
            BigDecimal::zero()
        }
    }

    /// 记入一笔付款并刷新状态与付款日期
    pub fn apply_payment(&mut self, applied: &BigDecimal, date: NaiveDate) {
        self.paid_amount = &self.paid_amount + applied;
        self.status = InvoiceStatus::derive(&self.paid_amount, &self.amount);
        self.payment_date = Some(date);
    }
}

/// 贷方余额 (客户超额付款，等待后续发票抵扣)
///
/// `amount` 为创建时的全额，`paid_amount` 为已被新发票抵扣的部分；
/// 抵扣完毕后记录被删除而非归档。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub paid_amount: BigDecimal,
    /// 产生该余额的付款
    pub payment_id: Option<Uuid>,
    pub description: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl CreditEntry {
    pub fn from_payment_remainder(
        key: &CustomerKey,
        supplier_name: impl Into<String>,
        payment_id: Uuid,
        date: NaiveDate,
        remainder: BigDecimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: key.tenant_id,
            customer_name: key.customer_name.clone(),
            supplier_name: supplier_name.into(),
            date,
            amount: remainder,
            paid_amount: BigDecimal::zero(),
            payment_id: Some(payment_id),
            description: Some(format!("Credit balance from payment on {date}")),
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// 尚可抵扣金额
    pub fn available(&self) -> BigDecimal {
        let available = &self.amount - &self.paid_amount;
        if available > BigDecimal::zero() {
            available
        } else {
            BigDecimal::zero()
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.paid_amount >= self.amount
    }

    pub fn is_untouched(&self) -> bool {
        self.paid_amount.is_zero()
    }
}

/// 发票形记录：普通发票或贷方余额，显式区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    Invoice(SaleInvoice),
    Credit(CreditEntry),
}

impl LedgerRecord {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Invoice(i) => i.id,
            Self::Credit(c) => c.id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Self::Invoice(i) => i.version,
            Self::Credit(c) => c.version,
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::Invoice(i) => i.tenant_id,
            Self::Credit(c) => c.tenant_id,
        }
    }

    pub fn customer_name(&self) -> &str {
        match self {
            Self::Invoice(i) => &i.customer_name,
            Self::Credit(c) => &c.customer_name,
        }
    }

    /// 存储层状态列的取值
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Invoice(i) => i.status.as_str(),
            Self::Credit(_) => CREDIT_BALANCE_STATUS,
        }
    }

    pub(crate) fn bump_version(&mut self) {
        match self {
            Self::Invoice(i) => i.version += 1,
            Self::Credit(c) => c.version += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn status_follows_paid_amount() {
        assert_eq!(InvoiceStatus::derive(&dec("0"), &dec("100")), InvoiceStatus::Pending);
        assert_eq!(InvoiceStatus::derive(&dec("0.01"), &dec("100")), InvoiceStatus::PartiallyPaid);
        assert_eq!(InvoiceStatus::derive(&dec("100"), &dec("100")), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::derive(&dec("120"), &dec("100")), InvoiceStatus::Paid);
    }

    #[test]
    fn status_parses_storage_values() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Paid,
            InvoiceStatus::AdvancePayment,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>(), Ok(status));
        }
        assert!(CREDIT_BALANCE_STATUS.parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn apply_payment_sets_payment_date() {
        let key = CustomerKey::new(Uuid::new_v4(), "Acme");
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut invoice = SaleInvoice::new(&key, "Cemex", date, dec("1000"), dec("0"));
        assert_eq!(invoice.payment_date, None);

        let paid_on = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        invoice.apply_payment(&dec("400"), paid_on);
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.due(), dec("600"));
        assert_eq!(invoice.payment_date, Some(paid_on));
    }
}
