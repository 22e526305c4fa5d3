//! 付款分配的纯计算部分：按日期先进先出，不涉及任何存储。

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;

use crate::models::{CreditEntry, SaleInvoice};

/// 付款分配结果
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAllocation {
    /// 本次有变动的发票 (按分配顺序)
    pub updated_invoices: Vec<SaleInvoice>,
    /// 冲完所有未付发票后的剩余金额
    pub remainder: BigDecimal,
}

/// 新发票抵扣贷方余额的结果
#[derive(Debug, Clone, PartialEq)]
pub struct CreditConsumption {
    /// 部分抵扣、仍需保留的余额记录
    pub updated_credits: Vec<CreditEntry>,
    /// 已抵扣完毕、需要删除的余额记录
    pub exhausted_credits: Vec<CreditEntry>,
    /// 从余额中抵扣的总额
    pub applied: BigDecimal,
}

fn min(a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
    if a < b {
        a.clone()
    } else {
        b.clone()
    }
}

/// 将付款按日期从旧到新冲抵未付发票
///
/// 只处理 pending / partially_paid 的发票；顺序为 (日期, 创建时间, id)。
pub fn allocate_payment(
    invoices: Vec<SaleInvoice>,
    amount: &BigDecimal,
    date: NaiveDate,
) -> PaymentAllocation {
    let mut outstanding: Vec<SaleInvoice> = invoices
        .into_iter()
        .filter(|i| i.status.is_outstanding())
        .collect();
    outstanding.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut remaining = amount.clone();
    let mut updated_invoices = Vec::new();

    for mut invoice in outstanding {
        if remaining <= BigDecimal::zero() {
            break;
        }

        let due = invoice.due();
        let apply = min(&remaining, &due);
        if apply <= BigDecimal::zero() {
            continue;
        }

        invoice.apply_payment(&apply, date);
        remaining = &remaining - &apply;
        updated_invoices.push(invoice);
    }

    PaymentAllocation {
        updated_invoices,
        remainder: remaining,
    }
}

/// 用已有贷方余额 (按日期从旧到新) 抵扣新发票金额
pub fn consume_credits(credits: Vec<CreditEntry>, amount: &BigDecimal) -> CreditConsumption {
    let mut credits = credits;
    credits.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut to_pay = amount.clone();
    let mut updated_credits = Vec::new();
    let mut exhausted_credits = Vec::new();

    for mut credit in credits {
        if to_pay <= BigDecimal::zero() {
            break;
        }

        let available = credit.available();
        let apply = min(&to_pay, &available);
        if apply <= BigDecimal::zero() {
            continue;
        }

        credit.paid_amount = &credit.paid_amount + &apply;
        to_pay = &to_pay - &apply;

        if credit.is_exhausted() {
            exhausted_credits.push(credit);
        } else {
            updated_credits.push(credit);
        }
    }

    CreditConsumption {
        updated_credits,
        exhausted_credits,
        applied: amount - &to_pay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerKey, InvoiceStatus};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn key() -> CustomerKey {
        CustomerKey::new(Uuid::nil(), "Acme")
    }

    fn invoice(d: u32, amount: &str) -> SaleInvoice {
        SaleInvoice::new(&key(), "Cemex", day(d), dec(amount), BigDecimal::zero())
    }

    fn credit(d: u32, amount: &str) -> CreditEntry {
        CreditEntry::from_payment_remainder(&key(), "Cemex", Uuid::new_v4(), day(d), dec(amount))
    }

    #[test]
    fn pays_oldest_invoice_first() {
        let invoices = vec![invoice(3, "300"), invoice(1, "100"), invoice(2, "200")];

        // b1 + 0.5 * b2
        let result = allocate_payment(invoices, &dec("200"), day(5));

        assert_eq!(result.updated_invoices.len(), 2);
        assert_eq!(result.updated_invoices[0].date, day(1));
        assert_eq!(result.updated_invoices[0].status, InvoiceStatus::Paid);
        assert_eq!(result.updated_invoices[1].date, day(2));
        assert_eq!(result.updated_invoices[1].paid_amount, dec("100"));
        assert_eq!(result.updated_invoices[1].status, InvoiceStatus::PartiallyPaid);
        assert_eq!(result.remainder, BigDecimal::zero());
    }

    #[test]
    fn same_day_invoices_keep_creation_order() {
        let mut first = invoice(1, "500");
        let mut second = invoice(1, "100");
        first.created_at = Utc::now() - Duration::seconds(10);
        second.created_at = Utc::now();
        let first_id = first.id;

        let result = allocate_payment(vec![second, first], &dec("50"), day(2));

        assert_eq!(result.updated_invoices.len(), 1);
        assert_eq!(result.updated_invoices[0].id, first_id);
    }

    #[test]
    fn identical_timestamps_fall_back_to_id() {
        let created_at = Utc::now();
        let mut a = invoice(1, "100");
        let mut b = invoice(1, "100");
        a.created_at = created_at;
        b.created_at = created_at;
        let first_id = a.id.min(b.id);

        let forward = allocate_payment(vec![a.clone(), b.clone()], &dec("50"), day(2));
        let reversed = allocate_payment(vec![b, a], &dec("50"), day(2));

        assert_eq!(forward.updated_invoices[0].id, first_id);
        assert_eq!(reversed.updated_invoices[0].id, first_id);
    }

    #[test]
    fn credits_with_identical_timestamps_fall_back_to_id() {
        let created_at = Utc::now();
        let mut a = credit(1, "30");
        let mut b = credit(1, "30");
        a.created_at = created_at;
        b.created_at = created_at;
        let first_id = a.id.min(b.id);

        let result = consume_credits(vec![b, a], &dec("30"));

        assert_eq!(result.exhausted_credits[0].id, first_id);
        assert!(result.updated_credits.is_empty());
    }

    #[test]
    fn skips_settled_invoices() {
        let mut paid = invoice(1, "100");
        paid.apply_payment(&dec("100"), day(1));
        let mut advance = invoice(1, "80");
        advance.status = InvoiceStatus::AdvancePayment;
        let open = invoice(2, "100");
        let open_id = open.id;

        let result = allocate_payment(vec![paid, advance, open], &dec("40"), day(3));

        assert_eq!(result.updated_invoices.len(), 1);
        assert_eq!(result.updated_invoices[0].id, open_id);
    }

    #[test]
    fn overflow_becomes_remainder() {
        let result = allocate_payment(vec![invoice(1, "100")], &dec("175.50"), day(2));

        assert_eq!(result.updated_invoices[0].paid_amount, dec("100"));
        assert_eq!(result.remainder, dec("75.50"));
    }

    #[test]
    fn no_outstanding_invoices_leaves_whole_payment() {
        let result = allocate_payment(Vec::new(), &dec("250"), day(2));

        assert!(result.updated_invoices.is_empty());
        assert_eq!(result.remainder, dec("250"));
    }

    #[test]
    fn partially_consumes_credit() {
        let result = consume_credits(vec![credit(1, "100")], &dec("40"));

        assert_eq!(result.applied, dec("40"));
        assert_eq!(result.updated_credits.len(), 1);
        assert_eq!(result.updated_credits[0].paid_amount, dec("40"));
        assert!(result.exhausted_credits.is_empty());
    }

    #[test]
    fn exhausts_oldest_credit_before_next() {
        let older = credit(1, "30");
        let newer = credit(2, "100");
        let older_id = older.id;

        let result = consume_credits(vec![newer, older], &dec("50"));

        assert_eq!(result.applied, dec("50"));
        assert_eq!(result.exhausted_credits.len(), 1);
        assert_eq!(result.exhausted_credits[0].id, older_id);
        assert_eq!(result.updated_credits[0].paid_amount, dec("20"));
    }

    #[test]
    fn invoice_larger_than_credit() {
        let mut c = credit(1, "100");
        c.paid_amount = dec("40");

        let result = consume_credits(vec![c], &dec("80"));

        assert_eq!(result.applied, dec("60"));
        assert_eq!(result.exhausted_credits.len(), 1);
        assert!(result.updated_credits.is_empty());
    }
}
