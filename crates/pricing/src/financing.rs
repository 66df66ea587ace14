//! Financing schedules for financed and installment payment plans.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::round_money;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "number", rename_all = "snake_case")]
pub enum ScheduledPaymentKind {
    Deposit,
    SecondPayment,
    Monthly(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub kind: ScheduledPaymentKind,
    pub amount: Decimal,
}

/// Deposit, then a fixed second payment, then equal monthly installments of
/// whatever remains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancingSchedule {
    pub total: Decimal,
    pub deposit: Decimal,
    pub second_payment: Decimal,
    pub financed_balance: Decimal,
    pub months: u32,
    pub monthly_payment: Decimal,
    pub payments: Vec<ScheduledPayment>,
}

impl FinancingSchedule {
    /// A non-positive remainder produces no monthly installments at all.
    pub fn compute(total: Decimal, months: u32, deposit: Decimal, second_payment: Decimal) -> Self {
        let remainder = total - deposit - second_payment;
        if remainder <= Decimal::ZERO || months == 0 {
            return Self {
                total,
                deposit,
                second_payment,
                financed_balance: Decimal::ZERO,
                months: 0,
                monthly_payment: Decimal::ZERO,
                payments: Vec::new(),
            };
        }

        let monthly_payment = even_installment(remainder, months);
        let mut payments = vec![
            ScheduledPayment { kind: ScheduledPaymentKind::Deposit, amount: deposit },
            ScheduledPayment { kind: ScheduledPaymentKind::SecondPayment, amount: second_payment },
        ];
        payments.extend((1..=months).map(|n| ScheduledPayment {
            kind: ScheduledPaymentKind::Monthly(n),
            amount: monthly_payment,
        }));

        Self {
            total,
            deposit,
            second_payment,
            financed_balance: round_money(remainder),
            months,
            monthly_payment,
            payments,
        }
    }
}

/// `balance` split evenly over `months`, rounded to cents (zero for no months).
pub fn even_installment(balance: Decimal, months: u32) -> Decimal {
    if months == 0 || balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_money(balance / Decimal::from(months))
}
