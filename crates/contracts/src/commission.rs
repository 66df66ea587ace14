//! Commission Calculator.
//!
//! Commission is a percentage of the contract total split into two equal
//! halves. Each half is *unlocked* by a payment milestone:
//!
//! - first half: the first payment reaches the reservation amount and further
//!   qualifying payments inside the follow-up window add up to it again;
//! - second half: at least half of the contract total has been paid.
//!
//! `calculate` is a pure function of its inputs, so re-running it after every
//! payment never drifts.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{Percent, round_money};

use crate::contract::AppliedPayment;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    pub rate: Percent,
    /// Minimum first payment (the reservation).
    pub reservation_amount: Decimal,
    /// Minimum size of each follow-up payment, and of their sum.
    pub follow_up_amount: Decimal,
    pub follow_up_window_days: i64,
    /// Share of the total that must be paid to unlock the second half.
    pub second_half_threshold: Percent,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            rate: Percent::new(3),
            reservation_amount: Decimal::from(500),
            follow_up_amount: Decimal::from(500),
            follow_up_window_days: 10,
            second_half_threshold: Percent::new(50),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionHalf {
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionFigures {
    pub total: Decimal,
    pub first_half: Decimal,
    pub second_half: Decimal,
    pub first_half_unlocked: bool,
    pub second_half_unlocked: bool,
    /// Percentage of the contract total paid so far, to cents.
    pub paid_percent: Decimal,
}

impl CommissionFigures {
    pub fn amount(&self, half: CommissionHalf) -> Decimal {
        match half {
            CommissionHalf::First => self.first_half,
            CommissionHalf::Second => self.second_half,
        }
    }

    pub fn is_unlocked(&self, half: CommissionHalf) -> bool {
        match half {
            CommissionHalf::First => self.first_half_unlocked,
            CommissionHalf::Second => self.second_half_unlocked,
        }
    }
}

pub fn calculate(
    policy: &CommissionPolicy,
    contract_total: Decimal,
    created_on: DateTime<Utc>,
    payments: &[AppliedPayment],
) -> CommissionFigures {
    let half = policy.rate.half().rounded_of(contract_total);
    let total_paid: Decimal = payments.iter().map(|p| p.total_charged).sum();

    let paid_percent = if contract_total > Decimal::ZERO {
        round_money(total_paid * Decimal::ONE_HUNDRED / contract_total)
    } else {
        Decimal::ZERO
    };

    CommissionFigures {
        total: half * Decimal::TWO,
        first_half: half,
        second_half: half,
        first_half_unlocked: first_half_unlocked(policy, created_on, payments),
        second_half_unlocked: contract_total > Decimal::ZERO
            && total_paid >= policy.second_half_threshold.of(contract_total),
        paid_percent,
    }
}

fn first_half_unlocked(
    policy: &CommissionPolicy,
    created_on: DateTime<Utc>,
    payments: &[AppliedPayment],
) -> bool {
    let mut ordered: Vec<&AppliedPayment> = payments.iter().collect();
    ordered.sort_by_key(|p| p.paid_at);

    let Some((first, rest)) = ordered.split_first() else {
        return false;
    };
    if first.total_charged < policy.reservation_amount {
        return false;
    }

    let deadline = created_on + Duration::days(policy.follow_up_window_days);
    let follow_up: Decimal = rest
        .iter()
        .filter(|p| p.paid_at > created_on && p.paid_at <= deadline)
        .filter(|p| p.total_charged >= policy.follow_up_amount)
        .map(|p| p.total_charged)
        .sum();

    follow_up >= policy.follow_up_amount
        && first.total_charged + follow_up >= policy.reservation_amount + policy.follow_up_amount
}
