//! Engine configuration.
//!
//! Defaults reproduce the house rules; each value can be overridden through a
//! `VENUEBOOK_*` environment variable. Unparseable or out-of-range values are
//! logged and the default is kept.

use std::str::FromStr;

use rust_decimal::Decimal;

use venuebook_contracts::{CommissionPolicy, ContractPolicy};
use venuebook_core::Percent;
use venuebook_pricing::TaxConfig;

pub const TAX_PERCENT: &str = "VENUEBOOK_TAX_PERCENT";
pub const SERVICE_FEE_PERCENT: &str = "VENUEBOOK_SERVICE_FEE_PERCENT";
pub const CARD_SURCHARGE_PERCENT: &str = "VENUEBOOK_CARD_SURCHARGE_PERCENT";
pub const MIN_DEPOSIT: &str = "VENUEBOOK_MIN_DEPOSIT";
pub const COMMISSION_PERCENT: &str = "VENUEBOOK_COMMISSION_PERCENT";
pub const ACCESS_CODE_GRACE_DAYS: &str = "VENUEBOOK_ACCESS_CODE_GRACE_DAYS";
pub const FINANCING_SECOND_PAYMENT: &str = "VENUEBOOK_FINANCING_SECOND_PAYMENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub tax: TaxConfig,
    pub card_surcharge: Percent,
    pub minimum_deposit: Decimal,
    pub commission: CommissionPolicy,
    /// Days after the event date an access code keeps working.
    pub access_code_grace_days: i64,
    pub financing_second_payment: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax: TaxConfig::default(),
            card_surcharge: Percent::new(Decimal::new(38, 1)),
            minimum_deposit: Decimal::from(500),
            commission: CommissionPolicy::default(),
            access_code_grace_days: 30,
            financing_second_payment: Decimal::from(1000),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = read_non_negative::<Decimal>(&lookup, TAX_PERCENT) {
            cfg.tax.tax = Percent::new(v);
        }
        if let Some(v) = read_non_negative::<Decimal>(&lookup, SERVICE_FEE_PERCENT) {
            cfg.tax.service_fee = Percent::new(v);
        }
        if let Some(v) = read_non_negative::<Decimal>(&lookup, CARD_SURCHARGE_PERCENT) {
            cfg.card_surcharge = Percent::new(v);
        }
        if let Some(v) = read_non_negative::<Decimal>(&lookup, MIN_DEPOSIT) {
            cfg.minimum_deposit = v;
        }
        if let Some(v) = read_non_negative::<Decimal>(&lookup, COMMISSION_PERCENT) {
            cfg.commission.rate = Percent::new(v);
        }
        if let Some(v) = read_non_negative::<i64>(&lookup, ACCESS_CODE_GRACE_DAYS) {
            cfg.access_code_grace_days = v;
        }
        if let Some(v) = read_non_negative::<Decimal>(&lookup, FINANCING_SECOND_PAYMENT) {
            cfg.financing_second_payment = v;
        }

        cfg
    }

    /// The policy frozen onto each contract at issuance.
    pub fn contract_policy(&self) -> ContractPolicy {
        ContractPolicy {
            minimum_deposit: self.minimum_deposit,
            financing_second_payment: self.financing_second_payment,
            commission: self.commission,
        }
    }
}

fn read_non_negative<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) if v >= T::default() => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}
