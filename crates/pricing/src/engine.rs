//! Pricing Engine.
//!
//! `compute_total` is a pure function from a [`PricingInput`] to an itemized
//! [`Breakdown`]. Steps run in a fixed order, each feeding the next:
//!
//! ```text
//! package total   = base price + season adjustment (or override)
//! guest surcharge = max(0, guests - minimum) × tier rate
//! services        = Σ line subtotals
//! subtotal base   = package total + guest surcharge + services
//! after discount  = subtotal base - discount        (never below zero)
//! tax, fee        = percent of after discount, each rounded to cents
//! total           = after discount + tax + fee, rounded to cents
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use venuebook_core::{DomainError, Percent, round_money};

use crate::catalog::{ChargeMode, Package, Season, SeasonTier};

/// Named pricing failures; `code()` is the stable rule identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("discount must not be negative (got {0})")]
    NegativeDiscount(Decimal),

    #[error("unit price must not be negative (got {0})")]
    NegativeUnitPrice(Decimal),

    #[error("discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Decimal, subtotal: Decimal },

    #[error("total would be negative ({0})")]
    NegativeTotal(Decimal),

    #[error("no season configured for {0}")]
    NoSeasonForDate(NaiveDate),
}

impl PricingError {
    pub fn code(&self) -> &'static str {
        match self {
            PricingError::NegativeDiscount(_) => "negative_discount",
            PricingError::NegativeUnitPrice(_) => "negative_unit_price",
            PricingError::DiscountExceedsSubtotal { .. } => "discount_exceeds_subtotal",
            PricingError::NegativeTotal(_) => "negative_total",
            PricingError::NoSeasonForDate(_) => "no_season_for_date",
        }
    }
}

impl From<PricingError> for DomainError {
    fn from(value: PricingError) -> Self {
        DomainError::validation(value.code(), value.to_string())
    }
}

/// Tax and service-fee percentages, applied to the discounted subtotal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxConfig {
    pub tax: Percent,
    pub service_fee: Percent,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            tax: Percent::new(7),
            service_fee: Percent::new(18),
        }
    }
}

/// One add-on line as priced by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub mode: ChargeMode,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl ServiceLine {
    pub fn subtotal(&self, guest_count: u32) -> Decimal {
        let qty = Decimal::from(self.quantity);
        match self.mode {
            ChargeMode::Flat | ChargeMode::PerUnit => self.unit_price * qty,
            ChargeMode::PerAttendee => self.unit_price * Decimal::from(guest_count) * qty,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedServiceLine {
    pub line: ServiceLine,
    pub subtotal: Decimal,
}

/// Everything the engine needs, decoupled from catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInput {
    pub base_price: Decimal,
    pub minimum_guests: u32,
    pub season_tier: SeasonTier,
    pub season_adjustment: Decimal,
    /// Operator-supplied replacement for the season's adjustment.
    pub season_adjustment_override: Option<Decimal>,
    pub services: Vec<ServiceLine>,
    pub guest_count: u32,
    pub discount: Decimal,
    pub tax: TaxConfig,
}

impl PricingInput {
    pub fn new(package: &Package, season: &Season, guest_count: u32) -> Self {
        Self {
            base_price: package.base_price,
            minimum_guests: package.minimum_guests,
            season_tier: season.tier,
            season_adjustment: season.price_adjustment,
            season_adjustment_override: None,
            services: Vec::new(),
            guest_count,
            discount: Decimal::ZERO,
            tax: TaxConfig::default(),
        }
    }

    pub fn with_services(mut self, services: Vec<ServiceLine>) -> Self {
        self.services = services;
        self
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_season_adjustment_override(mut self, adjustment: Option<Decimal>) -> Self {
        self.season_adjustment_override = adjustment;
        self
    }

    pub fn with_tax(mut self, tax: TaxConfig) -> Self {
        self.tax = tax;
        self
    }
}

/// Itemized result; every intermediate value is kept for display and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub base_price: Decimal,
    pub season_adjustment: Decimal,
    pub package_total: Decimal,
    pub guest_count: u32,
    pub minimum_guests: u32,
    pub extra_guests: u32,
    pub per_guest_rate: Decimal,
    pub guest_surcharge: Decimal,
    pub service_lines: Vec<PricedServiceLine>,
    pub services_subtotal: Decimal,
    pub subtotal_base: Decimal,
    pub discount: Decimal,
    pub subtotal_after_discount: Decimal,
    pub tax_percent: Percent,
    pub tax: Decimal,
    pub service_fee_percent: Percent,
    pub service_fee: Decimal,
    pub total: Decimal,
}

pub fn compute_total(input: &PricingInput) -> Result<Breakdown, PricingError> {
    if input.discount < Decimal::ZERO {
        return Err(PricingError::NegativeDiscount(input.discount));
    }
    if let Some(bad) = input.services.iter().find(|l| l.unit_price < Decimal::ZERO) {
        return Err(PricingError::NegativeUnitPrice(bad.unit_price));
    }

    let season_adjustment = input
        .season_adjustment_override
        .unwrap_or(input.season_adjustment);
    let package_total = input.base_price + season_adjustment;

    let extra_guests = input.guest_count.saturating_sub(input.minimum_guests);
    let per_guest_rate = input.season_tier.per_guest_rate();
    let guest_surcharge = Decimal::from(extra_guests) * per_guest_rate;

    let service_lines: Vec<PricedServiceLine> = input
        .services
        .iter()
        .map(|line| PricedServiceLine {
            line: *line,
            subtotal: line.subtotal(input.guest_count),
        })
        .collect();
    let services_subtotal: Decimal = service_lines.iter().map(|l| l.subtotal).sum();

    let subtotal_base = package_total + guest_surcharge + services_subtotal;
    if subtotal_base < Decimal::ZERO {
        return Err(PricingError::NegativeTotal(round_money(subtotal_base)));
    }
    if input.discount > subtotal_base {
        return Err(PricingError::DiscountExceedsSubtotal {
            discount: input.discount,
            subtotal: subtotal_base,
        });
    }
    let subtotal_after_discount = subtotal_base - input.discount;

    let tax = input.tax.tax.rounded_of(subtotal_after_discount);
    let service_fee = input.tax.service_fee.rounded_of(subtotal_after_discount);
    let total = round_money(subtotal_after_discount + tax + service_fee);

    Ok(Breakdown {
        base_price: input.base_price,
        season_adjustment,
        package_total,
        guest_count: input.guest_count,
        minimum_guests: input.minimum_guests,
        extra_guests,
        per_guest_rate,
        guest_surcharge,
        service_lines,
        services_subtotal,
        subtotal_base,
        discount: input.discount,
        subtotal_after_discount,
        tax_percent: input.tax.tax,
        tax,
        service_fee_percent: input.tax.service_fee,
        service_fee,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn high_season_input(guests: u32) -> PricingInput {
        PricingInput {
            base_price: d(1000),
            minimum_guests: 50,
            season_tier: SeasonTier::High,
            season_adjustment: d(200),
            season_adjustment_override: None,
            services: Vec::new(),
            guest_count: guests,
            discount: Decimal::ZERO,
            tax: TaxConfig::default(),
        }
    }

    #[test]
    fn high_season_eighty_guests_totals_4500() {
        let b = compute_total(&high_season_input(80)).unwrap();
        assert_eq!(b.package_total, d(1200));
        assert_eq!(b.extra_guests, 30);
        assert_eq!(b.guest_surcharge, d(2400));
        assert_eq!(b.subtotal_after_discount, d(3600));
        assert_eq!(b.tax, d(252));
        assert_eq!(b.service_fee, d(648));
        assert_eq!(b.total, d(4500));
    }

    #[test]
    fn discount_above_subtotal_is_rejected() {
        let input = high_season_input(80).with_discount(d(3700));
        let err = compute_total(&input).unwrap_err();
        assert_eq!(err.code(), "discount_exceeds_subtotal");
        let domain: DomainError = err.into();
        assert_eq!(domain.rules(), vec!["discount_exceeds_subtotal"]);
    }

    #[test]
    fn discount_equal_to_subtotal_yields_zero() {
        let b = compute_total(&high_season_input(80).with_discount(d(3600))).unwrap();
        assert!(b.subtotal_after_discount.is_zero());
        assert!(b.tax.is_zero());
        assert!(b.service_fee.is_zero());
        assert!(b.total.is_zero());
    }

    #[test]
    fn guests_at_or_below_minimum_have_no_surcharge() {
        for guests in [1, 49, 50] {
            let b = compute_total(&high_season_input(guests)).unwrap();
            assert_eq!(b.extra_guests, 0);
            assert!(b.guest_surcharge.is_zero());
        }
    }

    #[test]
    fn service_modes_price_differently() {
        let services = vec![
            ServiceLine { mode: ChargeMode::Flat, unit_price: d(300), quantity: 1 },
            ServiceLine { mode: ChargeMode::PerUnit, unit_price: d(15), quantity: 4 },
            ServiceLine { mode: ChargeMode::PerAttendee, unit_price: d(5), quantity: 2 },
        ];
        let b = compute_total(&high_season_input(60).with_services(services)).unwrap();
        let subtotals: Vec<Decimal> = b.service_lines.iter().map(|l| l.subtotal).collect();
        assert_eq!(subtotals, vec![d(300), d(60), d(600)]);
        assert_eq!(b.services_subtotal, d(960));
    }

    #[test]
    fn override_replaces_season_adjustment_and_low_tier_uses_lower_rate() {
        let mut input = high_season_input(51).with_season_adjustment_override(Some(d(-150)));
        input.season_tier = SeasonTier::Low;
        let b = compute_total(&input).unwrap();
        assert_eq!(b.season_adjustment, d(-150));
        assert_eq!(b.package_total, d(850));
        assert_eq!(b.guest_surcharge, d(52));
    }

    #[test]
    fn tax_and_fee_round_independently() {
        let mut input = high_season_input(0);
        input.base_price = "100.05".parse().unwrap();
        input.season_adjustment = Decimal::ZERO;
        let b = compute_total(&input).unwrap();
        // 7.0035 -> 7.00, 18.009 -> 18.01
        assert_eq!(b.tax, "7.00".parse::<Decimal>().unwrap());
        assert_eq!(b.service_fee, "18.01".parse::<Decimal>().unwrap());
        assert_eq!(b.total, "125.06".parse::<Decimal>().unwrap());
    }

    #[test]
    fn negative_season_adjustment_below_zero_is_negative_total() {
        let input = high_season_input(10).with_season_adjustment_override(Some(d(-1500)));
        assert_eq!(compute_total(&input).unwrap_err().code(), "negative_total");
    }

    #[test]
    fn negative_discount_is_rejected() {
        let err = compute_total(&high_season_input(80).with_discount(d(-1))).unwrap_err();
        assert_eq!(err.code(), "negative_discount");
    }

    fn arb_input() -> impl Strategy<Value = PricingInput> {
        (
            0i64..5_000,
            0u32..200,
            prop_oneof![Just(SeasonTier::Low), Just(SeasonTier::Mid), Just(SeasonTier::High)],
            -500i64..500,
            prop::collection::vec((0u8..3, 0i64..1_000, 1u32..5), 0..4),
            1u32..400,
            0i64..2_000,
        )
            .prop_map(|(base, min, tier, adj, lines, guests, discount)| PricingInput {
                base_price: Decimal::from(base + 500),
                minimum_guests: min,
                season_tier: tier,
                season_adjustment: Decimal::from(adj),
                season_adjustment_override: None,
                services: lines
                    .into_iter()
                    .map(|(m, p, q)| ServiceLine {
                        mode: match m {
                            0 => ChargeMode::Flat,
                            1 => ChargeMode::PerUnit,
                            _ => ChargeMode::PerAttendee,
                        },
                        unit_price: Decimal::new(p * 100 + 25, 2),
                        quantity: q,
                    })
                    .collect(),
                guest_count: guests,
                discount: Decimal::from(discount),
                tax: TaxConfig::default(),
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Identical inputs produce identical breakdowns.
        #[test]
        fn pricing_is_deterministic(input in arb_input()) {
            prop_assert_eq!(compute_total(&input), compute_total(&input.clone()));
        }

        /// A successful computation never yields a negative total, and a
        /// discount above the base subtotal always fails.
        #[test]
        fn total_is_never_negative(input in arb_input(), extra in 1i64..10_000) {
            match compute_total(&input) {
                Ok(b) => {
                    prop_assert!(b.total >= Decimal::ZERO);
                    let over = input.clone().with_discount(b.subtotal_base + Decimal::from(extra));
                    prop_assert_eq!(
                        compute_total(&over).unwrap_err().code(),
                        "discount_exceeds_subtotal"
                    );
                }
                Err(e) => prop_assert!(
                    e.code() == "discount_exceeds_subtotal" || e.code() == "negative_total"
                ),
            }
        }

        /// Adding guests never lowers the total.
        #[test]
        fn more_guests_never_cost_less(input in arb_input(), more in 1u32..100) {
            if let Ok(before) = compute_total(&input) {
                let mut bigger = input.clone();
                bigger.guest_count += more;
                let after = compute_total(&bigger).unwrap();
                prop_assert!(after.total >= before.total);
            }
        }
    }
}
