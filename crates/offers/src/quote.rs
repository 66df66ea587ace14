//! Quoting: resolve catalog references for a set of offer terms and run the
//! pricing engine over them.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{ClientId, DomainError, DomainResult, UserId, Violation};
use venuebook_pricing::{
    Breakdown, Catalog, ChargeMode, PackageId, PricingInput, SalonId, SeasonId, ServiceId,
    ServiceLine, TaxConfig, compute_total, resolve_season,
};

/// An add-on chosen for an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub service_id: ServiceId,
    pub quantity: u32,
    /// Negotiated price replacing the catalog price for this line.
    pub unit_price_override: Option<Decimal>,
}

/// Caller-supplied terms of an offer (everything except the computed price).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub client_id: ClientId,
    pub salesperson_id: UserId,
    pub package_id: PackageId,
    pub salon_id: Option<SalonId>,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub guest_count: u32,
    pub services: Vec<ServiceSelection>,
    pub discount: Decimal,
    pub season_adjustment_override: Option<Decimal>,
    pub notes: Option<String>,
}

impl OfferTerms {
    /// Input checks that don't need the catalog. All failures are reported
    /// together.
    pub fn validate(&self, today: NaiveDate) -> DomainResult<()> {
        let mut violations = Vec::new();

        if self.guest_count < 1 {
            violations.push(Violation::new(
                "guest_count_min",
                "guest count must be at least 1",
            ));
        }
        if self.event_date <= today {
            violations.push(Violation::new(
                "event_date_not_future",
                format!("event date {} is not after {today}", self.event_date),
            ));
        }
        if self.end_time <= self.start_time {
            violations.push(Violation::new(
                "end_time_before_start",
                "end time must be after start time",
            ));
        }
        if self.services.iter().any(|s| s.quantity == 0) {
            violations.push(Violation::new(
                "service_quantity_min",
                "service quantity must be at least 1",
            ));
        }

        DomainError::check(violations)
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.services.iter().map(|s| s.service_id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedServiceLine {
    pub service_id: ServiceId,
    pub name: String,
    pub mode: ChargeMode,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Catalog price at quoting time, kept even when overridden.
    pub catalog_price: Decimal,
    pub subtotal: Decimal,
}

/// A service bundled with the package; priced into the package total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedServiceLine {
    pub service_id: ServiceId,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub package_id: PackageId,
    pub package_name: String,
    pub duration_hours: u32,
    pub season_id: SeasonId,
    pub season_name: String,
    pub included_services: Vec<IncludedServiceLine>,
    pub service_lines: Vec<QuotedServiceLine>,
    pub breakdown: Breakdown,
}

impl Quote {
    pub fn total(&self) -> Decimal {
        self.breakdown.total
    }
}

/// Price `terms` against the catalog.
///
/// Order: salon availability of the package, salon service exclusions,
/// season resolution, line pricing, then the engine.
pub fn quote(catalog: &Catalog, terms: &OfferTerms, tax: TaxConfig) -> DomainResult<Quote> {
    let package = catalog.effective_package(terms.package_id, terms.salon_id)?;
    catalog.ensure_services_allowed(terms.salon_id, &terms.service_ids())?;
    let season = resolve_season(terms.event_date, catalog.seasons())?;

    let included_services = package
        .included_services
        .iter()
        .map(|inc| {
            let service = catalog.service(inc.service_id)?;
            Ok(IncludedServiceLine {
                service_id: inc.service_id,
                name: service.name.clone(),
                quantity: inc.quantity,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    let mut lines = Vec::with_capacity(terms.services.len());
    let mut engine_lines = Vec::with_capacity(terms.services.len());
    for selection in &terms.services {
        let service = catalog.service(selection.service_id)?;
        let line = ServiceLine {
            mode: service.charge_mode,
            unit_price: selection.unit_price_override.unwrap_or(service.base_price),
            quantity: selection.quantity,
        };
        lines.push(QuotedServiceLine {
            service_id: service.id,
            name: service.name.clone(),
            mode: line.mode,
            quantity: line.quantity,
            unit_price: line.unit_price,
            catalog_price: service.base_price,
            subtotal: line.subtotal(terms.guest_count),
        });
        engine_lines.push(line);
    }

    let input = PricingInput::new(&package, season, terms.guest_count)
        .with_services(engine_lines)
        .with_discount(terms.discount)
        .with_season_adjustment_override(terms.season_adjustment_override)
        .with_tax(tax);
    let breakdown = compute_total(&input)?;

    Ok(Quote {
        package_id: package.id,
        package_name: package.name,
        duration_hours: package.duration_hours,
        season_id: season.id,
        season_name: season.name.clone(),
        included_services,
        service_lines: lines,
        breakdown,
    })
}
