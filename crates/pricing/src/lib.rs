//! Venue pricing: reference-data catalog, season resolution, the pricing
//! engine and financing schedules.
//!
//! Everything here is a pure function of its inputs (no IO, no clocks).

pub mod catalog;
pub mod engine;
pub mod financing;
pub mod season;

pub use catalog::{
    Catalog, ChargeMode, IncludedService, Package, PackageId, Salon, SalonId, SalonPackagePrice,
    Season, SeasonId, SeasonTier, Service, ServiceId,
};
pub use engine::{
    Breakdown, PricedServiceLine, PricingError, PricingInput, ServiceLine, TaxConfig,
    compute_total,
};
pub use financing::{FinancingSchedule, ScheduledPayment, ScheduledPaymentKind, even_installment};
pub use season::resolve_season;
