//! Reference data: packages, seasons, add-on services and salons.
//!
//! The catalog is read-mostly. The engine copies prices out of it into offer
//! and contract lines and never mutates a definition.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{DomainError, DomainResult, Entity};

macro_rules! catalog_id {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub u32);

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}#{}", $name, self.0)
            }
        }
    };
}

catalog_id!(PackageId, "package");
catalog_id!(SeasonId, "season");
catalog_id!(ServiceId, "service");
catalog_id!(SalonId, "salon");

/// A service bundled into a package (already priced into the package).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedService {
    pub service_id: ServiceId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub base_price: Decimal,
    /// Guests covered by the base price.
    pub minimum_guests: u32,
    pub duration_hours: u32,
    pub included_services: Vec<IncludedService>,
}

/// Salon-specific override of a package's price and guest minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonPackagePrice {
    pub salon_id: SalonId,
    pub package_id: PackageId,
    pub base_price: Option<Decimal>,
    pub minimum_guests: Option<u32>,
    pub available: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonTier {
    Low,
    Mid,
    High,
}

impl SeasonTier {
    /// Price of each guest above the package minimum.
    pub fn per_guest_rate(self) -> Decimal {
        match self {
            SeasonTier::High => Decimal::from(80),
            SeasonTier::Low | SeasonTier::Mid => Decimal::from(52),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub name: String,
    pub tier: SeasonTier,
    /// Calendar months (1-12) this season covers.
    pub months: Vec<u32>,
    /// Added to the package base price; may be negative.
    pub price_adjustment: Decimal,
}

impl Season {
    pub fn covers_month(&self, month: u32) -> bool {
        self.months.contains(&month)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    Flat,
    PerUnit,
    PerAttendee,
}

/// An add-on service definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub charge_mode: ChargeMode,
    pub base_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salon {
    pub id: SalonId,
    pub name: String,
    /// Add-ons this venue does not allow.
    pub excluded_services: Vec<ServiceId>,
}

impl Entity for Package {
    type Id = PackageId;
    fn id(&self) -> PackageId {
        self.id
    }
}

impl Entity for Season {
    type Id = SeasonId;
    fn id(&self) -> SeasonId {
        self.id
    }
}

impl Entity for Service {
    type Id = ServiceId;
    fn id(&self) -> ServiceId {
        self.id
    }
}

impl Entity for Salon {
    type Id = SalonId;
    fn id(&self) -> SalonId {
        self.id
    }
}

fn index<E: Entity>(items: Vec<E>) -> HashMap<E::Id, E> {
    items.into_iter().map(|e| (e.id(), e)).collect()
}

fn lookup<E: Entity>(map: &HashMap<E::Id, E>, id: E::Id) -> DomainResult<&E>
where
    E::Id: core::fmt::Display,
{
    map.get(&id).ok_or_else(|| DomainError::not_found(id.to_string()))
}

/// In-memory reference data, indexed by identifier.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: HashMap<PackageId, Package>,
    /// Kept in declaration order; the first season covering a month wins.
    seasons: Vec<Season>,
    services: HashMap<ServiceId, Service>,
    salons: HashMap<SalonId, Salon>,
    salon_prices: HashMap<(SalonId, PackageId), SalonPackagePrice>,
}

impl Catalog {
    pub fn new(
        packages: Vec<Package>,
        seasons: Vec<Season>,
        services: Vec<Service>,
        salons: Vec<Salon>,
        salon_prices: Vec<SalonPackagePrice>,
    ) -> Self {
        Self {
            packages: index(packages),
            seasons,
            services: index(services),
            salons: index(salons),
            salon_prices: salon_prices
                .into_iter()
                .map(|p| ((p.salon_id, p.package_id), p))
                .collect(),
        }
    }

    pub fn package(&self, id: PackageId) -> DomainResult<&Package> {
        lookup(&self.packages, id)
    }

    pub fn service(&self, id: ServiceId) -> DomainResult<&Service> {
        lookup(&self.services, id)
    }

    pub fn salon(&self, id: SalonId) -> DomainResult<&Salon> {
        lookup(&self.salons, id)
    }

    pub fn season(&self, id: SeasonId) -> DomainResult<&Season> {
        self.seasons
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| DomainError::not_found(id.to_string()))
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    /// The package as sold in `salon`, with any salon override applied.
    pub fn effective_package(&self, id: PackageId, salon: Option<SalonId>) -> DomainResult<Package> {
        let mut package = self.package(id)?.clone();
        let Some(salon_id) = salon else {
            return Ok(package);
        };
        self.salon(salon_id)?;

        if let Some(over) = self.salon_prices.get(&(salon_id, id)) {
            if !over.available {
                return Err(DomainError::validation(
                    "package_unavailable_in_salon",
                    format!("{} is not offered in {salon_id}", package.name),
                ));
            }
            if let Some(price) = over.base_price {
                package.base_price = price;
            }
            if let Some(min) = over.minimum_guests {
                package.minimum_guests = min;
            }
        }
        Ok(package)
    }

    /// Reject add-ons the salon excludes. Every offending service is reported.
    pub fn ensure_services_allowed(&self, salon: Option<SalonId>, services: &[ServiceId]) -> DomainResult<()> {
        let Some(salon_id) = salon else {
            return Ok(());
        };
        let salon = self.salon(salon_id)?;

        let violations = services
            .iter()
            .filter(|id| salon.excluded_services.contains(id))
            .map(|id| {
                venuebook_core::Violation::new(
                    "service_not_allowed_in_salon",
                    format!("{id} is not allowed in {}", salon.name),
                )
            })
            .collect();
        DomainError::check(violations)
    }
}
