//! Walks an offer through issuance, payments and a void on in-memory
//! infrastructure, logging each step.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use venuebook_contracts::{CardDetails, PaymentMethod, PaymentPlan};
use venuebook_core::{ClientId, TenantId, UserId};
use venuebook_events::{EventEnvelope, InMemoryEventBus};
use venuebook_infra::collaborators::{InMemoryCalendar, InMemoryDocuments};
use venuebook_infra::event_store::InMemoryEventStore;
use venuebook_infra::services::{DepositRequest, IssueRequest, PaymentRequest, VoidRequest};
use venuebook_infra::{EngineConfig, VenueEngine};
use venuebook_offers::OfferTerms;
use venuebook_pricing::{
    Catalog, ChargeMode, IncludedService, Package, PackageId, Salon, SalonId, Season, SeasonId, SeasonTier, Service,
    ServiceId,
};

type Engine = VenueEngine<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn catalog() -> Catalog {
    Catalog::new(
        vec![Package {
            id: PackageId(1),
            name: "Diamond".into(),
            base_price: Decimal::from(1000),
            minimum_guests: 50,
            duration_hours: 5,
            included_services: vec![IncludedService { service_id: ServiceId(10), quantity: 1 }],
        }],
        vec![
            Season {
                id: SeasonId(1),
                name: "Low".into(),
                tier: SeasonTier::Low,
                months: vec![1, 2, 8, 9],
                price_adjustment: Decimal::from(-100),
            },
            Season {
                id: SeasonId(2),
                name: "High".into(),
                tier: SeasonTier::High,
                months: vec![3, 4, 5, 6, 7, 10, 11, 12],
                price_adjustment: Decimal::from(200),
            },
        ],
        vec![
            Service {
                id: ServiceId(10),
                name: "Photo booth".into(),
                charge_mode: ChargeMode::Flat,
                base_price: Decimal::from(350),
            },
            Service {
                id: ServiceId(20),
                name: "Cold sparklers".into(),
                charge_mode: ChargeMode::PerUnit,
                base_price: Decimal::from(25),
            },
        ],
        vec![Salon {
            id: SalonId(1),
            name: "Diamond Hall".into(),
            excluded_services: vec![ServiceId(20)],
        }],
        vec![],
    )
}

fn at(day: u32, hour: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2027, 1, day, hour, 0, 0)
        .single()
        .context("invalid demo timestamp")
}

fn terms(salesperson_id: UserId, discount: Decimal) -> anyhow::Result<OfferTerms> {
    Ok(OfferTerms {
        client_id: ClientId::new(),
        salesperson_id,
        package_id: PackageId(1),
        salon_id: Some(SalonId(1)),
        event_date: NaiveDate::from_ymd_opt(2027, 6, 19).context("invalid event date")?,
        start_time: NaiveTime::from_hms_opt(19, 0, 0).context("invalid start time")?,
        end_time: NaiveTime::from_hms_opt(23, 0, 0).context("invalid end time")?,
        guest_count: 80,
        services: vec![],
        discount,
        season_adjustment_override: None,
        notes: Some("Wedding reception".into()),
    })
}

fn main() -> anyhow::Result<()> {
    venuebook_observability::init();

    let engine: Engine = VenueEngine::new(
        InMemoryEventStore::new(),
        InMemoryEventBus::new(),
        EngineConfig::from_env(),
        Arc::new(catalog()),
        Arc::new(InMemoryDocuments::new()),
        Arc::new(InMemoryCalendar::new()),
    );
    let tenant_id = TenantId::new();
    let salesperson_id = UserId::new();

    // A discount larger than the subtotal never becomes an offer.
    match engine
        .offers()
        .create(tenant_id, terms(salesperson_id, Decimal::from(3700))?, at(4, 10)?)
    {
        Ok(offer) => tracing::warn!(code = %offer.code(), "oversized discount was accepted"),
        Err(err) => tracing::info!(rules = ?err.rules(), "oversized discount rejected"),
    }

    let offer = engine
        .offers()
        .create(tenant_id, terms(salesperson_id, Decimal::ZERO)?, at(5, 10)?)
        .context("create offer")?;
    if let Some(quote) = offer.quote() {
        let b = &quote.breakdown;
        tracing::info!(
            code = %offer.code(),
            season = %quote.season_name,
            guest_surcharge = %b.guest_surcharge,
            subtotal = %b.subtotal_after_discount,
            tax = %b.tax,
            service_fee = %b.service_fee,
            total = %b.total,
            "quote"
        );
    }
    engine
        .offers()
        .accept(tenant_id, offer.id_typed(), at(8, 10)?)
        .context("accept offer")?;

    let deposit = engine
        .ledger()
        .record_deposit(
            tenant_id,
            DepositRequest {
                salesperson_id,
                amount: Decimal::from(500),
                method: PaymentMethod::Cash,
                card: None,
                reference: None,
                notes: None,
                occurred_at: at(10, 15)?,
            },
        )
        .context("record deposit")?;

    let issued = engine
        .issuance()
        .issue(
            tenant_id,
            IssueRequest {
                offer_id: offer.id_typed(),
                plan: PaymentPlan::Financed { months: 4 },
                deposit_payment_id: deposit.id_typed(),
                occurred_at: at(11, 9)?,
            },
        )
        .context("issue contract")?;
    let contract_id = issued.contract.id_typed();
    tracing::info!(
        code = %issued.contract.code(),
        access_code = %issued.contract.access_code(),
        monthly_payment = %issued.contract.monthly_payment(),
        outstanding = %issued.contract.outstanding(),
        status = ?issued.contract.payment_status(),
        "contract ready"
    );

    let card = engine
        .ledger()
        .record_payment(
            tenant_id,
            PaymentRequest {
                contract_id,
                recorded_by: salesperson_id,
                amount: Decimal::from(1000),
                method: PaymentMethod::Card,
                card: Some(CardDetails {
                    card_type: "visa".into(),
                    last_four: Some("4242".into()),
                }),
                reference: None,
                notes: None,
                occurred_at: at(12, 11)?,
            },
        )
        .context("card payment")?;
    tracing::info!(
        total_charged = %card.payment.charge().total_charged,
        outstanding = %card.contract.outstanding(),
        "card payment"
    );

    let remainder = card.contract.outstanding();
    let settled = engine
        .ledger()
        .record_payment(
            tenant_id,
            PaymentRequest {
                contract_id,
                recorded_by: salesperson_id,
                amount: remainder,
                method: PaymentMethod::Transfer,
                card: None,
                reference: None,
                notes: None,
                occurred_at: at(14, 16)?,
            },
        )
        .context("settle balance")?;
    tracing::info!(
        status = ?settled.contract.payment_status(),
        commission_total = ?settled.commission.as_ref().map(|c| c.total),
        "balance settled"
    );

    let voided = engine
        .ledger()
        .void_payment(
            tenant_id,
            VoidRequest {
                payment_id: settled.payment.id_typed(),
                reason: "transfer returned".into(),
                occurred_at: at(15, 9)?,
            },
        )
        .context("void transfer")?;
    if let Some(contract) = &voided.contract {
        tracing::info!(
            outstanding = %contract.outstanding(),
            status = ?contract.payment_status(),
            "transfer voided"
        );
    }

    let summary = engine
        .issuance()
        .resolve_access_code(tenant_id, issued.contract.access_code(), at(20, 9)?.date_naive())
        .context("resolve access code")?;
    tracing::info!(code = %summary.code, outstanding = %summary.outstanding, "client view");

    for version in engine.versions().history(tenant_id, contract_id)? {
        tracing::info!(
            number = version.number,
            reason = %version.reason,
            outstanding = %version.snapshot.outstanding,
            "version"
        );
    }

    Ok(())
}
