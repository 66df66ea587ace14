use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use venuebook_contracts::{Contract, PaymentMethod, PaymentPlan};
use venuebook_core::{ClientId, TenantId, UserId};
use venuebook_events::{EventEnvelope, InMemoryEventBus};
use venuebook_infra::collaborators::{InMemoryCalendar, InMemoryDocuments};
use venuebook_infra::event_store::InMemoryEventStore;
use venuebook_infra::services::{DepositRequest, IssueRequest, PaymentRequest};
use venuebook_infra::{EngineConfig, VenueEngine};
use venuebook_offers::{OfferTerms, quote};
use venuebook_pricing::{Catalog, Package, PackageId, Season, SeasonId, SeasonTier, TaxConfig};

type Engine = VenueEngine<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn catalog() -> Catalog {
    Catalog::new(
        vec![Package {
            id: PackageId(1),
            name: "Diamond".into(),
            base_price: Decimal::from(1000),
            minimum_guests: 50,
            duration_hours: 5,
            included_services: vec![],
        }],
        vec![Season {
            id: SeasonId(1),
            name: "All year".into(),
            tier: SeasonTier::High,
            months: (1..=12).collect(),
            price_adjustment: Decimal::from(200),
        }],
        vec![],
        vec![],
        vec![],
    )
}

fn engine() -> Engine {
    VenueEngine::new(
        InMemoryEventStore::new(),
        InMemoryEventBus::new(),
        EngineConfig::default(),
        Arc::new(catalog()),
        Arc::new(InMemoryDocuments::new()),
        Arc::new(InMemoryCalendar::new()),
    )
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 1, 4, 9, 0, 0).unwrap()
}

fn terms(salesperson_id: UserId) -> OfferTerms {
    OfferTerms {
        client_id: ClientId::new(),
        salesperson_id,
        package_id: PackageId(1),
        salon_id: None,
        event_date: NaiveDate::from_ymd_opt(2027, 9, 18).unwrap(),
        start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        guest_count: 180,
        services: vec![],
        discount: Decimal::ZERO,
        season_adjustment_override: None,
        notes: None,
    }
}

/// Create, accept and issue one contract; returns it.
fn issue_contract(engine: &Engine, tenant_id: TenantId) -> Contract {
    let salesperson_id = UserId::new();
    let offer = engine.offers().create(tenant_id, terms(salesperson_id), start()).unwrap();
    engine.offers().accept(tenant_id, offer.id_typed(), start()).unwrap();
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
                occurred_at: start(),
            },
        )
        .unwrap();
    engine
        .issuance()
        .issue(
            tenant_id,
            IssueRequest {
                offer_id: offer.id_typed(),
                plan: PaymentPlan::Installments { months: 6 },
                deposit_payment_id: deposit.id_typed(),
                occurred_at: start(),
            },
        )
        .unwrap()
        .contract
}

fn pay(engine: &Engine, tenant_id: TenantId, contract: &Contract, n: i64) {
    engine
        .ledger()
        .record_payment(
            tenant_id,
            PaymentRequest {
                contract_id: contract.id_typed(),
                recorded_by: UserId::new(),
                amount: Decimal::new(1, 2),
                method: PaymentMethod::Transfer,
                card: None,
                reference: None,
                notes: None,
                occurred_at: start() + Duration::hours(n),
            },
        )
        .unwrap();
}

fn bench_quote(c: &mut Criterion) {
    let catalog = catalog();
    let terms = terms(UserId::new());
    c.bench_function("quote_offer", |b| {
        b.iter(|| quote(black_box(&catalog), black_box(&terms), TaxConfig::default()).unwrap())
    });
}

fn bench_issuance_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("issuance_latency");
    group.sample_size(200);

    group.bench_function("offer_to_contract", |b| {
        let engine = engine();
        let tenant_id = TenantId::new();
        b.iter(|| black_box(issue_contract(&engine, tenant_id)))
    });

    group.finish();
}

fn bench_payment_with_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("payment_with_history");

    for history in [0i64, 50, 200].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(history), history, |b, &history| {
            let engine = engine();
            let tenant_id = TenantId::new();
            let contract = issue_contract(&engine, tenant_id);
            for n in 0..history {
                pay(&engine, tenant_id, &contract, n);
            }
            let mut n = history;
            b.iter(|| {
                n += 1;
                pay(&engine, tenant_id, &contract, n);
            })
        });
    }

    group.finish();
}

fn bench_contract_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("contract_replay");

    for payments in [10i64, 100, 400].iter() {
        let engine = engine();
        let tenant_id = TenantId::new();
        let contract = issue_contract(&engine, tenant_id);
        for n in 0..*payments {
            pay(&engine, tenant_id, &contract, n);
        }

        group.throughput(Throughput::Elements(*payments as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payments), payments, |b, _| {
            b.iter(|| black_box(engine.contract(tenant_id, contract.id_typed()).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_quote,
    bench_issuance_latency,
    bench_payment_with_history,
    bench_contract_replay
);
criterion_main!(benches);
