//! Integration tests for the full pipeline.
//!
//! Tests: Service → Transaction → EventStore → EventBus → ContractDirectory
//!
//! Verifies:
//! - Offers, contracts and payments move through their lifecycles
//! - Multi-aggregate operations commit atomically or not at all
//! - Optimistic concurrency conflicts are detected
//! - Collaborator failures never undo a committed change

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use serde_json::{Value as JsonValue, json};

    use venuebook_codes::{CodeKind, is_access_code};
    use venuebook_contracts::{
        ApplyPayment, CardDetails, ChangeDetail, CommissionHalf, ContractCommand, ContractState, PaymentId,
        PaymentMethod, PaymentPlan, PaymentStatus,
    };
    use venuebook_core::{AggregateId, ClientId, TenantId, UserId};
    use venuebook_events::{EventEnvelope, InMemoryEventBus};
    use venuebook_offers::{Offer, OfferId, OfferStatus, OfferTerms};
    use venuebook_pricing::{
        Catalog, ChargeMode, IncludedService, Package, PackageId, Season, SeasonId, SeasonTier, Service, ServiceId,
    };

    use crate::collaborators::{
        CalendarClient, CalendarEventDetails, DocumentGenerator, DocumentRequest, InMemoryCalendar, InMemoryDocuments,
    };
    use crate::command_dispatcher::DispatchError;
    use crate::config::EngineConfig;
    use crate::event_store::InMemoryEventStore;
    use crate::sequence::{SequenceCounter, SequenceCounterId};
    use crate::services::{DepositRequest, IssueRequest, IssuedContract, PaymentRequest, VenueEngine, VoidRequest};

    type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
    type Engine = VenueEngine<Arc<InMemoryEventStore>, Bus>;

    struct Harness {
        engine: Engine,
        store: Arc<InMemoryEventStore>,
        documents: Arc<InMemoryDocuments>,
        calendar: Arc<InMemoryCalendar>,
        tenant_id: TenantId,
        salesperson_id: UserId,
    }

    struct BrokenDocuments;

    impl DocumentGenerator for BrokenDocuments {
        fn generate(&self, _request: DocumentRequest<'_>) -> anyhow::Result<Vec<u8>> {
            Err(anyhow::anyhow!("renderer unavailable"))
        }
    }

    struct BrokenCalendar;

    impl CalendarClient for BrokenCalendar {
        fn create_event(&self, _details: &CalendarEventDetails) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("calendar unavailable"))
        }
    }

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, day, hour, 0, 0).unwrap()
    }

    fn event_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2027, 6, 19).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::new(
            vec![Package {
                id: PackageId(1),
                name: "Diamond".into(),
                base_price: d(1000),
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
                    price_adjustment: d(-100),
                },
                Season {
                    id: SeasonId(2),
                    name: "High".into(),
                    tier: SeasonTier::High,
                    months: vec![3, 4, 5, 6, 7, 10, 11, 12],
                    price_adjustment: d(200),
                },
            ],
            vec![Service {
                id: ServiceId(10),
                name: "Photo booth".into(),
                charge_mode: ChargeMode::Flat,
                base_price: d(350),
            }],
            vec![],
            vec![],
        )
    }

    fn setup() -> Harness {
        let documents = Arc::new(InMemoryDocuments::new());
        let calendar = Arc::new(InMemoryCalendar::new());
        let store = Arc::new(InMemoryEventStore::new());
        let engine = VenueEngine::new(
            store.clone(),
            Bus::new(),
            EngineConfig::default(),
            Arc::new(catalog()),
            documents.clone(),
            calendar.clone(),
        );
        Harness {
            engine,
            store,
            documents,
            calendar,
            tenant_id: TenantId::new(),
            salesperson_id: UserId::new(),
        }
    }

    fn setup_with_broken_collaborators() -> Harness {
        let mut h = setup();
        h.engine = VenueEngine::new(
            h.store.clone(),
            Bus::new(),
            EngineConfig::default(),
            Arc::new(catalog()),
            Arc::new(BrokenDocuments),
            Arc::new(BrokenCalendar),
        );
        h
    }

    impl Harness {
        fn terms(&self) -> OfferTerms {
            OfferTerms {
                client_id: ClientId::new(),
                salesperson_id: self.salesperson_id,
                package_id: PackageId(1),
                salon_id: None,
                event_date: event_date(),
                start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
                guest_count: 80,
                services: Vec::new(),
                discount: Decimal::ZERO,
                season_adjustment_override: None,
                notes: None,
            }
        }

        fn accepted_offer(&self) -> Offer {
            let offer = self.engine.offers().create(self.tenant_id, self.terms(), at(5, 10)).unwrap();
            self.engine
                .offers()
                .accept(self.tenant_id, offer.id_typed(), at(8, 10))
                .unwrap()
        }

        fn deposit(&self, amount: i64) -> PaymentId {
            self.engine
                .ledger()
                .record_deposit(
                    self.tenant_id,
                    DepositRequest {
                        salesperson_id: self.salesperson_id,
                        amount: d(amount),
                        method: PaymentMethod::Cash,
                        card: None,
                        reference: None,
                        notes: None,
                        occurred_at: at(10, 15),
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn issue(&self, offer_id: OfferId, deposit: PaymentId) -> Result<IssuedContract, DispatchError> {
            self.engine.issuance().issue(
                self.tenant_id,
                IssueRequest {
                    offer_id,
                    plan: PaymentPlan::SinglePayment,
                    deposit_payment_id: deposit,
                    occurred_at: at(11, 9),
                },
            )
        }

        fn issued(&self) -> IssuedContract {
            let offer = self.accepted_offer();
            let deposit = self.deposit(500);
            self.issue(offer.id_typed(), deposit).unwrap()
        }

        fn pay(
            &self,
            contract: &IssuedContract,
            amount: i64,
            method: PaymentMethod,
            day: u32,
        ) -> Result<crate::services::PaymentReceipt, DispatchError> {
            self.pay_exact(contract, d(amount), method, day)
        }

        fn pay_exact(
            &self,
            contract: &IssuedContract,
            amount: Decimal,
            method: PaymentMethod,
            day: u32,
        ) -> Result<crate::services::PaymentReceipt, DispatchError> {
            let card = (method == PaymentMethod::Card).then(|| CardDetails {
                card_type: "visa".into(),
                last_four: Some("4242".into()),
            });
            self.engine.ledger().record_payment(
                self.tenant_id,
                PaymentRequest {
                    contract_id: contract.contract.id_typed(),
                    recorded_by: self.salesperson_id,
                    amount,
                    method,
                    card,
                    reference: None,
                    notes: None,
                    occurred_at: at(day, 12),
                },
            )
        }
    }

    #[test]
    fn offers_are_priced_and_numbered_in_sequence() {
        let h = setup();

        let first = h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();
        let second = h.engine.offers().create(h.tenant_id, h.terms(), at(6, 10)).unwrap();

        assert_eq!(first.code(), "OF-2027-01-0001");
        assert_eq!(second.code(), "OF-2027-01-0002");
        assert_eq!(first.status(), OfferStatus::Pending);
        assert_eq!(first.quote().unwrap().total(), d(4500));
    }

    #[test]
    fn sequences_are_counted_per_tenant() {
        let h = setup();
        let other = TenantId::new();

        h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();
        let theirs = h.engine.offers().create(other, h.terms(), at(5, 11)).unwrap();

        assert_eq!(theirs.code(), "OF-2027-01-0001");
    }

    #[test]
    fn discount_beyond_subtotal_is_rejected() {
        let h = setup();
        let mut terms = h.terms();
        terms.discount = d(3700);

        let err = h.engine.offers().create(h.tenant_id, terms, at(5, 10)).unwrap_err();

        assert_eq!(err.rules(), vec!["discount_exceeds_subtotal"]);
        assert!(h.store.all_events().unwrap().is_empty());
    }

    #[test]
    fn updating_reprices_a_pending_offer() {
        let h = setup();
        let offer = h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();
        let mut terms = h.terms();
        terms.discount = d(600);

        let updated = h
            .engine
            .offers()
            .update(h.tenant_id, offer.id_typed(), terms, at(6, 10))
            .unwrap();

        assert_eq!(updated.code(), offer.code());
        assert!(updated.quote().unwrap().total() < d(4500));
    }

    #[test]
    fn a_rejected_offer_cannot_be_accepted() {
        let h = setup();
        let offer = h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();

        let rejected = h
            .engine
            .offers()
            .reject(h.tenant_id, offer.id_typed(), Some("venue too small".into()), at(6, 10))
            .unwrap();
        assert_eq!(rejected.status(), OfferStatus::Rejected);
        assert_eq!(rejected.reject_reason(), Some("venue too small"));

        let err = h.engine.offers().accept(h.tenant_id, offer.id_typed(), at(7, 10)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn deposit_issues_a_pending_contract() {
        let h = setup();

        let issued = h.issued();
        let contract = &issued.contract;

        assert_eq!(contract.code(), "CONT-2027-01-0001");
        assert_eq!(contract.total(), d(4500));
        assert_eq!(contract.total_paid(), d(500));
        assert_eq!(contract.outstanding(), d(4000));
        assert_eq!(contract.payment_status(), PaymentStatus::Pending);
        assert!(is_access_code(contract.access_code()));
        assert_eq!(contract.access_code_expires_on(), Some(event_date() + Duration::days(30)));

        assert_eq!(issued.calendar_event_id.as_deref(), Some("cal-1"));
        assert_eq!(contract.calendar_event_id(), Some("cal-1"));
        assert_eq!(h.calendar.events().len(), 1);

        let version = issued.version.expect("first version recorded");
        assert_eq!(version.number, 1);
        assert!(matches!(version.change, ChangeDetail::Issued { .. }));
        assert_eq!(h.documents.rendered().len(), 1);

        let offer = h.engine.offer(h.tenant_id, contract.offer_id().unwrap()).unwrap();
        assert_eq!(offer.contract_id(), Some(contract.id_typed().0));
    }

    #[test]
    fn full_payment_completes_the_contract_and_unlocks_commission() {
        let h = setup();
        let issued = h.issued();

        let receipt = h.pay(&issued, 4000, PaymentMethod::Cash, 12).unwrap();

        assert_eq!(receipt.contract.total_paid(), d(4500));
        assert_eq!(receipt.contract.outstanding(), Decimal::ZERO);
        assert_eq!(receipt.contract.payment_status(), PaymentStatus::Completed);

        let commission = receipt.commission.expect("commission recalculated");
        assert_eq!(commission.total, d(135));
        assert_eq!(commission.first_half, Decimal::new(6750, 2));
        assert_eq!(commission.second_half, Decimal::new(6750, 2));
        assert!(commission.first_half_unlocked);
        assert!(commission.second_half_unlocked);

        assert_eq!(receipt.version.map(|v| v.number), Some(2));
    }

    #[test]
    fn voiding_a_payment_restores_the_balance() {
        let h = setup();
        let issued = h.issued();
        let receipt = h.pay(&issued, 4000, PaymentMethod::Cash, 12).unwrap();

        let voided = h
            .engine
            .ledger()
            .void_payment(
                h.tenant_id,
                VoidRequest {
                    payment_id: receipt.payment.id_typed(),
                    reason: "bounced transfer".into(),
                    occurred_at: at(13, 9),
                },
            )
            .unwrap();

        let contract = voided.contract.expect("linked payment");
        assert_eq!(contract.total_paid(), d(500));
        assert_eq!(contract.outstanding(), d(4000));
        assert_eq!(contract.payment_status(), PaymentStatus::Pending);
        assert!(voided.payment.notes().unwrap().contains("[VOIDED] bounced transfer"));

        let again = h.engine.ledger().void_payment(
            h.tenant_id,
            VoidRequest {
                payment_id: receipt.payment.id_typed(),
                reason: "twice".into(),
                occurred_at: at(13, 10),
            },
        );
        assert!(matches!(again, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn card_surcharge_is_what_the_ledger_moves() {
        let h = setup();
        let issued = h.issued();

        let receipt = h.pay(&issued, 1000, PaymentMethod::Card, 12).unwrap();

        let charge = receipt.payment.charge();
        assert_eq!(charge.surcharge, d(38));
        assert_eq!(charge.total_charged, d(1038));
        assert_eq!(receipt.contract.total_paid(), d(1538));
        assert_eq!(receipt.contract.outstanding(), d(2962));
        assert_eq!(receipt.contract.payment_status(), PaymentStatus::Partial);
    }

    #[test]
    fn card_balance_is_settled_by_what_the_card_moves() {
        let h = setup();
        let issued = h.issued();
        let before = h.store.all_events().unwrap().len();

        // 4000 nominal plus the surcharge would move 4152 against a 4000 balance.
        let err = h.pay(&issued, 4000, PaymentMethod::Card, 12).unwrap_err();
        assert_eq!(err.rules(), vec!["amount_exceeds_outstanding"]);
        assert_eq!(h.store.all_events().unwrap().len(), before);

        let receipt = h.pay_exact(&issued, Decimal::new(385356, 2), PaymentMethod::Card, 12).unwrap();
        assert_eq!(receipt.payment.charge().surcharge, Decimal::new(14644, 2));
        assert_eq!(receipt.payment.charge().total_charged, d(4000));
        assert_eq!(receipt.contract.outstanding(), Decimal::ZERO);
        assert_eq!(receipt.contract.payment_status(), PaymentStatus::Completed);
    }

    #[test]
    fn an_offer_backs_only_one_contract() {
        let h = setup();
        let offer = h.accepted_offer();
        let first_deposit = h.deposit(500);
        let second_deposit = h.deposit(600);
        h.issue(offer.id_typed(), first_deposit).unwrap();

        let err = h.issue(offer.id_typed(), second_deposit).unwrap_err();

        assert!(err.is_conflict());
        let untouched = h.engine.payment(h.tenant_id, second_deposit).unwrap();
        assert_eq!(untouched.contract_id(), None);
        assert_eq!(h.engine.directory().list(h.tenant_id).len(), 1);
    }

    #[test]
    fn issuance_reports_offer_and_deposit_problems_together() {
        let h = setup();
        let pending = h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();
        let small = h.deposit(300);
        let before = h.store.all_events().unwrap().len();

        let err = h.issue(pending.id_typed(), small).unwrap_err();

        let rules = err.rules();
        assert!(rules.contains(&"offer_not_accepted"));
        assert!(rules.contains(&"deposit_below_minimum"));
        assert_eq!(h.store.all_events().unwrap().len(), before);
    }

    #[test]
    fn another_salespersons_deposit_cannot_back_the_contract() {
        let h = setup();
        let offer = h.accepted_offer();
        let stranger = UserId::new();
        let deposit = h
            .engine
            .ledger()
            .record_deposit(
                h.tenant_id,
                DepositRequest {
                    salesperson_id: stranger,
                    amount: d(500),
                    method: PaymentMethod::Cash,
                    card: None,
                    reference: None,
                    notes: None,
                    occurred_at: at(10, 15),
                },
            )
            .unwrap();

        let err = h.issue(offer.id_typed(), deposit.id_typed()).unwrap_err();

        assert_eq!(err.rules(), vec!["deposit_salesperson_mismatch"]);
    }

    #[test]
    fn overpayment_is_rejected_and_nothing_is_written() {
        let h = setup();
        let issued = h.issued();
        let before = h.store.all_events().unwrap().len();

        let err = h.pay(&issued, 5000, PaymentMethod::Cash, 12).unwrap_err();

        assert_eq!(err.rules(), vec!["amount_exceeds_outstanding"]);
        assert_eq!(h.store.all_events().unwrap().len(), before);
    }

    #[test]
    fn paid_in_full_contract_refuses_more_payments() {
        let h = setup();
        let issued = h.issued();
        h.pay(&issued, 4000, PaymentMethod::Cash, 12).unwrap();

        let err = h.pay(&issued, 1, PaymentMethod::Cash, 13).unwrap_err();

        assert!(err.is_conflict());
    }

    #[test]
    fn cancelled_contract_refuses_payments() {
        let h = setup();
        let issued = h.issued();
        let contract_id = issued.contract.id_typed();

        let cancelled = h
            .engine
            .issuance()
            .cancel(h.tenant_id, contract_id, Some("client withdrew".into()), at(12, 9))
            .unwrap();
        assert_eq!(cancelled.state(), ContractState::Cancelled);

        let err = h.pay(&issued, 100, PaymentMethod::Cash, 13).unwrap_err();
        assert!(err.is_conflict());

        let history = h.engine.versions().history(h.tenant_id, contract_id).unwrap();
        assert!(matches!(history.last().map(|v| &v.change), Some(ChangeDetail::Cancelled { .. })));
        assert_eq!(
            h.engine.directory().get(h.tenant_id, &contract_id).map(|s| s.state),
            Some(ContractState::Cancelled)
        );
    }

    #[test]
    fn collaborator_failures_do_not_undo_commits() {
        let h = setup_with_broken_collaborators();

        let issued = h.issued();
        assert_eq!(issued.calendar_event_id, None);
        assert_eq!(issued.contract.calendar_event_id(), None);
        assert_eq!(issued.version.as_ref().map(|v| v.number), Some(1));

        let receipt = h.pay(&issued, 1000, PaymentMethod::Cash, 12).unwrap();
        assert_eq!(receipt.contract.outstanding(), d(3000));

        let reloaded = h.engine.contract(h.tenant_id, issued.contract.id_typed()).unwrap();
        assert_eq!(reloaded.total_paid(), d(1500));
    }

    #[test]
    fn access_codes_resolve_until_the_grace_period_ends() {
        let h = setup();
        let issued = h.issued();
        let code = issued.contract.access_code().to_string();
        let issuance = h.engine.issuance();

        let found = issuance.resolve_access_code(h.tenant_id, &code, event_date()).unwrap();
        assert_eq!(found.contract_id, issued.contract.id_typed());
        assert_eq!(found.outstanding, d(4000));

        let last_day = event_date() + Duration::days(30);
        assert!(issuance.resolve_access_code(h.tenant_id, &code, last_day).is_ok());

        let expired = issuance
            .resolve_access_code(h.tenant_id, &code, last_day + Duration::days(1))
            .unwrap_err();
        assert_eq!(expired.rules(), vec!["access_code_expired"]);

        let unknown = issuance.resolve_access_code(h.tenant_id, "CLI-9999-ZZZZZZZ", event_date());
        assert!(matches!(unknown, Err(DispatchError::NotFound(_))));

        let other_tenant = issuance.resolve_access_code(TenantId::new(), &code, event_date());
        assert!(matches!(other_tenant, Err(DispatchError::NotFound(_))));
    }

    #[test]
    fn version_numbers_are_never_reused() {
        let h = setup();
        let issued = h.issued();
        let contract_id = issued.contract.id_typed();
        h.pay(&issued, 1000, PaymentMethod::Transfer, 12).unwrap();
        let versions = h.engine.versions();

        versions.delete(h.tenant_id, contract_id, 2, at(13, 9)).unwrap();
        let manual = versions
            .record_manual(h.tenant_id, contract_id, "Menu change", json!({"field": "menu"}), at(14, 9))
            .unwrap();

        assert_eq!(manual.number, 3);
        let numbers: Vec<u32> = versions
            .history(h.tenant_id, contract_id)
            .unwrap()
            .iter()
            .map(|v| v.number)
            .collect();
        assert_eq!(numbers, vec![1, 3]);

        let missing = versions.delete(h.tenant_id, contract_id, 2, at(15, 9));
        assert!(matches!(missing, Err(DispatchError::NotFound(_))));
    }

    #[test]
    fn commission_halves_are_paid_once() {
        let h = setup();
        let issued = h.issued();
        let contract_id = issued.contract.id_typed();
        let ledger = h.engine.ledger();

        let locked = ledger
            .mark_commission_paid(h.tenant_id, contract_id, CommissionHalf::Second, at(11, 12))
            .unwrap_err();
        assert_eq!(locked.rules(), vec!["commission_half_locked"]);

        h.pay(&issued, 2000, PaymentMethod::Cash, 12).unwrap();
        let contract = ledger
            .mark_commission_paid(h.tenant_id, contract_id, CommissionHalf::Second, at(12, 13))
            .unwrap();
        assert!(contract.commission_paid(CommissionHalf::Second));

        let twice = ledger.mark_commission_paid(h.tenant_id, contract_id, CommissionHalf::Second, at(12, 14));
        assert!(matches!(twice, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn racing_transactions_on_one_contract_conflict() {
        let h = setup();
        let issued = h.issued();
        let contract_id = issued.contract.id_typed();
        let dispatcher = h.engine.dispatcher();

        let apply = |amount: i64| {
            ContractCommand::ApplyPayment(ApplyPayment {
                tenant_id: h.tenant_id,
                contract_id,
                payment_id: PaymentId::new(AggregateId::new()),
                total_charged: d(amount),
                paid_at: at(12, 9),
                occurred_at: at(12, 9),
            })
        };

        let mut first = dispatcher.begin(h.tenant_id);
        let mut second = dispatcher.begin(h.tenant_id);
        let mut a = first.load::<venuebook_contracts::Contract>(contract_id.0).unwrap();
        let mut b = second.load::<venuebook_contracts::Contract>(contract_id.0).unwrap();
        first.execute(&mut a, &apply(100)).unwrap();
        second.execute(&mut b, &apply(200)).unwrap();

        first.commit().unwrap();
        let lost = second.commit();

        assert!(matches!(lost, Err(DispatchError::Concurrency(_))));
        let stored = h.engine.contract(h.tenant_id, contract_id).unwrap();
        assert_eq!(stored.total_paid(), d(600));
    }

    #[test]
    fn snapshots_describe_the_commit_that_triggered_them() {
        let h = setup();
        let issued = h.issued();
        let contract_id = issued.contract.id_typed();
        let first = h.pay(&issued, 1000, PaymentMethod::Cash, 12).unwrap();
        // Another payment lands before the first one is snapshotted.
        h.pay(&issued, 500, PaymentMethod::Cash, 13).unwrap();

        let version = h
            .engine
            .versions()
            .after_change(
                h.tenant_id,
                &first.contract,
                "Payment received",
                ChangeDetail::Payment {
                    payment_id: first.payment.id_typed(),
                    amount: d(1000),
                    method: PaymentMethod::Cash,
                    surcharge: Decimal::ZERO,
                    total_charged: d(1000),
                    resulting_balance: first.contract.outstanding(),
                },
                at(13, 14),
            )
            .unwrap();

        assert_eq!(version.snapshot.total_paid, d(1500));
        assert_eq!(version.snapshot.outstanding, d(3000));
        assert!(matches!(
            version.change,
            ChangeDetail::Payment { resulting_balance, .. } if resulting_balance == version.snapshot.outstanding
        ));
        assert_eq!(h.engine.contract(h.tenant_id, contract_id).unwrap().outstanding(), d(2500));

        for recorded in h.engine.versions().history(h.tenant_id, contract_id).unwrap() {
            if let ChangeDetail::Payment { resulting_balance, .. } = recorded.change {
                assert_eq!(resulting_balance, recorded.snapshot.outstanding);
            }
        }
    }

    #[test]
    fn read_models_keep_up_without_being_queried() {
        let h = setup();
        let issued = h.issued();
        h.pay(&issued, 1000, PaymentMethod::Cash, 12).unwrap();

        assert_eq!(h.engine.queued_envelopes(), 0);

        for day in 13..20 {
            h.engine.offers().create(h.tenant_id, h.terms(), at(day, 10)).unwrap();
        }
        assert_eq!(h.engine.queued_envelopes(), 0);
    }

    #[test]
    fn numbering_continues_from_the_counter_head() {
        let h = setup();
        for _ in 0..40 {
            h.engine.offers().create(h.tenant_id, h.terms(), at(5, 10)).unwrap();
        }
        let counter_id = SequenceCounterId::for_kind(CodeKind::Offer).0;

        let mut tx = h.engine.dispatcher().begin(h.tenant_id);
        let restored = tx.load_latest::<SequenceCounter>(counter_id).unwrap();
        let replayed = h.engine.dispatcher().load::<SequenceCounter>(h.tenant_id, counter_id).unwrap();
        assert_eq!(restored, replayed);
        assert_eq!(restored.last(), 40);

        let next = h.engine.offers().create(h.tenant_id, h.terms(), at(6, 10)).unwrap();
        assert_eq!(next.code(), "OF-2027-01-0041");
    }

    #[test]
    fn tenants_cannot_see_each_others_contracts() {
        let h = setup();
        let issued = h.issued();
        let other = TenantId::new();

        let err = h.engine.contract(other, issued.contract.id_typed()).unwrap_err();

        assert!(matches!(err, DispatchError::NotFound(_)));
        assert!(h.engine.directory().list(other).is_empty());
        assert_eq!(h.engine.directory().list(h.tenant_id).len(), 1);
    }

    #[test]
    fn directory_rebuilds_from_the_store() {
        let h = setup();
        let issued = h.issued();
        h.pay(&issued, 1000, PaymentMethod::Cash, 12).unwrap();
        let live = h.engine.directory().get(h.tenant_id, &issued.contract.id_typed()).unwrap();

        let envelopes = h.store.all_events().unwrap().iter().map(|e| e.to_envelope()).collect::<Vec<_>>();
        h.engine.directory().rebuild(h.tenant_id, envelopes).unwrap();

        let rebuilt = h.engine.directory().get(h.tenant_id, &issued.contract.id_typed()).unwrap();
        assert_eq!(rebuilt, live);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn ledger_is_conserved_through_payments_and_voids(
            amounts in prop::collection::vec(1i64..1500, 1..6),
            void_mask in prop::collection::vec(any::<bool>(), 6),
        ) {
            let h = setup();
            let issued = h.issued();
            let contract_id = issued.contract.id_typed();

            let mut recorded = Vec::new();
            for (i, amount) in amounts.iter().enumerate() {
                if let Ok(receipt) = h.pay(&issued, *amount, PaymentMethod::Cash, 12 + i as u32) {
                    recorded.push(receipt.payment.id_typed());
                }
            }
            for (payment_id, void) in recorded.iter().zip(&void_mask) {
                if *void {
                    h.engine.ledger().void_payment(h.tenant_id, VoidRequest {
                        payment_id: *payment_id,
                        reason: "test".into(),
                        occurred_at: at(25, 9),
                    }).unwrap();
                }
            }

            let contract = h.engine.contract(h.tenant_id, contract_id).unwrap();
            let applied: Decimal = contract.applied_payments().iter().map(|p| p.total_charged).sum();
            prop_assert_eq!(contract.total_paid(), applied);
            prop_assert_eq!(contract.total_paid() + contract.outstanding(), contract.total());
            prop_assert!(contract.total_paid() <= contract.total());
        }
    }
}
