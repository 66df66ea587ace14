use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use venuebook_codes::{CodeKind, access_code, sequential_code};
use venuebook_contracts::{
    CancelContract, ChangeDetail, Contract, ContractCommand, ContractId, ContractVersion, DepositRef, IssueContract,
    LinkCalendarEvent, LinkToContract, Payment, PaymentCommand, PaymentId, PaymentPlan, VersionLogId,
};
use venuebook_core::{AggregateId, TenantId, Violation};
use venuebook_events::{EventBus, EventEnvelope};
use venuebook_offers::{AttachContract, Offer, OfferCommand, OfferId};

use crate::collaborators::CalendarEventDetails;
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::read_model::ContractSummary;
use crate::sequence::{Reserve, SequenceCounter, SequenceCounterId};
use crate::services::{VenueEngine, millis};
use crate::side_effects::{SideEffect, fenced};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub offer_id: OfferId,
    pub plan: PaymentPlan,
    /// An unlinked payment recorded by the offer's salesperson.
    pub deposit_payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

/// Result of issuance. The side-effect fields are `None` when that effect
/// failed; the contract itself is committed either way.
#[derive(Debug, Clone)]
pub struct IssuedContract {
    pub contract: Contract,
    pub version: Option<ContractVersion>,
    pub calendar_event_id: Option<String>,
}

/// Turns accepted offers into contracts.
pub struct ContractIssuance<'e, S, B> {
    engine: &'e VenueEngine<S, B>,
}

impl<'e, S, B> ContractIssuance<'e, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(engine: &'e VenueEngine<S, B>) -> Self {
        Self { engine }
    }

    /// Issue a contract from an accepted offer and a deposit.
    ///
    /// One transaction claims the offer, links the deposit, advances the
    /// contract sequence and opens the contract; either all of it commits or
    /// none of it does. Validation failures from the offer and the deposit are
    /// reported together. Calendar sync and the first version snapshot run
    /// after the commit and cannot undo it.
    pub fn issue(&self, tenant_id: TenantId, request: IssueRequest) -> Result<IssuedContract, DispatchError> {
        let IssueRequest {
            offer_id,
            plan,
            deposit_payment_id,
            occurred_at,
        } = request;
        let config = self.engine.config();

        let mut tx = self.engine.dispatcher().begin(tenant_id);

        let mut offer = tx.load::<Offer>(offer_id.0)?;
        if !offer.is_created() {
            return Err(DispatchError::NotFound(format!("offer {offer_id}")));
        }
        let (terms, quote) = match (offer.terms(), offer.quote()) {
            (Some(terms), Some(quote)) => (terms.clone(), quote.clone()),
            _ => return Err(DispatchError::InvariantViolation(format!("offer {offer_id} has no terms"))),
        };

        let mut deposit = tx.load::<Payment>(deposit_payment_id.0)?;
        if !deposit.is_created() {
            return Err(DispatchError::NotFound(format!("payment {deposit_payment_id}")));
        }

        let contract_id = ContractId::new(AggregateId::new());
        let mut violations: Vec<Violation> = Vec::new();

        collect(
            &mut violations,
            tx.execute(
                &mut offer,
                &OfferCommand::AttachContract(AttachContract {
                    tenant_id,
                    offer_id,
                    contract_id: contract_id.0,
                    occurred_at,
                }),
            ),
        )?;
        collect(
            &mut violations,
            tx.execute(
                &mut deposit,
                &PaymentCommand::LinkToContract(LinkToContract {
                    tenant_id,
                    payment_id: deposit_payment_id,
                    contract_id: contract_id.0,
                    salesperson_id: terms.salesperson_id,
                    minimum_amount: config.minimum_deposit,
                    occurred_at,
                }),
            ),
        )?;
        if !violations.is_empty() {
            return Err(DispatchError::Validation(violations));
        }

        let mut counter = tx.load_latest::<SequenceCounter>(SequenceCounterId::for_kind(CodeKind::Contract).0)?;
        let reserved = tx.execute(&mut counter, &Reserve { tenant_id, occurred_at })?;
        let number = reserved.last().map(|r| r.value).unwrap_or(counter.last());
        tracing::debug!(tenant_id = %tenant_id, kind = "contract", sequence = number, "sequence reserved");
        let code = sequential_code(CodeKind::Contract, occurred_at.year(), occurred_at.month(), number);

        let access = access_code(number, rand::random::<u64>(), millis(occurred_at));
        let expires_on = terms
            .event_date
            .checked_add_signed(Duration::days(config.access_code_grace_days))
            .unwrap_or(NaiveDate::MAX);

        let recorded_at = deposit.recorded_at().unwrap_or(occurred_at);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        tx.execute(
            &mut contract,
            &ContractCommand::IssueContract(IssueContract {
                tenant_id,
                contract_id,
                code,
                offer_id,
                terms,
                quote,
                plan,
                deposit: DepositRef {
                    payment_id: deposit_payment_id,
                    total_charged: deposit.charge().total_charged,
                    recorded_at,
                },
                policy: config.contract_policy(),
                access_code: access,
                access_code_expires_on: expires_on,
                version_log_id: VersionLogId::new(AggregateId::new()),
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;

        tracing::info!(
            tenant_id = %tenant_id,
            contract_id = %contract_id,
            code = %contract.code(),
            offer_id = %offer_id,
            total = %contract.total(),
            outstanding = %contract.outstanding(),
            "contract issued"
        );

        let version = self.engine.versions().after_change(
            tenant_id,
            &contract,
            "Contract issued",
            ChangeDetail::Issued {
                offer_code: offer.code().to_string(),
                deposit: deposit.charge().total_charged,
            },
            occurred_at,
        );
        let calendar_event_id = self.sync_calendar(tenant_id, &contract, occurred_at);

        let contract = match calendar_event_id {
            Some(_) => self.engine.contract(tenant_id, contract_id).unwrap_or(contract),
            None => contract,
        };

        Ok(IssuedContract {
            contract,
            version,
            calendar_event_id,
        })
    }

    /// Cancel an active contract and record the cancellation as a version.
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Contract, DispatchError> {
        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        tx.execute(
            &mut contract,
            &ContractCommand::CancelContract(CancelContract {
                tenant_id,
                contract_id,
                reason: reason.clone(),
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;
        tracing::info!(tenant_id = %tenant_id, contract_id = %contract_id, "contract cancelled");

        self.engine.versions().after_change(
            tenant_id,
            &contract,
            "Contract cancelled",
            ChangeDetail::Cancelled { reason },
            occurred_at,
        );
        Ok(contract)
    }

    /// Find the contract a client's access code opens.
    ///
    /// Unknown codes are `NotFound`; codes past their expiry (event date plus
    /// the configured grace period) fail validation with `access_code_expired`.
    pub fn resolve_access_code(
        &self,
        tenant_id: TenantId,
        code: &str,
        today: NaiveDate,
    ) -> Result<ContractSummary, DispatchError> {
        let summary = self
            .engine
            .directory()
            .by_access_code(tenant_id, code)
            .ok_or_else(|| DispatchError::NotFound("access code".to_string()))?;

        if today > summary.access_code_expires_on {
            return Err(DispatchError::Validation(vec![Violation::new(
                "access_code_expired",
                format!("access code expired on {}", summary.access_code_expires_on),
            )]));
        }
        Ok(summary)
    }

    pub fn get(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<Contract, DispatchError> {
        self.engine.contract(tenant_id, contract_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ContractSummary> {
        self.engine.directory().list(tenant_id)
    }

    fn sync_calendar(&self, tenant_id: TenantId, contract: &Contract, occurred_at: DateTime<Utc>) -> Option<String> {
        let contract_id = contract.id_typed();
        let (Some(date), Some(start_time), Some(end_time)) =
            (contract.event_date(), contract.start_time(), contract.end_time())
        else {
            return None;
        };
        let details = CalendarEventDetails {
            tenant_id,
            contract_id,
            contract_code: contract.code().to_string(),
            salon_id: contract.salon_id(),
            date,
            start_time,
            end_time,
            guest_count: contract.guest_count(),
        };

        fenced(SideEffect::CalendarSync, tenant_id, contract_id, || {
            let calendar_event_id = self.engine.calendar().create_event(&details)?;
            self.engine.dispatch::<Contract>(
                tenant_id,
                contract_id.0,
                ContractCommand::LinkCalendarEvent(LinkCalendarEvent {
                    tenant_id,
                    contract_id,
                    calendar_event_id: calendar_event_id.clone(),
                    occurred_at,
                }),
            )?;
            Ok::<_, anyhow::Error>(calendar_event_id)
        })
    }
}

/// Fold a validation failure into `violations`; any other error aborts.
fn collect<T>(violations: &mut Vec<Violation>, result: Result<T, DispatchError>) -> Result<(), DispatchError> {
    match result {
        Ok(_) => Ok(()),
        Err(DispatchError::Validation(found)) => {
            violations.extend(found);
            Ok(())
        }
        Err(other) => Err(other),
    }
}
