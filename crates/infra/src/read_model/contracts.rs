//! Contract directory: tenant-scoped contract summaries plus the access-code
//! index clients use to find their contract.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use venuebook_contracts::{CommissionFigures, ContractEvent, ContractId, ContractState, PaymentStatus};
use venuebook_core::{AggregateId, ClientId, TenantId, UserId};
use venuebook_events::EventEnvelope;
use venuebook_offers::OfferId;

use crate::read_model::TenantStore;
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSummary {
    pub contract_id: ContractId,
    pub code: String,
    pub offer_id: OfferId,
    pub client_id: ClientId,
    pub salesperson_id: UserId,
    pub event_date: NaiveDate,
    pub access_code: String,
    pub access_code_expires_on: NaiveDate,
    pub total: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub payment_status: PaymentStatus,
    pub state: ContractState,
    pub commission: CommissionFigures,
    pub calendar_event_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ContractProjectionError {
    #[error("failed to deserialize contract event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug)]
pub struct ContractDirectory<S, I>
where
    S: TenantStore<ContractId, ContractSummary>,
    I: TenantStore<String, ContractId>,
{
    summaries: S,
    access_codes: I,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S, I> ContractDirectory<S, I>
where
    S: TenantStore<ContractId, ContractSummary>,
    I: TenantStore<String, ContractId>,
{
    pub fn new(summaries: S, access_codes: I) -> Self {
        Self {
            summaries,
            access_codes,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, contract_id: &ContractId) -> Option<ContractSummary> {
        self.summaries.get(tenant_id, contract_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ContractSummary> {
        self.summaries.list(tenant_id)
    }

    pub fn by_access_code(&self, tenant_id: TenantId, access_code: &str) -> Option<ContractSummary> {
        let contract_id = self.access_codes.get(tenant_id, &access_code.to_string())?;
        self.summaries.get(tenant_id, &contract_id)
    }

    fn cursor(&self, key: CursorKey) -> u64 {
        self.cursors
            .read()
            .map(|c| c.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn advance(&self, key: CursorKey, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(key, seq);
        }
    }

    /// Apply one committed envelope. Duplicates (already-seen sequence
    /// numbers) are ignored; a gap is an error.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ContractProjectionError> {
        if envelope.aggregate_type() != streams::CONTRACT {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let key = CursorKey {
            tenant_id,
            aggregate_id: envelope.aggregate_id(),
        };
        let seq = envelope.sequence_number();
        let last = self.cursor(key);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ContractProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: ContractEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ContractProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, contract_id) = match &ev {
            ContractEvent::ContractIssued(e) => (e.tenant_id, e.contract_id),
            ContractEvent::PaymentApplied(e) => (e.tenant_id, e.contract_id),
            ContractEvent::PaymentReversed(e) => (e.tenant_id, e.contract_id),
            ContractEvent::CommissionRecalculated(e) => (e.tenant_id, e.contract_id),
            ContractEvent::CommissionMarkedPaid(e) => (e.tenant_id, e.contract_id),
            ContractEvent::CalendarEventLinked(e) => (e.tenant_id, e.contract_id),
            ContractEvent::ContractCancelled(e) => (e.tenant_id, e.contract_id),
        };
        if event_tenant != tenant_id || contract_id.0 != key.aggregate_id {
            return Err(ContractProjectionError::TenantIsolation(
                "event scope does not match envelope".to_string(),
            ));
        }

        match ev {
            ContractEvent::ContractIssued(e) => {
                self.access_codes.upsert(tenant_id, e.access_code.clone(), e.contract_id);
                self.summaries.upsert(
                    tenant_id,
                    e.contract_id,
                    ContractSummary {
                        contract_id: e.contract_id,
                        code: e.code,
                        offer_id: e.offer_id,
                        client_id: e.client_id,
                        salesperson_id: e.salesperson_id,
                        event_date: e.event_date,
                        access_code: e.access_code,
                        access_code_expires_on: e.access_code_expires_on,
                        total: e.total,
                        total_paid: e.total_paid,
                        outstanding: e.outstanding,
                        payment_status: e.payment_status,
                        state: ContractState::Active,
                        commission: e.commission,
                        calendar_event_id: None,
                    },
                );
            }
            ContractEvent::PaymentApplied(e) => {
                self.summaries.update(tenant_id, &contract_id, &mut |s| {
                    s.total_paid = e.total_paid;
                    s.outstanding = e.outstanding;
                    s.payment_status = e.payment_status;
                });
            }
            ContractEvent::PaymentReversed(e) => {
                self.summaries.update(tenant_id, &contract_id, &mut |s| {
                    s.total_paid = e.total_paid;
                    s.outstanding = e.outstanding;
                    s.payment_status = e.payment_status;
                });
            }
            ContractEvent::CommissionRecalculated(e) => {
                self.summaries
                    .update(tenant_id, &contract_id, &mut |s| s.commission = e.commission.clone());
            }
            ContractEvent::CommissionMarkedPaid(_) => {}
            ContractEvent::CalendarEventLinked(e) => {
                self.summaries.update(tenant_id, &contract_id, &mut |s| {
                    s.calendar_event_id = Some(e.calendar_event_id.clone())
                });
            }
            ContractEvent::ContractCancelled(_) => {
                self.summaries
                    .update(tenant_id, &contract_id, &mut |s| s.state = ContractState::Cancelled);
            }
        }

        self.advance(key, seq);
        Ok(())
    }

    /// Drop a tenant's records and replay the given envelopes.
    pub fn rebuild(
        &self,
        tenant_id: TenantId,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ContractProjectionError> {
        self.summaries.clear_tenant(tenant_id);
        self.access_codes.clear_tenant(tenant_id);
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }

        for envelope in envelopes.into_iter().filter(|e| e.tenant_id() == tenant_id) {
            self.apply_envelope(&envelope)?;
        }
        Ok(())
    }
}
