//! Application services.
//!
//! [`VenueEngine`] owns the dispatcher, configuration, catalog, read models and
//! collaborators. The managers are cheap views over it:
//!
//! - [`OfferLifecycle`]: create, update, accept and reject offers
//! - [`ContractIssuance`]: issue and cancel contracts, resolve access codes
//! - [`PaymentLedger`]: deposits, payments, voids and commission
//! - [`VersionSnapshotter`]: the per-contract version log and its documents
//!
//! Every mutating operation takes the business time (`occurred_at`) from the
//! caller, the same way commands do.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use venuebook_contracts::{Contract, ContractId, Payment, PaymentId, VersionLog, VersionLogId};
use venuebook_core::{AggregateId, TenantId};
use venuebook_events::{EventBus, EventEnvelope, Subscription};
use venuebook_offers::{Offer, OfferId};
use venuebook_pricing::Catalog;

use crate::collaborators::{CalendarClient, DocumentGenerator};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, StoredEvent};
use crate::read_model::{ContractDirectory, ContractSummary, InMemoryTenantStore};
use crate::streams::EventSourced;
use crate::transaction::Transaction;

pub mod issuance;
pub mod ledger;
pub mod offers;
pub mod snapshots;

pub use issuance::{ContractIssuance, IssueRequest, IssuedContract};
pub use ledger::{DepositRequest, PaymentLedger, PaymentReceipt, PaymentRequest, VoidReceipt, VoidRequest};
pub use offers::OfferLifecycle;
pub use snapshots::VersionSnapshotter;

pub type Directory =
    ContractDirectory<InMemoryTenantStore<ContractId, ContractSummary>, InMemoryTenantStore<String, ContractId>>;

type Feed = Subscription<EventEnvelope<JsonValue>>;

pub struct VenueEngine<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    config: EngineConfig,
    catalog: Arc<Catalog>,
    directory: Directory,
    feed: Mutex<Feed>,
    documents: Arc<dyn DocumentGenerator>,
    calendar: Arc<dyn CalendarClient>,
}

impl<S, B> VenueEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: S,
        bus: B,
        config: EngineConfig,
        catalog: Arc<Catalog>,
        documents: Arc<dyn DocumentGenerator>,
        calendar: Arc<dyn CalendarClient>,
    ) -> Self {
        let feed = bus.subscribe();
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            config,
            catalog,
            directory: ContractDirectory::new(InMemoryTenantStore::new(), InMemoryTenantStore::new()),
            feed: Mutex::new(feed),
            documents,
            calendar,
        }
    }

    pub fn offers(&self) -> OfferLifecycle<'_, S, B> {
        OfferLifecycle::new(self)
    }

    pub fn issuance(&self) -> ContractIssuance<'_, S, B> {
        ContractIssuance::new(self)
    }

    pub fn ledger(&self) -> PaymentLedger<'_, S, B> {
        PaymentLedger::new(self)
    }

    pub fn versions(&self) -> VersionSnapshotter<'_, S, B> {
        VersionSnapshotter::new(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// The contract directory, brought up to date with everything published.
    pub fn directory(&self) -> &Directory {
        self.catch_up();
        &self.directory
    }

    pub(crate) fn documents(&self) -> &dyn DocumentGenerator {
        self.documents.as_ref()
    }

    pub(crate) fn calendar(&self) -> &dyn CalendarClient {
        self.calendar.as_ref()
    }

    /// Commit, then fold what the commit published into the read models.
    pub(crate) fn commit(&self, tx: Transaction<'_, S, B>) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = tx.commit()?;
        self.catch_up();
        Ok(committed)
    }

    pub(crate) fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: EventSourced,
        A::Event: venuebook_events::Event + Serialize + DeserializeOwned,
    {
        let committed = self.dispatcher.dispatch::<A>(tenant_id, aggregate_id, command)?;
        self.catch_up();
        Ok(committed)
    }

    /// Feed published envelopes into the read models.
    pub(crate) fn catch_up(&self) {
        let Ok(feed) = self.feed.lock() else {
            tracing::warn!("read model feed lock poisoned");
            return;
        };
        for envelope in feed.drain() {
            if let Err(err) = self.directory.apply_envelope(&envelope) {
                tracing::warn!(
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    error = %err,
                    "contract directory rejected envelope"
                );
            }
        }
    }

    /// Envelopes published but not yet applied to the read models.
    #[cfg(test)]
    pub(crate) fn queued_envelopes(&self) -> usize {
        self.feed.lock().map(|feed| feed.drain().len()).unwrap_or(0)
    }

    /// Load an aggregate that must already exist.
    pub(crate) fn existing<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        what: &str,
        is_created: impl FnOnce(&A) -> bool,
    ) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        let aggregate = self.dispatcher.load::<A>(tenant_id, aggregate_id)?;
        if !is_created(&aggregate) {
            return Err(DispatchError::NotFound(format!("{what} {aggregate_id}")));
        }
        Ok(aggregate)
    }

    pub fn offer(&self, tenant_id: TenantId, offer_id: OfferId) -> Result<Offer, DispatchError> {
        self.existing(tenant_id, offer_id.0, "offer", Offer::is_created)
    }

    pub fn contract(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<Contract, DispatchError> {
        self.existing(tenant_id, contract_id.0, "contract", Contract::is_created)
    }

    pub fn payment(&self, tenant_id: TenantId, payment_id: PaymentId) -> Result<Payment, DispatchError> {
        self.existing(tenant_id, payment_id.0, "payment", Payment::is_created)
    }

    pub fn version_log(&self, tenant_id: TenantId, log_id: VersionLogId) -> Result<VersionLog, DispatchError> {
        self.dispatcher.load::<VersionLog>(tenant_id, log_id.0)
    }
}

/// Run `op` again when it loses an optimistic-concurrency race.
pub(crate) fn retry_on_concurrency<T>(
    attempts: u32,
    mut op: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut tries = 1;
    loop {
        match op() {
            Err(DispatchError::Concurrency(msg)) if tries < attempts => {
                tracing::debug!(attempt = tries, reason = %msg, "retrying after concurrent modification");
                tries += 1;
            }
            other => return other,
        }
    }
}

/// Cut timestamps to u64 millis for code generation (pre-epoch clamps to 0).
pub(crate) fn millis(at: chrono::DateTime<chrono::Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}
