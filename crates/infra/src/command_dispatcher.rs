//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Stage events in a transaction (one or more aggregates)
//!   ↓
//! 5. Commit: atomic multi-stream append with exact expected versions
//!   ↓
//! 6. Publish committed envelopes to the bus
//! ```
//!
//! Single-aggregate commands go through [`CommandDispatcher::dispatch`];
//! operations that must change several aggregates together (contract
//! issuance, payments) open a [`Transaction`] with [`CommandDispatcher::begin`].
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use venuebook_core::{AggregateId, DomainError, TenantId, Violation};
use venuebook_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::streams::EventSourced;
use crate::transaction::Transaction;

/// Application-level error returned by every service operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Caller input broke one or more business rules.
    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<Violation>),
    /// Illegal state transition; the caller should re-read current state.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Domain invariant failure (corrupted history or a bug).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Optimistic concurrency failure; retrying the whole operation is safe.
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    /// Cross-tenant or cross-aggregate stream mixing.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    /// Historical payload could not be read back as the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DispatchError {
    /// Rule identifiers of a validation failure (empty for other kinds).
    pub fn rules(&self) -> Vec<&str> {
        match self {
            DispatchError::Validation(v) => v.iter().map(|v| v.rule.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Conflict(_))
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(v) => DispatchError::Validation(v),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound(what) => DispatchError::NotFound(what),
            DomainError::InvalidId(msg) => DispatchError::Validation(vec![Violation::new("invalid_id", msg)]),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. A publish failure after a successful append is logged and not
/// returned, since the store already holds the facts and the bus is not a
/// source of truth.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a transaction scoped to one tenant.
    pub fn begin(&self, tenant_id: TenantId) -> Transaction<'_, S, B> {
        Transaction::new(self, tenant_id)
    }

    /// Load, handle and commit a command against a single aggregate.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: EventSourced,
        A::Event: venuebook_events::Event + Serialize + DeserializeOwned,
    {
        let mut tx = self.begin(tenant_id);
        let mut aggregate = tx.load::<A>(aggregate_id)?;
        tx.execute(&mut aggregate, &command)?;
        tx.commit()
    }

    /// Rehydrate an aggregate without staging anything.
    pub fn load<A>(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Persist staged appends, then publish what was committed.
    pub(crate) fn commit_appends(
        &self,
        appends: Vec<crate::event_store::StreamAppend>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.store.append_streams(appends)?;

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    tenant_id = %stored.tenant_id,
                    aggregate_id = %stored.aggregate_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }

        Ok(committed)
    }
}

pub(crate) fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

pub(crate) fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: EventSourced,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
