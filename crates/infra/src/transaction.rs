//! Multi-aggregate unit of work.
//!
//! A transaction remembers the stream version of every aggregate it loaded,
//! stages the events decided against them, and commits everything in one
//! atomic `append_streams` call with `ExpectedVersion::Exact`. If another
//! writer touched any of those streams in between, the commit fails with
//! `DispatchError::Concurrency` and nothing is written.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use venuebook_core::{AggregateId, ExpectedVersion, TenantId};
use venuebook_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{
    CommandDispatcher, DispatchError, apply_history, stream_version, validate_loaded_stream,
};
use crate::event_store::{EventStore, StoredEvent, StreamAppend, UncommittedEvent};
use crate::streams::{CompactStream, EventSourced};

#[derive(Debug)]
struct StagedStream {
    aggregate_id: AggregateId,
    expected: u64,
    events: Vec<UncommittedEvent>,
}

pub struct Transaction<'d, S, B> {
    dispatcher: &'d CommandDispatcher<S, B>,
    tenant_id: TenantId,
    read_versions: HashMap<AggregateId, u64>,
    staged: Vec<StagedStream>,
}

impl<'d, S, B> Transaction<'d, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(dispatcher: &'d CommandDispatcher<S, B>, tenant_id: TenantId) -> Self {
        Self {
            dispatcher,
            tenant_id,
            read_versions: HashMap::new(),
            staged: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Rehydrate an aggregate and remember the version it was read at. A
    /// stream that does not exist yet loads as a fresh, uncreated aggregate.
    pub fn load<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        if self.read_versions.contains_key(&aggregate_id) {
            return Err(DispatchError::InvariantViolation(format!(
                "aggregate {aggregate_id} loaded twice in one transaction"
            )));
        }

        let history = self.dispatcher.store().load_stream(self.tenant_id, aggregate_id)?;
        validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;

        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        self.read_versions.insert(aggregate_id, stream_version(&history));
        Ok(aggregate)
    }

    /// Like [`load`](Self::load), but restore from the stream head only.
    pub fn load_latest<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: CompactStream,
        A::Event: DeserializeOwned,
    {
        if self.read_versions.contains_key(&aggregate_id) {
            return Err(DispatchError::InvariantViolation(format!(
                "aggregate {aggregate_id} loaded twice in one transaction"
            )));
        }

        let head = self.dispatcher.store().load_last(self.tenant_id, aggregate_id)?;
        let (aggregate, version) = match head {
            Some(stored) => {
                validate_loaded_stream(self.tenant_id, aggregate_id, std::slice::from_ref(&stored))?;
                let latest: A::Event = serde_json::from_value(stored.payload)
                    .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
                (A::restore(aggregate_id, &latest, stored.sequence_number), stored.sequence_number)
            }
            None => (A::empty_for(aggregate_id), 0),
        };

        self.read_versions.insert(aggregate_id, version);
        Ok(aggregate)
    }

    /// Handle a command against a loaded aggregate, apply the decided events
    /// to it and stage them for commit.
    pub fn execute<A>(&mut self, aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, DispatchError>
    where
        A: EventSourced,
        A::Event: venuebook_events::Event + Serialize,
    {
        let aggregate_id = aggregate.stream_id();
        let Some(&expected) = self.read_versions.get(&aggregate_id) else {
            return Err(DispatchError::InvariantViolation(format!(
                "aggregate {aggregate_id} was not loaded in this transaction"
            )));
        };

        let decided = venuebook_events::execute(aggregate, command)?;
        if decided.is_empty() {
            return Ok(decided);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(self.tenant_id, aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        match self.staged.iter_mut().find(|s| s.aggregate_id == aggregate_id) {
            Some(stream) => stream.events.extend(uncommitted),
            None => self.staged.push(StagedStream {
                aggregate_id,
                expected,
                events: uncommitted,
            }),
        }

        Ok(decided)
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Commit every staged stream atomically, then publish.
    pub fn commit(self) -> Result<Vec<StoredEvent>, DispatchError> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }

        let appends = self
            .staged
            .into_iter()
            .map(|s| StreamAppend::new(ExpectedVersion::Exact(s.expected), s.events))
            .collect();
        self.dispatcher.commit_appends(appends)
    }
}

