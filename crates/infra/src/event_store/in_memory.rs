use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use venuebook_core::{AggregateId, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store.
///
/// A single write lock covers the version checks and the writes of a
/// multi-stream append, which makes it atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event, ordered by stream then sequence (replay support).
    pub fn all_events(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let mut all: Vec<StoredEvent> = streams.values().flatten().cloned().collect();
        all.sort_by(|a, b| {
            (a.tenant_id.as_uuid(), a.aggregate_id.as_uuid(), a.sequence_number).cmp(&(
                b.tenant_id.as_uuid(),
                b.aggregate_id.as_uuid(),
                b.sequence_number,
            ))
        });
        Ok(all)
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Checks that a batch targets exactly one stream and returns its key.
    fn batch_key(events: &[UncommittedEvent]) -> Result<Option<(StreamKey, &str)>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(None);
        };

        for (idx, e) in events.iter().enumerate() {
            if e.tenant_id != first.tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != first.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let key = StreamKey {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
        };
        Ok(Some((key, first.aggregate_type.as_str())))
    }
}

impl EventStore for InMemoryEventStore {
    fn append_streams(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Validate everything before writing anything.
        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(appends.len());
        for append in &appends {
            let Some((key, aggregate_type)) = Self::batch_key(&append.events)? else {
                continue;
            };
            if !seen.insert(key) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one transaction",
                    key.aggregate_id
                )));
            }

            let stream = streams.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    key.aggregate_id, append.expected_version
                )));
            }
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, aggregate_type
                    )));
                }
            }
            planned.push((key, current));
        }

        let mut committed = Vec::new();
        let batches = appends.into_iter().filter(|a| !a.events.is_empty());
        for ((key, current), append) in planned.into_iter().zip(batches) {
            let stream = streams.entry(key).or_default();
            let mut next = current + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_last(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).and_then(|stream| stream.last().cloned()))
    }
}
