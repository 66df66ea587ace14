//! Per-kind sequence counters for human-readable codes.
//!
//! Each counter is its own event stream with a fixed id, so reserving the next
//! number is an ordinary staged write: the transaction that creates the
//! numbered offer or contract also advances the counter, and two racing
//! creations cannot both commit the same number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use venuebook_codes::CodeKind;
use venuebook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use venuebook_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceCounterId(pub AggregateId);

impl SequenceCounterId {
    /// The well-known stream of a code kind (the same id in every tenant).
    pub fn for_kind(kind: CodeKind) -> Self {
        let raw = match kind {
            CodeKind::Offer => 0x5645_4e55_4500_0000_0000_0000_0000_0001u128,
            CodeKind::Contract => 0x5645_4e55_4500_0000_0000_0000_0000_0002u128,
        };
        Self(AggregateId::from_uuid(Uuid::from_u128(raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    id: SequenceCounterId,
    tenant_id: Option<TenantId>,
    last: u64,
    version: u64,
}

impl SequenceCounter {
    pub fn empty(id: SequenceCounterId) -> Self {
        Self {
            id,
            tenant_id: None,
            last: 0,
            version: 0,
        }
    }

    /// Rebuild from the most recent reservation and the stream version it
    /// was stored at.
    pub fn restore(id: SequenceCounterId, latest: &SequenceReserved, version: u64) -> Self {
        Self {
            id,
            tenant_id: Some(latest.tenant_id),
            last: latest.value,
            version,
        }
    }

    pub fn id_typed(&self) -> SequenceCounterId {
        self.id
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

impl AggregateRoot for SequenceCounter {
    type Id = SequenceCounterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReserved {
    pub tenant_id: TenantId,
    pub value: u64,
    pub occurred_at: DateTime<Utc>,
}

impl Event for SequenceReserved {
    fn event_type(&self) -> &'static str {
        "venuebook.sequence.reserved"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl Aggregate for SequenceCounter {
    type Command = Reserve;
    type Event = SequenceReserved;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.tenant_id = Some(event.tenant_id);
        self.last = event.value;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.tenant_id.is_some_and(|t| t != command.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }

        Ok(vec![SequenceReserved {
            tenant_id: command.tenant_id,
            value: self.last + 1,
            occurred_at: command.occurred_at,
        }])
    }
}
