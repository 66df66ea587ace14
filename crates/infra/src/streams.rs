//! Binding between domain aggregates and their event streams.

use venuebook_contracts::{Contract, ContractId, Payment, PaymentId, VersionLog, VersionLogId};
use venuebook_core::{Aggregate, AggregateId, DomainError};
use venuebook_offers::{Offer, OfferId};

use crate::sequence::{SequenceCounter, SequenceCounterId};

pub const OFFER: &str = "offers.offer";
pub const CONTRACT: &str = "contracts.contract";
pub const PAYMENT: &str = "contracts.payment";
pub const VERSION_LOG: &str = "contracts.version_log";
pub const SEQUENCE: &str = "venuebook.sequence";

/// An aggregate persisted as one event stream per instance.
pub trait EventSourced: Aggregate<Error = DomainError> {
    /// Stream type recorded on every stored event; stable across releases.
    const AGGREGATE_TYPE: &'static str;

    /// Fresh instance to replay history into.
    fn empty_for(id: AggregateId) -> Self;

    fn stream_id(&self) -> AggregateId;
}

/// An aggregate whose whole state is carried by its latest event, so it can
/// be restored from the stream head without replaying history.
pub trait CompactStream: EventSourced {
    fn restore(id: AggregateId, latest: &Self::Event, version: u64) -> Self;
}

impl EventSourced for Offer {
    const AGGREGATE_TYPE: &'static str = OFFER;

    fn empty_for(id: AggregateId) -> Self {
        Offer::empty(OfferId::new(id))
    }

    fn stream_id(&self) -> AggregateId {
        self.id_typed().0
    }
}

impl EventSourced for Contract {
    const AGGREGATE_TYPE: &'static str = CONTRACT;

    fn empty_for(id: AggregateId) -> Self {
        Contract::empty(ContractId::new(id))
    }

    fn stream_id(&self) -> AggregateId {
        self.id_typed().0
    }
}

impl EventSourced for Payment {
    const AGGREGATE_TYPE: &'static str = PAYMENT;

    fn empty_for(id: AggregateId) -> Self {
        Payment::empty(PaymentId::new(id))
    }

    fn stream_id(&self) -> AggregateId {
        self.id_typed().0
    }
}

impl EventSourced for VersionLog {
    const AGGREGATE_TYPE: &'static str = VERSION_LOG;

    fn empty_for(id: AggregateId) -> Self {
        VersionLog::empty(VersionLogId::new(id))
    }

    fn stream_id(&self) -> AggregateId {
        self.id_typed().0
    }
}

impl EventSourced for SequenceCounter {
    const AGGREGATE_TYPE: &'static str = SEQUENCE;

    fn empty_for(id: AggregateId) -> Self {
        SequenceCounter::empty(SequenceCounterId(id))
    }

    fn stream_id(&self) -> AggregateId {
        self.id_typed().0
    }
}

impl CompactStream for SequenceCounter {
    fn restore(id: AggregateId, latest: &Self::Event, version: u64) -> Self {
        SequenceCounter::restore(SequenceCounterId(id), latest, version)
    }
}
