use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use venuebook_codes::{CodeKind, sequential_code};
use venuebook_core::{AggregateId, TenantId};
use venuebook_events::{EventBus, EventEnvelope};
use venuebook_offers::{
    AcceptOffer, CreateOffer, Offer, OfferCommand, OfferId, OfferTerms, Quote, RejectOffer, UpdateOffer, quote,
};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::sequence::{Reserve, SequenceCounter, SequenceCounterId};
use crate::services::VenueEngine;

/// Offer drafting: pricing, numbering and the pending → accepted/rejected
/// lifecycle.
pub struct OfferLifecycle<'e, S, B> {
    engine: &'e VenueEngine<S, B>,
}

impl<'e, S, B> OfferLifecycle<'e, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(engine: &'e VenueEngine<S, B>) -> Self {
        Self { engine }
    }

    /// Price terms without persisting anything.
    pub fn preview(&self, terms: &OfferTerms, today: NaiveDate) -> Result<Quote, DispatchError> {
        terms.validate(today)?;
        Ok(quote(self.engine.catalog(), terms, self.engine.config().tax)?)
    }

    /// Create a pending offer with the next `OF-YYYY-MM-NNNN` code.
    pub fn create(
        &self,
        tenant_id: TenantId,
        terms: OfferTerms,
        occurred_at: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        let priced = self.preview(&terms, occurred_at.date_naive())?;

        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut counter = tx.load_latest::<SequenceCounter>(SequenceCounterId::for_kind(CodeKind::Offer).0)?;
        let reserved = tx.execute(&mut counter, &Reserve { tenant_id, occurred_at })?;
        let sequence = reserved.last().map(|r| r.value).unwrap_or(counter.last());
        tracing::debug!(tenant_id = %tenant_id, kind = "offer", sequence, "sequence reserved");
        let code = sequential_code(CodeKind::Offer, occurred_at.year(), occurred_at.month(), sequence);

        let offer_id = OfferId::new(AggregateId::new());
        let mut offer = tx.load::<Offer>(offer_id.0)?;
        tx.execute(
            &mut offer,
            &OfferCommand::CreateOffer(CreateOffer {
                tenant_id,
                offer_id,
                code,
                terms,
                quote: priced,
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;

        tracing::info!(
            tenant_id = %tenant_id,
            offer_id = %offer_id,
            code = %offer.code(),
            total = %offer.quote().map(Quote::total).unwrap_or_default(),
            "offer created"
        );
        Ok(offer)
    }

    /// Replace the terms of a pending offer and re-price it.
    pub fn update(
        &self,
        tenant_id: TenantId,
        offer_id: OfferId,
        terms: OfferTerms,
        occurred_at: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        let priced = self.preview(&terms, occurred_at.date_naive())?;
        self.run(
            tenant_id,
            offer_id,
            OfferCommand::UpdateOffer(UpdateOffer {
                tenant_id,
                offer_id,
                terms,
                quote: priced,
                occurred_at,
            }),
        )
    }

    pub fn accept(
        &self,
        tenant_id: TenantId,
        offer_id: OfferId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        let offer = self.run(
            tenant_id,
            offer_id,
            OfferCommand::AcceptOffer(AcceptOffer {
                tenant_id,
                offer_id,
                occurred_at,
            }),
        )?;
        tracing::info!(tenant_id = %tenant_id, offer_id = %offer_id, "offer accepted");
        Ok(offer)
    }

    pub fn reject(
        &self,
        tenant_id: TenantId,
        offer_id: OfferId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        let offer = self.run(
            tenant_id,
            offer_id,
            OfferCommand::RejectOffer(RejectOffer {
                tenant_id,
                offer_id,
                reason,
                occurred_at,
            }),
        )?;
        tracing::info!(tenant_id = %tenant_id, offer_id = %offer_id, "offer rejected");
        Ok(offer)
    }

    pub fn get(&self, tenant_id: TenantId, offer_id: OfferId) -> Result<Offer, DispatchError> {
        self.engine.offer(tenant_id, offer_id)
    }

    fn run(&self, tenant_id: TenantId, offer_id: OfferId, command: OfferCommand) -> Result<Offer, DispatchError> {
        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut offer = tx.load::<Offer>(offer_id.0)?;
        tx.execute(&mut offer, &command)?;
        self.engine.commit(tx)?;
        Ok(offer)
    }
}
