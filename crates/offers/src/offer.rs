use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use venuebook_events::Event;

use crate::quote::{OfferTerms, Quote};

/// Offer identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub AggregateId);

impl OfferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OfferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    /// The only legal edges are pending → accepted and pending → rejected.
    /// Anything else (including repeating a terminal transition) is a conflict.
    pub fn transition(self, to: OfferStatus) -> Result<OfferStatus, DomainError> {
        match (self, to) {
            (OfferStatus::Pending, OfferStatus::Accepted | OfferStatus::Rejected) => Ok(to),
            (from, to) => Err(DomainError::conflict(format!(
                "offer cannot move from {from:?} to {to:?}"
            ))),
        }
    }
}

/// Aggregate root: Offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    id: OfferId,
    tenant_id: Option<TenantId>,
    code: String,
    terms: Option<OfferTerms>,
    quote: Option<Quote>,
    status: OfferStatus,
    responded_at: Option<DateTime<Utc>>,
    reject_reason: Option<String>,
    contract_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

impl Offer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OfferId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            terms: None,
            quote: None,
            status: OfferStatus::Pending,
            responded_at: None,
            reject_reason: None,
            contract_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OfferId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn terms(&self) -> Option<&OfferTerms> {
        self.terms.as_ref()
    }

    pub fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn status(&self) -> OfferStatus {
        self.status
    }

    pub fn responded_at(&self) -> Option<DateTime<Utc>> {
        self.responded_at
    }

    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// The contract this offer was converted into, if any.
    pub fn contract_id(&self) -> Option<AggregateId> {
        self.contract_id
    }
}

impl AggregateRoot for Offer {
    type Id = OfferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOffer.
///
/// `code` comes from the offer sequence reserved in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOffer {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub code: String,
    pub terms: OfferTerms,
    pub quote: Quote,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOffer. Re-prices; never changes the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOffer {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub terms: OfferTerms,
    pub quote: Quote,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOffer {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOffer {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachContract. Claims the offer for exactly one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachContract {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub contract_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferCommand {
    CreateOffer(CreateOffer),
    UpdateOffer(UpdateOffer),
    AcceptOffer(AcceptOffer),
    RejectOffer(RejectOffer),
    AttachContract(AttachContract),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub code: String,
    pub terms: OfferTerms,
    pub quote: Quote,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferUpdated {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub terms: OfferTerms,
    pub quote: Quote,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferAccepted {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRejected {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAttached {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub contract_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferEvent {
    OfferCreated(OfferCreated),
    OfferUpdated(OfferUpdated),
    OfferAccepted(OfferAccepted),
    OfferRejected(OfferRejected),
    ContractAttached(ContractAttached),
}

impl Event for OfferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OfferEvent::OfferCreated(_) => "offers.offer.created",
            OfferEvent::OfferUpdated(_) => "offers.offer.updated",
            OfferEvent::OfferAccepted(_) => "offers.offer.accepted",
            OfferEvent::OfferRejected(_) => "offers.offer.rejected",
            OfferEvent::ContractAttached(_) => "offers.offer.contract_attached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OfferEvent::OfferCreated(e) => e.occurred_at,
            OfferEvent::OfferUpdated(e) => e.occurred_at,
            OfferEvent::OfferAccepted(e) => e.occurred_at,
            OfferEvent::OfferRejected(e) => e.occurred_at,
            OfferEvent::ContractAttached(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Offer {
    type Command = OfferCommand;
    type Event = OfferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OfferEvent::OfferCreated(e) => {
                self.id = e.offer_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.terms = Some(e.terms.clone());
                self.quote = Some(e.quote.clone());
                self.status = OfferStatus::Pending;
                self.created = true;
            }
            OfferEvent::OfferUpdated(e) => {
                self.terms = Some(e.terms.clone());
                self.quote = Some(e.quote.clone());
            }
            OfferEvent::OfferAccepted(e) => {
                self.status = OfferStatus::Accepted;
                self.responded_at = Some(e.occurred_at);
            }
            OfferEvent::OfferRejected(e) => {
                self.status = OfferStatus::Rejected;
                self.responded_at = Some(e.occurred_at);
                self.reject_reason = e.reason.clone();
            }
            OfferEvent::ContractAttached(e) => {
                self.contract_id = Some(e.contract_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OfferCommand::CreateOffer(cmd) => self.handle_create(cmd),
            OfferCommand::UpdateOffer(cmd) => self.handle_update(cmd),
            OfferCommand::AcceptOffer(cmd) => self.handle_accept(cmd),
            OfferCommand::RejectOffer(cmd) => self.handle_reject(cmd),
            OfferCommand::AttachContract(cmd) => self.handle_attach_contract(cmd),
        }
    }
}

impl Offer {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_offer_id(&self, offer_id: OfferId) -> Result<(), DomainError> {
        if self.id != offer_id {
            return Err(DomainError::invariant("offer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, offer_id: OfferId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("offer {offer_id}")));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_offer_id(offer_id)
    }

    fn ensure_priced(terms: &OfferTerms, quote: &Quote, occurred_at: DateTime<Utc>) -> Result<(), DomainError> {
        terms.validate(occurred_at.date_naive())?;
        if quote.breakdown.guest_count != terms.guest_count || quote.package_id != terms.package_id {
            return Err(DomainError::invariant("quote does not match offer terms"));
        }
        if quote.total() < Decimal::ZERO {
            return Err(DomainError::validation("negative_total", "offer total is negative"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOffer) -> Result<Vec<OfferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("offer already exists"));
        }
        Self::ensure_priced(&cmd.terms, &cmd.quote, cmd.occurred_at)?;

        Ok(vec![OfferEvent::OfferCreated(OfferCreated {
            tenant_id: cmd.tenant_id,
            offer_id: cmd.offer_id,
            code: cmd.code.clone(),
            terms: cmd.terms.clone(),
            quote: cmd.quote.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateOffer) -> Result<Vec<OfferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.offer_id)?;

        if self.status != OfferStatus::Pending {
            return Err(DomainError::conflict(format!(
                "offer {} is {:?}; only pending offers can be edited",
                self.code, self.status
            )));
        }
        if self.contract_id.is_some() {
            return Err(DomainError::conflict(format!(
                "offer {} is referenced by a contract",
                self.code
            )));
        }
        Self::ensure_priced(&cmd.terms, &cmd.quote, cmd.occurred_at)?;

        Ok(vec![OfferEvent::OfferUpdated(OfferUpdated {
            tenant_id: cmd.tenant_id,
            offer_id: cmd.offer_id,
            terms: cmd.terms.clone(),
            quote: cmd.quote.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptOffer) -> Result<Vec<OfferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.offer_id)?;
        self.status.transition(OfferStatus::Accepted)?;

        Ok(vec![OfferEvent::OfferAccepted(OfferAccepted {
            tenant_id: cmd.tenant_id,
            offer_id: cmd.offer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectOffer) -> Result<Vec<OfferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.offer_id)?;
        self.status.transition(OfferStatus::Rejected)?;

        Ok(vec![OfferEvent::OfferRejected(OfferRejected {
            tenant_id: cmd.tenant_id,
            offer_id: cmd.offer_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_contract(&self, cmd: &AttachContract) -> Result<Vec<OfferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.offer_id)?;

        if let Some(existing) = self.contract_id {
            return Err(DomainError::conflict(format!(
                "offer {} already has contract {existing}",
                self.code
            )));
        }
        if self.status != OfferStatus::Accepted {
            return Err(DomainError::validation(
                "offer_not_accepted",
                format!("offer {} is {:?}", self.code, self.status),
            ));
        }
        if self.quote.as_ref().is_some_and(|q| q.total() < Decimal::ZERO) {
            return Err(DomainError::validation("negative_total", "offer total is negative"));
        }

        Ok(vec![OfferEvent::ContractAttached(ContractAttached {
            tenant_id: cmd.tenant_id,
            offer_id: cmd.offer_id,
            contract_id: cmd.contract_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::fixtures::{catalog, d, terms};
    use crate::quote::quote;
    use chrono::TimeZone;
    use venuebook_events::execute;
    use venuebook_pricing::TaxConfig;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, 10, 12, 0, 0).unwrap()
    }

    fn created_offer() -> (Offer, TenantId, OfferId) {
        let tenant_id = TenantId::new();
        let offer_id = OfferId::new(AggregateId::new());
        let mut offer = Offer::empty(offer_id);
        let t = terms();
        let q = quote(&catalog(), &t, TaxConfig::default()).unwrap();
        execute(
            &mut offer,
            &OfferCommand::CreateOffer(CreateOffer {
                tenant_id,
                offer_id,
                code: "OF-2027-01-0001".into(),
                terms: t,
                quote: q,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (offer, tenant_id, offer_id)
    }

    fn accept(tenant_id: TenantId, offer_id: OfferId) -> OfferCommand {
        OfferCommand::AcceptOffer(AcceptOffer { tenant_id, offer_id, occurred_at: test_time() })
    }

    fn reject(tenant_id: TenantId, offer_id: OfferId) -> OfferCommand {
        OfferCommand::RejectOffer(RejectOffer {
            tenant_id,
            offer_id,
            reason: Some("Chose another venue".into()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_offer_starts_pending_with_priced_quote() {
        let (offer, tenant_id, _) = created_offer();
        assert_eq!(offer.status(), OfferStatus::Pending);
        assert_eq!(offer.tenant_id(), Some(tenant_id));
        assert_eq!(offer.code(), "OF-2027-01-0001");
        assert_eq!(offer.quote().unwrap().total(), d(4500));
        assert_eq!(offer.version(), 1);
    }

    #[test]
    fn create_rejects_past_event_date_and_zero_guests() {
        let offer_id = OfferId::new(AggregateId::new());
        let offer = Offer::empty(offer_id);
        let mut t = terms();
        let q = quote(&catalog(), &t, TaxConfig::default()).unwrap();
        t.guest_count = 0;
        let err = offer
            .handle(&OfferCommand::CreateOffer(CreateOffer {
                tenant_id: TenantId::new(),
                offer_id,
                code: "OF-2027-06-0002".into(),
                terms: t.clone(),
                quote: q,
                occurred_at: Utc.with_ymd_and_hms(2027, 7, 1, 0, 0, 0).unwrap(),
            }))
            .unwrap_err();
        assert_eq!(err.rules(), vec!["guest_count_min", "event_date_not_future"]);
    }

    #[test]
    fn update_reprices_but_keeps_code() {
        let (mut offer, tenant_id, offer_id) = created_offer();
        let mut t = terms();
        t.discount = d(600);
        let q = quote(&catalog(), &t, TaxConfig::default()).unwrap();
        execute(
            &mut offer,
            &OfferCommand::UpdateOffer(UpdateOffer {
                tenant_id,
                offer_id,
                terms: t,
                quote: q,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(offer.code(), "OF-2027-01-0001");
        assert_eq!(offer.quote().unwrap().breakdown.subtotal_after_discount, d(3000));
        assert_eq!(offer.quote().unwrap().total(), d(3750));
    }

    #[test]
    fn accept_then_edit_is_a_conflict() {
        let (mut offer, tenant_id, offer_id) = created_offer();
        execute(&mut offer, &accept(tenant_id, offer_id)).unwrap();
        assert_eq!(offer.status(), OfferStatus::Accepted);
        assert_eq!(offer.responded_at(), Some(test_time()));

        let t = terms();
        let q = quote(&catalog(), &t, TaxConfig::default()).unwrap();
        let err = offer
            .handle(&OfferCommand::UpdateOffer(UpdateOffer {
                tenant_id,
                offer_id,
                terms: t,
                quote: q,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn repeating_a_terminal_transition_is_a_conflict() {
        let (mut offer, tenant_id, offer_id) = created_offer();
        execute(&mut offer, &reject(tenant_id, offer_id)).unwrap();
        assert_eq!(offer.reject_reason(), Some("Chose another venue"));

        assert!(matches!(offer.handle(&reject(tenant_id, offer_id)), Err(DomainError::Conflict(_))));
        assert!(matches!(offer.handle(&accept(tenant_id, offer_id)), Err(DomainError::Conflict(_))));
        assert_eq!(offer.version(), 2);
    }

    #[test]
    fn accepting_twice_is_a_conflict() {
        let (mut offer, tenant_id, offer_id) = created_offer();
        execute(&mut offer, &accept(tenant_id, offer_id)).unwrap();
        assert!(matches!(offer.handle(&accept(tenant_id, offer_id)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn attach_contract_requires_acceptance_and_is_one_shot() {
        let (mut offer, tenant_id, offer_id) = created_offer();
        let attach = |contract_id| {
            OfferCommand::AttachContract(AttachContract {
                tenant_id,
                offer_id,
                contract_id,
                occurred_at: test_time(),
            })
        };

        let err = offer.handle(&attach(AggregateId::new())).unwrap_err();
        assert_eq!(err.rules(), vec!["offer_not_accepted"]);

        execute(&mut offer, &accept(tenant_id, offer_id)).unwrap();
        let first = AggregateId::new();
        execute(&mut offer, &attach(first)).unwrap();
        assert_eq!(offer.contract_id(), Some(first));

        let err = offer.handle(&attach(AggregateId::new())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn commands_on_missing_offer_are_not_found() {
        let offer_id = OfferId::new(AggregateId::new());
        let offer = Offer::empty(offer_id);
        let err = offer.handle(&accept(TenantId::new(), offer_id)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn status_transition_table() {
        use OfferStatus::*;
        assert_eq!(Pending.transition(Accepted).unwrap(), Accepted);
        assert_eq!(Pending.transition(Rejected).unwrap(), Rejected);
        for (from, to) in [(Pending, Pending), (Accepted, Rejected), (Rejected, Accepted), (Accepted, Accepted)] {
            assert!(from.transition(to).is_err());
        }
    }
}
