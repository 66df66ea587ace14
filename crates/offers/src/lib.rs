//! Offers domain module (event-sourced).
//!
//! An offer is a priced, not-yet-binding proposal. This crate holds the
//! quoting step (catalog → priced lines) and the `Offer` aggregate with its
//! pending → accepted/rejected state machine. No IO.

pub mod offer;
pub mod quote;

pub use offer::{
    AcceptOffer, AttachContract, ContractAttached, CreateOffer, Offer, OfferAccepted, OfferCommand,
    OfferCreated, OfferEvent, OfferId, OfferRejected, OfferStatus, OfferUpdated, RejectOffer,
    UpdateOffer,
};
pub use quote::{IncludedServiceLine, OfferTerms, Quote, QuotedServiceLine, ServiceSelection, quote};
