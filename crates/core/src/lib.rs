//! `venuebook-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the offer, contract
//! and payment modules (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, Violation};
pub use id::{AggregateId, ClientId, TenantId, UserId};
pub use money::{Percent, round_money};
pub use value_object::ValueObject;
