//! Human-readable codes for offers, contracts, client access and payments.
//!
//! Generators are pure: the sequence number, randomness and timestamp are all
//! supplied by the caller. Each format has a matcher so stored codes can be
//! checked independently of how they were produced.

pub mod access;
pub mod base36;
pub mod sequential;

pub use access::{
    ACCESS_CODE_PREFIX, access_code, is_access_code, is_payment_reference, payment_reference,
};
pub use base36::to_base36;
pub use sequential::{CodeError, CodeKind, SequentialCode, parse_sequential_code, sequential_code};
