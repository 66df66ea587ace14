//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// A single violated business rule.
///
/// `rule` is a stable snake_case identifier callers can match on
/// (e.g. `discount_exceeds_subtotal`); `message` is human readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub message: String,
}

impl Violation {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Domain-level error.
///
/// Validation means "fix your input", conflict means "look at the current
/// state"; the two are never merged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more business rules rejected the caller's input.
    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<Violation>),

    /// A domain invariant was violated (indicates a bug or corrupted history).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity or aggregate does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested transition is illegal in the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DomainError {
    pub fn validation(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(rule, message)])
    }

    /// Build a validation error from collected violations.
    ///
    /// Returns `Ok(())` when nothing was violated, so callers can accumulate
    /// every failing rule and bail once.
    pub fn check(violations: Vec<Violation>) -> DomainResult<()> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self::Validation(violations))
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Rule identifiers of a validation error (empty for other kinds).
    pub fn rules(&self) -> Vec<&str> {
        match self {
            Self::Validation(v) => v.iter().map(|v| v.rule.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}
