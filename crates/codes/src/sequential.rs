//! `{PREFIX}-{yyyy}-{mm}-{nnnn}` codes for offers and contracts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Offer,
    Contract,
}

impl CodeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CodeKind::Offer => "OF",
            CodeKind::Contract => "CONT",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "OF" => Some(CodeKind::Offer),
            "CONT" => Some(CodeKind::Contract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("malformed code: {0}")]
    Malformed(String),
}

/// A parsed sequential code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialCode {
    pub kind: CodeKind,
    pub year: i32,
    pub month: u32,
    pub sequence: u64,
}

// Sequences past 9999 simply widen.
static SEQUENTIAL: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(OF|CONT)-(\d{4})-(0[1-9]|1[0-2])-(\d{4,})$"));

/// Render a code. `sequence` is the already-reserved number (last + 1).
pub fn sequential_code(kind: CodeKind, year: i32, month: u32, sequence: u64) -> String {
    format!("{}-{year:04}-{month:02}-{sequence:04}", kind.prefix())
}

pub fn parse_sequential_code(code: &str) -> Result<SequentialCode, CodeError> {
    let malformed = || CodeError::Malformed(code.to_string());
    let re = SEQUENTIAL.as_ref().map_err(|_| malformed())?;
    let caps = re.captures(code).ok_or_else(malformed)?;

    let kind = CodeKind::from_prefix(&caps[1]).ok_or_else(malformed)?;
    let year = caps[2].parse().map_err(|_| malformed())?;
    let month = caps[3].parse().map_err(|_| malformed())?;
    let sequence = caps[4].parse().map_err(|_| malformed())?;

    Ok(SequentialCode { kind, year, month, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(sequential_code(CodeKind::Offer, 2027, 3, 7), "OF-2027-03-0007");
        assert_eq!(sequential_code(CodeKind::Contract, 2027, 11, 1234), "CONT-2027-11-1234");
        assert_eq!(sequential_code(CodeKind::Offer, 2027, 1, 12_345), "OF-2027-01-12345");
    }

    #[test]
    fn rejects_foreign_formats() {
        for bad in ["OF-2027-3-0007", "OF-2027-13-0001", "INV-2027-03-0001", "CONT-2027-03-12", "of-2027-03-0001"] {
            assert!(parse_sequential_code(bad).is_err(), "{bad} should not parse");
        }
    }

    proptest! {
        #[test]
        fn generated_codes_parse_back(
            contract in any::<bool>(),
            year in 2000i32..2100,
            month in 1u32..=12,
            sequence in 1u64..1_000_000,
        ) {
            let kind = if contract { CodeKind::Contract } else { CodeKind::Offer };
            let code = sequential_code(kind, year, month, sequence);
            prop_assert_eq!(
                parse_sequential_code(&code).unwrap(),
                SequentialCode { kind, year, month, sequence }
            );
        }
    }
}
