//! Client access codes and payment references.
//!
//! Access codes combine randomness with a base-36 timestamp so bursts of
//! issuance on one contract number cannot collide on the random part alone.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::base36::to_base36;

pub const ACCESS_CODE_PREFIX: &str = "CLI";

/// Width of the random segment of an access code.
const RANDOM_WIDTH: usize = 6;
const RANDOM_SPACE: u64 = 36u64.pow(RANDOM_WIDTH as u32);

static ACCESS: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^CLI-\d{4,}-[A-Z0-9]{7,}$"));

static PAYMENT_REF: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^PAG-\d{8}-\d{4,}-[A-Z0-9]{6}$"));

fn padded_random(random: u64) -> String {
    format!("{:0>width$}", to_base36(random % RANDOM_SPACE), width = RANDOM_WIDTH)
}

/// `CLI-{contract:04}-{random}{timestamp}`, uppercase base 36.
pub fn access_code(contract_number: u64, random: u64, timestamp_millis: u64) -> String {
    format!(
        "{ACCESS_CODE_PREFIX}-{contract_number:04}-{}{}",
        padded_random(random),
        to_base36(timestamp_millis)
    )
}

pub fn is_access_code(code: &str) -> bool {
    ACCESS.as_ref().map(|re| re.is_match(code)).unwrap_or(false)
}

/// `PAG-{yyyymmdd}-{contract:04}-{random}` reference for a recorded payment.
pub fn payment_reference(date: NaiveDate, contract_number: u64, random: u64) -> String {
    format!(
        "PAG-{}-{contract_number:04}-{}",
        date.format("%Y%m%d"),
        padded_random(random)
    )
}

pub fn is_payment_reference(reference: &str) -> bool {
    PAYMENT_REF
        .as_ref()
        .map(|re| re.is_match(reference))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_code_layout() {
        let code = access_code(42, 35, 1_700_000_000_000);
        assert_eq!(code, "CLI-0042-00000ZLOYW3V28");
        assert!(is_access_code(&code));
    }

    #[test]
    fn same_random_different_instant_differs() {
        let a = access_code(7, 123_456, 1_700_000_000_000);
        let b = access_code(7, 123_456, 1_700_000_000_001);
        assert_ne!(a, b);
    }

    #[test]
    fn matcher_rejects_lowercase_and_short_codes() {
        assert!(!is_access_code("CLI-0042-abc"));
        assert!(!is_access_code("CLI-42-00000ZLOYW3V28"));
        assert!(!is_access_code("OF-2027-03-0001"));
    }

    #[test]
    fn payment_reference_layout() {
        let date = NaiveDate::from_ymd_opt(2027, 5, 9).unwrap();
        let reference = payment_reference(date, 3, 36);
        assert_eq!(reference, "PAG-20270509-0003-000010");
        assert!(is_payment_reference(&reference));
        assert!(!is_payment_reference("PAG-2027059-0003-000010"));
    }
}
