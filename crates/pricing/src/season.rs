//! Season Resolver: event date → seasonal pricing tier.

use chrono::{Datelike, NaiveDate};

use crate::catalog::Season;
use crate::engine::PricingError;

/// Find the season whose month list contains `date`'s month.
///
/// Seasons are scanned in catalog order; the first match wins.
pub fn resolve_season(date: NaiveDate, seasons: &[Season]) -> Result<&Season, PricingError> {
    let month = date.month();
    seasons
        .iter()
        .find(|s| s.covers_month(month))
        .ok_or(PricingError::NoSeasonForDate(date))
}
