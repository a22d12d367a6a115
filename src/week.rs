//! Week identifier calculation
//!
//! Weekly assignments are partitioned by ISO-8601 week so every client
//! derives the same key for the same calendar week, with no shared state
//! and no locale dependence.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Stable key for the ISO-8601 week containing `date`.
///
/// Format: `"{isoYear}-w{week}"` with no zero padding, e.g. `"2024-w30"`
/// or `"2025-w1"`. Weeks run Monday through Sunday and belong to the year
/// containing their Thursday, so near January 1 the ISO year can differ
/// from the calendar year.
pub fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-w{}", iso.year(), iso.week())
}

/// Week key for an instant, projected to its UTC calendar date.
pub fn week_key_for(instant: DateTime<Utc>) -> String {
    week_key(instant.date_naive())
}
