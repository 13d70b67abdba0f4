//! Time-period boundary calendar logic (`spec.md` §4.5, §6).
//!
//! All boundaries are computed directly in UTC. The spec's own rationale
//! for 24-hour days "even across DST transitions" is that start/end are
//! normalised in UTC in the first place — there is no local wall-clock
//! arithmetic here to go wrong across a DST jump. `LocationConfig::timezone`
//! is carried for display purposes elsewhere; period boundaries do not
//! consult it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Season,
    Year,
    Historical,
}

/// `[start, end)` in UTC for `period`, anchored at `reference` (normally
/// "now"). `Historical` has no natural end other than `reference` and no
/// natural start other than the oldest record the caller knows about,
/// hence `oldest_record`.
pub fn boundaries(period: Period, reference: DateTime<Utc>, oldest_record: Option<DateTime<Utc>>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = reference.date_naive();

    match period {
        Period::Day => (day_start(today), day_start(today) + Duration::days(1)),
        Period::Week => {
            let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            (day_start(monday), day_start(monday) + Duration::days(7))
        }
        Period::Month => {
            let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).expect("valid calendar date");
            let (next_year, next_month) = if today.month() == 12 { (today.year() + 1, 1) } else { (today.year(), today.month() + 1) };
            let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid calendar date");
            (day_start(start), day_start(end))
        }
        Period::Season => season_boundaries(today),
        Period::Year => {
            let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).expect("valid calendar date");
            let end = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).expect("valid calendar date");
            (day_start(start), day_start(end))
        }
        Period::Historical => {
            let start = oldest_record.unwrap_or(reference);
            (start, reference)
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight always exists").and_utc()
}

/// Spring = Mar-May, Summer = Jun-Aug, Fall = Sep-Nov, Winter = Dec-Feb.
/// A Winter reference in December starts that December and ends the
/// following March 1st, crossing the year boundary; a Winter reference in
/// January/February belongs to the Winter that started the *previous*
/// December.
fn season_boundaries(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = today.year();
    let month = today.month();

    let (start, end) = match month {
        3..=5 => (
            NaiveDate::from_ymd_opt(year, 3, 1).expect("valid calendar date"),
            NaiveDate::from_ymd_opt(year, 6, 1).expect("valid calendar date"),
        ),
        6..=8 => (
            NaiveDate::from_ymd_opt(year, 6, 1).expect("valid calendar date"),
            NaiveDate::from_ymd_opt(year, 9, 1).expect("valid calendar date"),
        ),
        9..=11 => (
            NaiveDate::from_ymd_opt(year, 9, 1).expect("valid calendar date"),
            NaiveDate::from_ymd_opt(year, 12, 1).expect("valid calendar date"),
        ),
        12 => (
            NaiveDate::from_ymd_opt(year, 12, 1).expect("valid calendar date"),
            NaiveDate::from_ymd_opt(year + 1, 3, 1).expect("valid calendar date"),
        ),
        // January or February: Winter started the previous December.
        _ => (
            NaiveDate::from_ymd_opt(year - 1, 12, 1).expect("valid calendar date"),
            NaiveDate::from_ymd_opt(year, 3, 1).expect("valid calendar date"),
        ),
    };

    (day_start(start), day_start(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn day_boundary_is_exactly_24_hours() {
        let (start, end) = boundaries(Period::Day, dt("2026-05-01T14:32:00Z"), None);
        assert_eq!(start, dt("2026-05-01T00:00:00Z"));
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn week_boundary_starts_on_monday() {
        let (start, _end) = boundaries(Period::Week, dt("2026-05-01T14:32:00Z"), None); // a Friday
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn december_winter_crosses_the_year_boundary() {
        let (start, end) = boundaries(Period::Season, dt("2026-12-15T00:00:00Z"), None);
        assert_eq!(start, dt("2026-12-01T00:00:00Z"));
        assert_eq!(end, dt("2027-03-01T00:00:00Z"));
    }

    #[test]
    fn january_winter_belongs_to_previous_decembers_season() {
        let (start, end) = boundaries(Period::Season, dt("2027-01-15T00:00:00Z"), None);
        assert_eq!(start, dt("2026-12-01T00:00:00Z"));
        assert_eq!(end, dt("2027-03-01T00:00:00Z"));
    }

    #[test]
    fn historical_falls_back_to_reference_with_no_oldest_record() {
        let reference = dt("2026-05-01T00:00:00Z");
        let (start, end) = boundaries(Period::Historical, reference, None);
        assert_eq!(start, end);
    }

    #[test]
    fn historical_spans_from_the_oldest_record() {
        let reference = dt("2026-05-01T00:00:00Z");
        let oldest = dt("2020-01-01T00:00:00Z");
        let (start, end) = boundaries(Period::Historical, reference, Some(oldest));
        assert_eq!(start, oldest);
        assert_eq!(end, reference);
    }
}
