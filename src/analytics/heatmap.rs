//! Hourly and weekly detection heatmaps (`spec.md` §4.5).

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HourlyHeatmap {
    /// One entry per calendar day in the period, each with 24 raw counts.
    pub days: Vec<(NaiveDate, [u32; 24])>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeeklyHeatmap {
    /// `[weekday][hour]`, weekday 0 = Monday, averaged across however many
    /// times that weekday occurred in the period.
    pub weekday_hourly_average: [[f64; 24]; 7],
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Heatmap {
    Hourly(HourlyHeatmap),
    Weekly(WeeklyHeatmap),
}

/// Picks hourly vs weekly grouping by the period's span, per `spec.md`
/// §4.5 ("days ≤ 7" / "days > 7").
pub fn heatmap(timestamps: &[DateTime<Utc>], start: DateTime<Utc>, end: DateTime<Utc>) -> Heatmap {
    let span_days = (end - start).num_days();
    if span_days <= 7 {
        Heatmap::Hourly(hourly_heatmap(timestamps))
    } else {
        Heatmap::Weekly(weekly_heatmap(timestamps, start, end))
    }
}

fn hourly_heatmap(timestamps: &[DateTime<Utc>]) -> HourlyHeatmap {
    let mut by_day: BTreeMap<NaiveDate, [u32; 24]> = BTreeMap::new();
    for ts in timestamps {
        let entry = by_day.entry(ts.date_naive()).or_insert([0u32; 24]);
        entry[ts.hour() as usize] += 1;
    }
    HourlyHeatmap {
        days: by_day.into_iter().collect(),
    }
}

fn weekly_heatmap(timestamps: &[DateTime<Utc>], start: DateTime<Utc>, end: DateTime<Utc>) -> WeeklyHeatmap {
    let mut raw = [[0u32; 24]; 7];
    for ts in timestamps {
        let weekday = ts.weekday().num_days_from_monday() as usize;
        raw[weekday][ts.hour() as usize] += 1;
    }

    let occurrences = weekday_occurrences(start, end);

    let mut averaged = [[0.0f64; 24]; 7];
    for weekday in 0..7 {
        if occurrences[weekday] == 0 {
            continue;
        }
        for hour in 0..24 {
            averaged[weekday][hour] = f64::from(raw[weekday][hour]) / f64::from(occurrences[weekday]);
        }
    }

    WeeklyHeatmap {
        weekday_hourly_average: averaged,
    }
}

/// How many times each weekday (0 = Monday) falls within `[start, end)`.
fn weekday_occurrences(start: DateTime<Utc>, end: DateTime<Utc>) -> [u32; 7] {
    let mut counts = [0u32; 7];
    let mut day = start.date_naive();
    let end_day = end.date_naive();
    while day < end_day {
        counts[day.weekday().num_days_from_monday() as usize] += 1;
        day += Duration::days(1);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn short_period_produces_per_day_hourly_buckets() {
        let timestamps = vec![
            dt("2026-05-01T08:15:00Z"),
            dt("2026-05-01T08:45:00Z"),
            dt("2026-05-02T23:00:00Z"),
        ];
        let result = heatmap(&timestamps, dt("2026-05-01T00:00:00Z"), dt("2026-05-03T00:00:00Z"));
        let Heatmap::Hourly(h) = result else { panic!("expected hourly") };
        assert_eq!(h.days.len(), 2);
        assert_eq!(h.days[0].1[8], 2);
        assert_eq!(h.days[1].1[23], 1);
    }

    #[test]
    fn long_period_averages_by_weekday() {
        // Two Fridays, one detection at 08:00 each.
        let timestamps = vec![dt("2026-05-01T08:00:00Z"), dt("2026-05-08T08:00:00Z")];
        let result = heatmap(&timestamps, dt("2026-04-24T00:00:00Z"), dt("2026-05-15T00:00:00Z"));
        let Heatmap::Weekly(h) = result else { panic!("expected weekly") };
        let friday = chrono::Weekday::Fri.num_days_from_monday() as usize;
        assert!((h.weekday_hourly_average[friday][8] - (2.0 / 3.0)).abs() < 1e-9);
    }
}
