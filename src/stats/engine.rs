//! Pure aggregation functions
//!
//! Everything here operates on in-memory slices of already-fetched records.
//! No streaming, no incremental state: callers fetch via range/equality
//! queries and hand the whole list over. Accessor closures keep the
//! functions record-type agnostic.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::stats::dates::{day_key, month_key, week_key};

/// Relative-change threshold separating a trend from noise, in percent
pub const TREND_THRESHOLD_PERCENT: f64 = 5.0;

/// Round half away from zero to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to a whole percent
pub fn round_percent(value: f64) -> f64 {
    value.round()
}

/// Count + summed quantity for one breakdown bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTotals {
    pub records: u64,
    pub quantity: f64,
}

/// Group records by a key, accumulating count and summed quantity.
/// Records with no key land in a literal "Unknown" bucket.
pub fn breakdown_by_key<T>(
    records: &[T],
    key: impl Fn(&T) -> Option<String>,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<String, GroupTotals> {
    let mut groups: BTreeMap<String, GroupTotals> = BTreeMap::new();

    for record in records {
        let bucket = key(record)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let entry = groups.entry(bucket).or_default();
        entry.records += 1;
        entry.quantity += value(record);
    }

    groups
}

/// Plain count per key, "Unknown" for missing
pub fn count_by_key<T>(
    records: &[T],
    key: impl Fn(&T) -> Option<String>,
) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for record in records {
        let bucket = key(record)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        *counts.entry(bucket).or_default() += 1;
    }

    counts
}

/// Summed value per calendar day
pub fn daily_totals<T>(
    records: &[T],
    date: impl Fn(&T) -> &str,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<String, f64> {
    bucket_totals(records, |r| day_key(date(r)), value)
}

/// Summed value per ISO week (`year-Wnn`)
pub fn weekly_totals<T>(
    records: &[T],
    date: impl Fn(&T) -> &str,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<String, f64> {
    bucket_totals(records, |r| week_key(date(r)), value)
}

/// Summed value per calendar month (`year-month`)
pub fn monthly_totals<T>(
    records: &[T],
    date: impl Fn(&T) -> &str,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<String, f64> {
    bucket_totals(records, |r| month_key(date(r)), value)
}

fn bucket_totals<T>(
    records: &[T],
    bucket: impl Fn(&T) -> String,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(bucket(record)).or_default() += value(record);
    }
    totals
}

/// Average/max/min across bucket totals, plus the bucket count
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub average_daily: f64,
    pub max_daily: f64,
    pub min_daily: f64,
    pub total_days: u64,
}

/// Summarize a daily-totals map. Empty input yields None.
pub fn period_summary(daily: &BTreeMap<String, f64>) -> Option<PeriodSummary> {
    if daily.is_empty() {
        return None;
    }

    let values: Vec<f64> = daily.values().copied().collect();
    let sum: f64 = values.iter().sum();
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    let min = values.iter().cloned().fold(f64::MAX, f64::min);

    Some(PeriodSummary {
        average_daily: round2(sum / values.len() as f64),
        max_daily: max,
        min_daily: min,
        total_days: values.len() as u64,
    })
}

/// Totals plus a period summary for a set of production records
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
    pub total_quantity: f64,
    pub total_records: u64,
    pub average_per_day: f64,
    pub max_daily: f64,
    pub min_daily: f64,
}

/// Production roll-up: grand total, record count, and daily aggregates
pub fn production_summary<T>(
    records: &[T],
    date: impl Fn(&T) -> &str,
    value: impl Fn(&T) -> f64,
) -> ProductionSummary {
    let total: f64 = records.iter().map(&value).sum();
    let daily = daily_totals(records, date, value);

    match period_summary(&daily) {
        Some(summary) => ProductionSummary {
            total_quantity: total,
            total_records: records.len() as u64,
            average_per_day: summary.average_daily,
            max_daily: summary.max_daily,
            min_daily: summary.min_daily,
        },
        None => ProductionSummary {
            total_quantity: 0.0,
            total_records: 0,
            average_per_day: 0.0,
            max_daily: 0.0,
            min_daily: 0.0,
        },
    }
}

/// Direction and magnitude of a first-half/second-half comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub direction: String,
    pub percentage: f64,
}

impl Trend {
    fn stable() -> Self {
        Trend {
            direction: "stable".to_string(),
            percentage: 0.0,
        }
    }
}

/// Compare the mean of a field between the earlier and later halves of a
/// record set. The lower half is the floor(n/2) earliest records after a
/// date sort. A zero first-half mean forces `stable`/0 rather than dividing
/// by zero.
pub fn trend<T>(
    records: &[T],
    date: impl Fn(&T) -> &str,
    value: impl Fn(&T) -> f64,
) -> Trend {
    if records.len() < 2 {
        return Trend::stable();
    }

    let mut sorted: Vec<&T> = records.iter().collect();
    sorted.sort_by(|a, b| date(a).cmp(date(b)));

    let mid = sorted.len() / 2;
    let (first, second) = sorted.split_at(mid);

    let first_avg: f64 = first.iter().map(|r| value(r)).sum::<f64>() / first.len() as f64;
    let second_avg: f64 = second.iter().map(|r| value(r)).sum::<f64>() / second.len() as f64;

    if first_avg == 0.0 {
        return Trend::stable();
    }

    let change = ((second_avg - first_avg) / first_avg) * 100.0;

    let direction = if change > TREND_THRESHOLD_PERCENT {
        "increasing"
    } else if change < -TREND_THRESHOLD_PERCENT {
        "decreasing"
    } else {
        "stable"
    };

    Trend {
        direction: direction.to_string(),
        percentage: round_percent(change.abs()),
    }
}

/// Percent change between two period totals. A zero baseline reports 100
/// for any growth, 0 otherwise.
pub fn change_percent(old_value: f64, new_value: f64) -> f64 {
    if old_value == 0.0 {
        return if new_value > 0.0 { 100.0 } else { 0.0 };
    }
    round_percent(((new_value - old_value) / old_value) * 100.0)
}

/// Sort descending by a metric and keep the top `limit`. The sort is
/// stable, so ties keep their input order.
pub fn top_n<T>(mut items: Vec<T>, metric: impl Fn(&T) -> f64, limit: usize) -> Vec<T> {
    items.sort_by(|a, b| {
        metric(b)
            .partial_cmp(&metric(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rec {
        date: &'static str,
        key: Option<&'static str>,
        quantity: f64,
    }

    fn rec(date: &'static str, key: Option<&'static str>, quantity: f64) -> Rec {
        Rec { date, key, quantity }
    }

    fn by_key(r: &Rec) -> Option<String> {
        r.key.map(|k| k.to_string())
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        // 0.125 is exactly representable, so the .5 boundary is exact
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(33.0 / 3.0), 11.0);
        assert_eq!(round2(10.333333), 10.33);
    }

    #[test]
    fn test_breakdown_unknown_bucket() {
        let records = vec![
            rec("2024-01-01", Some("mastitis"), 500.0),
            rec("2024-01-02", Some("mastitis"), 300.0),
            rec("2024-01-03", None, 200.0),
            rec("2024-01-04", Some(""), 100.0),
        ];

        let groups = breakdown_by_key(&records, by_key, |r| r.quantity);
        assert_eq!(groups["mastitis"].records, 2);
        assert_eq!(groups["mastitis"].quantity, 800.0);
        // Missing and empty keys both land in "Unknown"
        assert_eq!(groups["Unknown"].records, 2);
        assert_eq!(groups["Unknown"].quantity, 300.0);
    }

    #[test]
    fn test_daily_totals_and_period_summary() {
        // The nakuru scenario: 10, 12, 11 across three days
        let records = vec![
            rec("2024-01-01", None, 10.0),
            rec("2024-01-02", None, 12.0),
            rec("2024-01-03", None, 11.0),
        ];

        let daily = daily_totals(&records, |r| r.date, |r| r.quantity);
        assert_eq!(daily.len(), 3);

        let summary = period_summary(&daily).unwrap();
        assert_eq!(summary.average_daily, 11.0);
        assert_eq!(summary.max_daily, 12.0);
        assert_eq!(summary.min_daily, 10.0);
        assert_eq!(summary.total_days, 3);

        assert!(period_summary(&BTreeMap::new()).is_none());
    }

    #[test]
    fn test_production_summary_scenario() {
        let records = vec![
            rec("2024-01-01", None, 10.0),
            rec("2024-01-02", None, 12.0),
            rec("2024-01-03", None, 11.0),
        ];

        let stats = production_summary(&records, |r| r.date, |r| r.quantity);
        assert_eq!(stats.total_quantity, 33.0);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.average_per_day, 11.0);
        assert_eq!(stats.max_daily, 12.0);
        assert_eq!(stats.min_daily, 10.0);
    }

    #[test]
    fn test_weekly_and_monthly_totals() {
        let records = vec![
            rec("2024-01-01", None, 5.0),  // 2024-W01
            rec("2024-01-02", None, 5.0),  // 2024-W01
            rec("2024-01-08", None, 7.0),  // 2024-W02
            rec("2024-02-01", None, 3.0),
        ];

        let weekly = weekly_totals(&records, |r| r.date, |r| r.quantity);
        assert_eq!(weekly["2024-W01"], 10.0);
        assert_eq!(weekly["2024-W02"], 7.0);

        let monthly = monthly_totals(&records, |r| r.date, |r| r.quantity);
        assert_eq!(monthly["2024-01"], 17.0);
        assert_eq!(monthly["2024-02"], 3.0);
    }

    #[test]
    fn test_trend_increasing() {
        // Halves average 11 vs 31: +181%, well past the threshold
        let records = vec![
            rec("2024-01-01", None, 10.0),
            rec("2024-01-02", None, 12.0),
            rec("2024-01-03", None, 30.0),
            rec("2024-01-04", None, 32.0),
        ];

        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "increasing");
        assert_eq!(t.percentage, 182.0);
    }

    #[test]
    fn test_trend_flat_is_stable() {
        let records = vec![
            rec("2024-01-01", None, 10.0),
            rec("2024-01-02", None, 10.0),
            rec("2024-01-03", None, 10.0),
            rec("2024-01-04", None, 10.0),
        ];

        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "stable");
        assert_eq!(t.percentage, 0.0);
    }

    #[test]
    fn test_trend_decreasing() {
        let records = vec![
            rec("2024-01-01", None, 30.0),
            rec("2024-01-02", None, 30.0),
            rec("2024-01-03", None, 10.0),
            rec("2024-01-04", None, 10.0),
        ];

        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "decreasing");
    }

    #[test]
    fn test_trend_zero_first_half_forced_stable() {
        let records = vec![
            rec("2024-01-01", None, 0.0),
            rec("2024-01-02", None, 0.0),
            rec("2024-01-03", None, 50.0),
            rec("2024-01-04", None, 60.0),
        ];

        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "stable");
        assert_eq!(t.percentage, 0.0);
    }

    #[test]
    fn test_trend_unsorted_input() {
        // The sort happens inside; arrival order must not matter
        let records = vec![
            rec("2024-01-04", None, 32.0),
            rec("2024-01-01", None, 10.0),
            rec("2024-01-03", None, 30.0),
            rec("2024-01-02", None, 12.0),
        ];

        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "increasing");
    }

    #[test]
    fn test_trend_short_input() {
        let records = vec![rec("2024-01-01", None, 10.0)];
        let t = trend(&records, |r| r.date, |r| r.quantity);
        assert_eq!(t.direction, "stable");
        assert_eq!(t.percentage, 0.0);
    }

    #[test]
    fn test_change_percent() {
        assert_eq!(change_percent(100.0, 150.0), 50.0);
        assert_eq!(change_percent(100.0, 50.0), -50.0);
        assert_eq!(change_percent(0.0, 10.0), 100.0);
        assert_eq!(change_percent(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_top_n_stable_ties() {
        let items = vec![("a", 5.0), ("b", 9.0), ("c", 5.0), ("d", 1.0)];
        let ranked = top_n(items, |(_, v)| *v, 3);
        let names: Vec<&str> = ranked.iter().map(|(n, _)| *n).collect();
        // b first, then a and c in input order (stable sort)
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
