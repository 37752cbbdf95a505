//! Calendar helpers for the aggregation engine
//!
//! Record dates are ISO `YYYY-MM-DD` strings throughout, so day keys are
//! the dates themselves and range bounds compare lexicographically.

use chrono::{Datelike, Duration, NaiveDate, Utc};

/// Inclusive date range, both ends ISO YYYY-MM-DD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Calendar-day bucket key. Tolerates datetime-ish inputs by truncating.
pub fn day_key(date: &str) -> String {
    if date.len() > 10 {
        date[..10].to_string()
    } else {
        date.to_string()
    }
}

/// ISO week bucket key, `year-Wnn` (Thursday-anchored ISO week rule)
pub fn week_key(date: &str) -> String {
    match NaiveDate::parse_from_str(&day_key(date), "%Y-%m-%d") {
        Ok(d) => {
            let iso = d.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        Err(_) => "Unknown".to_string(),
    }
}

/// Calendar month bucket key, `year-month`
pub fn month_key(date: &str) -> String {
    let day = day_key(date);
    if day.len() >= 7 {
        day[..7].to_string()
    } else {
        "Unknown".to_string()
    }
}

/// Days elapsed from `date` to today, never less than 1
pub fn days_since(date: &str) -> i64 {
    match NaiveDate::parse_from_str(&day_key(date), "%Y-%m-%d") {
        Ok(d) => (today() - d).num_days().max(1),
        Err(_) => 1,
    }
}

/// Whole-year age from a date of birth
pub fn age_in_years(date_of_birth: &str) -> i64 {
    match NaiveDate::parse_from_str(&day_key(date_of_birth), "%Y-%m-%d") {
        Ok(birth) => {
            let now = today();
            let mut age = now.year() as i64 - birth.year() as i64;
            if (now.month(), now.day()) < (birth.month(), birth.day()) {
                age -= 1;
            }
            age.max(0)
        }
        Err(_) => 0,
    }
}

fn iso(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Range covered by a named reporting period, relative to `reference`.
/// Unknown periods fall back to monthly.
pub fn period_range(period: &str, reference: NaiveDate) -> DateRange {
    match period {
        "daily" => DateRange {
            start: iso(reference),
            end: iso(reference),
        },
        "weekly" => {
            let weekday = reference.weekday().num_days_from_monday() as i64;
            let start = reference - Duration::days(weekday);
            let end = start + Duration::days(6);
            DateRange {
                start: iso(start),
                end: iso(end),
            }
        }
        "yearly" => DateRange {
            start: format!("{}-01-01", reference.year()),
            end: format!("{}-12-31", reference.year()),
        },
        // monthly (and anything unrecognized)
        _ => {
            let start = reference.with_day(1).unwrap_or(reference);
            let next_month = if reference.month() == 12 {
                NaiveDate::from_ymd_opt(reference.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(reference.year(), reference.month() + 1, 1)
            };
            let end = next_month
                .map(|d| d - Duration::days(1))
                .unwrap_or(reference);
            DateRange {
                start: iso(start),
                end: iso(end),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_truncates_datetimes() {
        assert_eq!(day_key("2024-01-15"), "2024-01-15");
        assert_eq!(day_key("2024-01-15T06:30:00Z"), "2024-01-15");
    }

    #[test]
    fn test_week_key_iso_rule() {
        // 2024-01-01 is a Monday in ISO week 1 of 2024
        assert_eq!(week_key("2024-01-01"), "2024-W01");
        // 2023-01-01 is a Sunday belonging to ISO week 52 of 2022
        assert_eq!(week_key("2023-01-01"), "2022-W52");
        // 2020-12-31 (Thursday) is in ISO week 53 of 2020
        assert_eq!(week_key("2020-12-31"), "2020-W53");
        assert_eq!(week_key("garbage"), "Unknown");
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key("2024-03-15"), "2024-03");
        assert_eq!(month_key("bad"), "Unknown");
    }

    #[test]
    fn test_period_range_daily() {
        let reference = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let range = period_range("daily", reference);
        assert_eq!(range.start, "2024-03-15");
        assert_eq!(range.end, "2024-03-15");
    }

    #[test]
    fn test_period_range_weekly_monday_start() {
        // 2024-03-15 is a Friday; the week runs 03-11 (Mon) to 03-17 (Sun)
        let reference = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let range = period_range("weekly", reference);
        assert_eq!(range.start, "2024-03-11");
        assert_eq!(range.end, "2024-03-17");
    }

    #[test]
    fn test_period_range_monthly() {
        let reference = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let range = period_range("monthly", reference);
        assert_eq!(range.start, "2024-02-01");
        assert_eq!(range.end, "2024-02-29");

        let december = NaiveDate::from_ymd_opt(2023, 12, 25).unwrap();
        let range = period_range("monthly", december);
        assert_eq!(range.start, "2023-12-01");
        assert_eq!(range.end, "2023-12-31");
    }

    #[test]
    fn test_period_range_yearly_and_fallback() {
        let reference = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = period_range("yearly", reference);
        assert_eq!(range.start, "2024-01-01");
        assert_eq!(range.end, "2024-12-31");

        // Unknown period falls back to monthly
        let range = period_range("quarterly", reference);
        assert_eq!(range.start, "2024-06-01");
        assert_eq!(range.end, "2024-06-30");
    }

    #[test]
    fn test_age_in_years() {
        // Stable regardless of run date for long-past birthdays
        assert!(age_in_years("2000-01-01") >= 24);
        assert_eq!(age_in_years("not-a-date"), 0);
    }
}
