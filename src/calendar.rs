// 📅 Calendar - Date parsing, reconciliation windows, business-day spans
//
// Provider exports mix ISO dates, Swiss/German dotted dates and timestamps.
// Only unambiguous layouts are accepted; anything else is rejected instead of guessed.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive calendar range (the reconciliation window)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            bail!("date range ends ({}) before it starts ({})", end, start);
        }
        Ok(DateRange { start, end })
    }

    /// Single-day range
    pub fn day(date: NaiveDate) -> Self {
        DateRange { start: date, end: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered (inclusive)
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

// ============================================================================
// DATE PARSING
// ============================================================================

/// Parse a provider/bank date, dropping any time-of-day suffix.
///
/// Supported layouts:
/// - `2025-05-10` (ISO), optionally followed by `T10:00:00` or ` 18:19:06`
/// - `10.05.2025` (day first, dotted)
/// - `2025.05.10` (year first, dotted)
///
/// Slash-separated dates and two-digit years are rejected: `05/10/25`
/// cannot be resolved without guessing.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let cleaned = raw.trim().trim_matches('"').trim();
    if cleaned.is_empty() {
        bail!("empty date");
    }

    let date_part = cleaned
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(cleaned);

    let sep = if date_part.contains('-') {
        '-'
    } else if date_part.contains('.') {
        '.'
    } else {
        bail!("unsupported date format '{}'", cleaned);
    };

    let parts: Vec<&str> = date_part.split(sep).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        bail!("unsupported date format '{}'", cleaned);
    }

    let (year, month, day) = if parts[0].len() == 4 && parts[1].len() <= 2 && parts[2].len() <= 2 {
        (parts[0], parts[1], parts[2])
    } else if sep == '.' && parts[2].len() == 4 && parts[0].len() <= 2 && parts[1].len() <= 2 {
        (parts[2], parts[1], parts[0])
    } else {
        bail!("ambiguous date '{}': expected a four-digit year", cleaned);
    };

    let year: i32 = year.parse().context("invalid year")?;
    let month: u32 = month.parse().context("invalid month")?;
    let day: u32 = day.parse().context("invalid day")?;

    NaiveDate::from_ymd_opt(year, month, day)
        .with_context(|| format!("date '{}' does not exist", cleaned))
}

// ============================================================================
// LAG & BUSINESS DAYS
// ============================================================================

/// Signed number of days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekend days and listed holidays in `(from, to]`
pub fn non_business_days(from: NaiveDate, to: NaiveDate, holidays: &[NaiveDate]) -> i64 {
    let mut count = 0;
    let mut day = from + Duration::days(1);
    while day <= to {
        if is_weekend(day) || holidays.contains(&day) {
            count += 1;
        }
        day += Duration::days(1);
    }
    count
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_iso_and_timestamps() {
        assert_eq!(parse_date("2025-05-10").unwrap(), d(2025, 5, 10));
        assert_eq!(parse_date("2025-04-30 18:19:06").unwrap(), d(2025, 4, 30));
        assert_eq!(parse_date("2025-05-12T10:00:00+02:00").unwrap(), d(2025, 5, 12));
    }

    #[test]
    fn test_parse_dotted_dates() {
        assert_eq!(parse_date("31.10.2024").unwrap(), d(2024, 10, 31));
        assert_eq!(parse_date("\"1.11.2024\"").unwrap(), d(2024, 11, 1));
        assert_eq!(parse_date("2025.04.02 10:04").unwrap(), d(2025, 4, 2));
    }

    #[test]
    fn test_reject_ambiguous_dates() {
        assert!(parse_date("05/10/2025").is_err());
        assert!(parse_date("10.05.25").is_err());
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::new(d(2025, 5, 1), d(2025, 5, 31)).unwrap();
        assert!(range.contains(d(2025, 5, 10)));
        assert!(!range.contains(d(2025, 6, 1)));
        assert_eq!(range.days(), 31);
        assert!(DateRange::new(d(2025, 5, 2), d(2025, 5, 1)).is_err());
    }

    #[test]
    fn test_non_business_days() {
        // 2025-05-09 is a Friday
        assert_eq!(non_business_days(d(2025, 5, 9), d(2025, 5, 12), &[]), 2);
        // Tuesday -> Thursday, no weekend
        assert_eq!(non_business_days(d(2025, 5, 13), d(2025, 5, 15), &[]), 0);
        // Ascension Day 2025 as a configured holiday
        assert_eq!(non_business_days(d(2025, 5, 28), d(2025, 5, 29), &[d(2025, 5, 29)]), 1);
        // Friday -> Saturday a week later covers three weekend days
        assert_eq!(non_business_days(d(2025, 5, 2), d(2025, 5, 10), &[]), 3);
        assert_eq!(non_business_days(d(2025, 5, 12), d(2025, 5, 10), &[]), 0);
        assert_eq!(days_between(d(2025, 5, 10), d(2025, 5, 12)), 2);
    }
}
