//! Date/value normalizer.
//!
//! Turns untyped [`RawRow`] text into [`TimeSeriesPoint`]s. Pure functions
//! only; the caller decides what an aggregate of failures means.
//!
//! Date shapes, first match wins:
//!
//! 1. `YYYY-MM-DD` (exported CSV rows)
//! 2. `Mon D, YYYY`
//! 3. `Mon D – D, YYYY`, `Mon D – Mon D, YYYY`, `Mon D, YYYY – Mon D, YYYY`,
//!    anchored to the start date
//!
//! Values are plain numbers on the 0–100 interest scale, or a
//! below-threshold marker (`<1`).

use crate::extraction::RawRow;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

/// Stand-in value for a "below measurable threshold" reading. Kept for
/// compatibility with existing consumers of the artifact.
pub const BELOW_THRESHOLD_SENTINEL: f64 = 0.5;

/// Prefix that marks a below-threshold reading.
pub const BELOW_THRESHOLD_MARKER: char = '<';

/// Upper end of the target's normalized interest scale.
pub const SCALE_MAX: f64 = 100.0;

/// Canonical output unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub below_threshold: bool,
}

/// Why a single row was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("unrecognised date {0:?}")]
    Date(String),
    #[error("unrecognised value {0:?}")]
    Value(String),
    #[error("value {0:?} outside 0..=100")]
    OutOfRange(String),
}

/// Outcome of normalizing a whole batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    /// Accepted points in input order.
    pub points: Vec<TimeSeriesPoint>,
    pub raw_rows: usize,
    pub failures: usize,
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("iso regex is valid"))
}

fn single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]{3,})\.? (\d{1,2}), (\d{4})$").expect("single-date regex is valid")
    })
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Za-z]{3,})\.? (\d{1,2})(?:, (\d{4}))? ?[\x{2013}\x{2014}-] ?(?:([A-Za-z]{3,})\.? )?\d{1,2}, (\d{4})$",
        )
        .expect("range-date regex is valid")
    })
}

/// Strip bidi controls, turn non-breaking and thin spaces into plain
/// spaces, and collapse whitespace runs.
pub fn clean(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
            )
        })
        .map(|c| match c {
            '\u{00A0}' | '\u{202F}' | '\u{2009}' => ' ',
            other => other,
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

/// Parse date text into a calendar date.
pub fn parse_date(text: &str) -> Result<NaiveDate, ParseFailure> {
    let cleaned = clean(text);
    let fail = || ParseFailure::Date(text.to_string());

    if let Some(c) = iso_re().captures(&cleaned) {
        let month = c[2].parse().map_err(|_| fail())?;
        return ymd(&c[1], month, &c[3]).ok_or_else(fail);
    }

    if let Some(c) = single_re().captures(&cleaned) {
        let month = month_number(&c[1]).ok_or_else(fail)?;
        return ymd(&c[3], month, &c[2]).ok_or_else(fail);
    }

    if let Some(c) = range_re().captures(&cleaned) {
        let month = month_number(&c[1]).ok_or_else(fail)?;
        if let Some(start_year) = c.get(3) {
            return ymd(start_year.as_str(), month, &c[2]).ok_or_else(fail);
        }
        let end_year: i32 = c[5].parse().map_err(|_| fail())?;
        let end_month = match c.get(4) {
            Some(m) => month_number(m.as_str()).ok_or_else(fail)?,
            None => month,
        };
        // A yearless start that wraps past December belongs to the previous year.
        let year = if end_month < month { end_year - 1 } else { end_year };
        let day = c[2].parse().map_err(|_| fail())?;
        return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(fail);
    }

    Err(fail())
}

/// Parse value text into `(value, below_threshold)`.
pub fn parse_value(text: &str) -> Result<(f64, bool), ParseFailure> {
    let cleaned = clean(text);
    if cleaned.starts_with(BELOW_THRESHOLD_MARKER) {
        return Ok((BELOW_THRESHOLD_SENTINEL, true));
    }
    let value: f64 = cleaned
        .parse()
        .map_err(|_| ParseFailure::Value(text.to_string()))?;
    if !value.is_finite() || !(0.0..=SCALE_MAX).contains(&value) {
        return Err(ParseFailure::OutOfRange(text.to_string()));
    }
    Ok((value, false))
}

/// Normalize one raw row.
pub fn normalize(row: &RawRow) -> Result<TimeSeriesPoint, ParseFailure> {
    let date = parse_date(&row.date_text)?;
    let (value, below_threshold) = parse_value(&row.value_text)?;
    Ok(TimeSeriesPoint {
        date,
        value,
        below_threshold,
    })
}

/// Render a point back into the single-date row shape the page uses.
pub fn to_raw(point: &TimeSeriesPoint) -> RawRow {
    let value_text = if point.below_threshold {
        format!("{BELOW_THRESHOLD_MARKER}1")
    } else {
        point.value.to_string()
    };
    RawRow::new(point.date.format("%b %-d, %Y").to_string(), value_text)
}

/// Normalize every row, counting rejects instead of failing.
pub fn normalize_all(rows: &[RawRow]) -> NormalizeReport {
    let mut report = NormalizeReport {
        raw_rows: rows.len(),
        ..Default::default()
    };
    for row in rows {
        match normalize(row) {
            Ok(point) => report.points.push(point),
            Err(e) => {
                debug!("skipping row: {e}");
                report.failures += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_date() {
        assert_eq!(parse_date("Jan 1, 2024").unwrap(), date(2024, 1, 1));
        assert_eq!(parse_date("Sept 30, 2023").unwrap(), date(2023, 9, 30));
        assert_eq!(parse_date("2024-02-29").unwrap(), date(2024, 2, 29));
    }

    #[test]
    fn test_range_anchors_to_start() {
        assert_eq!(parse_date("Jan 5 – 11, 2021").unwrap(), date(2021, 1, 5));
        assert_eq!(parse_date("Jan 31 – Feb 6, 2021").unwrap(), date(2021, 1, 31));
        assert_eq!(parse_date("Jan 5-11, 2021").unwrap(), date(2021, 1, 5));
        assert_eq!(
            parse_date("Dec 29, 2024 – Jan 4, 2025").unwrap(),
            date(2024, 12, 29)
        );
        assert_eq!(parse_date("Dec 29 – Jan 4, 2025").unwrap(), date(2024, 12, 29));
    }

    #[test]
    fn test_month_names_must_be_whole_words() {
        assert_eq!(parse_date("January 5, 2024").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("Sep. 2, 2024").unwrap(), date(2024, 9, 2));
        assert!(matches!(parse_date("Janitor 5, 2024"), Err(ParseFailure::Date(_))));
        assert!(matches!(parse_date("Decimal 1 – 7, 2024"), Err(ParseFailure::Date(_))));
    }

    #[test]
    fn test_cleans_bidi_and_nbsp() {
        assert_eq!(
            parse_date("\u{200E}Jan\u{00A0}5\u{2009}–\u{2009}11,\u{202F}2021\u{200F}").unwrap(),
            date(2021, 1, 5)
        );
        assert_eq!(parse_value("\u{200E}42\u{00A0}").unwrap(), (42.0, false));
    }

    #[test]
    fn test_rejects_garbage_dates() {
        assert!(matches!(parse_date("Week"), Err(ParseFailure::Date(_))));
        assert!(matches!(parse_date("Foo 1, 2024"), Err(ParseFailure::Date(_))));
        assert!(matches!(parse_date("Feb 30, 2024"), Err(ParseFailure::Date(_))));
        assert!(matches!(parse_date("2024-13-01"), Err(ParseFailure::Date(_))));
    }

    #[test]
    fn test_below_threshold_marker() {
        for text in ["<1", "< 1", "<1%"] {
            assert_eq!(parse_value(text).unwrap(), (BELOW_THRESHOLD_SENTINEL, true));
        }
        let point = normalize(&RawRow::new("Mar 3 – 9, 2024", "<1")).unwrap();
        assert_eq!(point.value, 0.5);
        assert!(point.below_threshold);
    }

    #[test]
    fn test_value_failures() {
        assert!(matches!(parse_value("n/a"), Err(ParseFailure::Value(_))));
        assert!(matches!(parse_value(""), Err(ParseFailure::Value(_))));
        assert!(matches!(parse_value("150"), Err(ParseFailure::OutOfRange(_))));
        assert!(matches!(parse_value("NaN"), Err(ParseFailure::OutOfRange(_))));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let points = [
            TimeSeriesPoint {
                date: date(2024, 1, 1),
                value: 42.0,
                below_threshold: false,
            },
            TimeSeriesPoint {
                date: date(2023, 12, 31),
                value: 7.25,
                below_threshold: false,
            },
            TimeSeriesPoint {
                date: date(2024, 2, 29),
                value: BELOW_THRESHOLD_SENTINEL,
                below_threshold: true,
            },
        ];
        for p in points {
            assert_eq!(normalize(&to_raw(&p)).unwrap(), p);
        }
    }

    #[test]
    fn test_normalize_all_counts_failures() {
        let rows = vec![
            RawRow::new("Date", "bitcoin"),
            RawRow::new("Jan 1, 2024", "42"),
            RawRow::new("Jan 8, 2024", "oops"),
        ];
        let report = normalize_all(&rows);
        assert_eq!(report.raw_rows, 3);
        assert_eq!(report.failures, 2);
        assert_eq!(report.points.len(), 1);
    }
}
