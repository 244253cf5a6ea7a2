//! Natural-language date finding.
//!
//! Scans free text for date mentions and returns them in order of
//! appearance. The first mention is what the date-extractor stage publishes,
//! so ordering is by byte offset, never by the date's value.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

/// One date mention found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    /// The substring that matched.
    pub matched: String,
    pub date: NaiveDate,
}

const MONTH_NAMES: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

static DATE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // 3 March 2022, 03 Mar 2022, 1st January 1999
        (
            Regex::new(&format!(
                r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({})\.?,?\s+(\d{{4}})\b",
                MONTH_NAMES
            ))
            .expect("day-first pattern"),
            "dmy_name",
        ),
        // March 3, 2022 / Mar 3 2022
        (
            Regex::new(&format!(
                r"(?i)\b({})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b",
                MONTH_NAMES
            ))
            .expect("month-first pattern"),
            "mdy_name",
        ),
        // ISO: 2022-03-03
        (
            Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso pattern"),
            "ymd",
        ),
        // Numeric: 03/03/2022 (day first)
        (
            Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("numeric pattern"),
            "dmy",
        ),
    ]
});

/// Find every date mention in `text`, ordered by position.
pub fn search_dates(text: &str) -> Vec<DateMatch> {
    let mut found: Vec<(usize, DateMatch)> = Vec::new();
    for (pattern, format) in DATE_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(date) = parse_captured_date(&caps, format) else {
                continue;
            };
            if !plausible_year(date) {
                continue;
            }
            found.push((
                whole.start(),
                DateMatch {
                    matched: whole.as_str().to_string(),
                    date,
                },
            ));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.dedup_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, m)| m).collect()
}

/// Parse captured groups according to the pattern's field order. Calendar
/// validation happens here; impossible dates yield None and are skipped.
fn parse_captured_date(caps: &regex::Captures, format: &str) -> Option<NaiveDate> {
    match format {
        "dmy_name" => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month = month_number(caps.get(2)?.as_str())?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "mdy_name" => {
            let month = month_number(caps.get(1)?.as_str())?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "ymd" => {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "dmy" => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let number = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(number)
}

/// Publication dates outside 1900..=next year are almost always OCR noise
/// or serial numbers.
fn plausible_year(date: NaiveDate) -> bool {
    let year = date.year();
    year >= 1900 && year <= Utc::now().year() + 1
}
