//! Best-effort parsing of the date strings the site and the model produce.
//!
//! Parsing is an ordered list of attempts; the first one that yields a date
//! wins. A string no attempt understands is a visible `None`, which callers
//! turn into `Urgency::Low`.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::trace;

use crate::models::Urgency;

/// Calendar used for "today" when computing urgency.
pub const SITE_TIMEZONE: Tz = chrono_tz::America::Indiana::Indianapolis;

/// Format used for "today" in the prompt and for normalized dates.
pub const DISPLAY_FORMAT: &str = "%a, %b %-d, %Y";

const HIGH_WINDOW_DAYS: i64 = 3;
const MEDIUM_WINDOW_DAYS: i64 = 7;

type Attempt = fn(&str, NaiveDate) -> Option<NaiveDate>;

const ATTEMPTS: &[(&str, Attempt)] = &[
    ("relative", parse_relative),
    ("weekday_month_day_year", parse_weekday_month_day_year),
    ("month_day_year", parse_month_day_year),
    ("numeric", parse_numeric),
    ("month_day", parse_month_day),
];

pub fn today() -> NaiveDate {
    Utc::now().with_timezone(&SITE_TIMEZONE).date_naive()
}

pub fn format_display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// Parses the start of a date string: the part before any `;` (additional
/// dates) or ` - ` (range end).
pub fn parse_event_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let start = leading_date(input);
    if start.is_empty() {
        return None;
    }
    ATTEMPTS.iter().find_map(|(name, attempt)| {
        let parsed = attempt(start, today)?;
        trace!(input = start, attempt = name, %parsed, "parsed event date");
        Some(parsed)
    })
}

pub fn urgency_for(date: NaiveDate, today: NaiveDate) -> Urgency {
    let days = (date - today).num_days();
    match days {
        d if (0..=HIGH_WINDOW_DAYS).contains(&d) => Urgency::High,
        d if (HIGH_WINDOW_DAYS + 1..=MEDIUM_WINDOW_DAYS).contains(&d) => Urgency::Medium,
        _ => Urgency::Low,
    }
}

pub fn classify(input: Option<&str>, today: NaiveDate) -> Urgency {
    match input.and_then(|text| parse_event_date(text, today)) {
        Some(date) => urgency_for(date, today),
        None => Urgency::Low,
    }
}

fn leading_date(input: &str) -> &str {
    let first = input.split(';').next().unwrap_or_default();
    let first = first.split(" - ").next().unwrap_or_default();
    first.trim()
}

fn parse_relative(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = input.to_lowercase();
    if lower.contains("today") {
        Some(today)
    } else if lower.contains("tomorrow") {
        Some(today + Duration::days(1))
    } else {
        None
    }
}

fn parse_weekday_month_day_year(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    for fmt in ["%a, %b %d, %Y", "%A, %B %d, %Y", "%a, %B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return Some(date);
        }
    }
    // A weekday that disagrees with the date is dropped rather than trusted.
    let (_, rest) = input.split_once(", ")?;
    parse_month_day_year(rest, today)
}

fn parse_month_day_year(input: &str, _today: NaiveDate) -> Option<NaiveDate> {
    ["%b %d, %Y", "%B %d, %Y", "%b %d %Y", "%B %d %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

fn parse_numeric(input: &str, _today: NaiveDate) -> Option<NaiveDate> {
    ["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

/// "Jun 3" or "Mon, Jun 3": assume this year, or next year once it has passed.
fn parse_month_day(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let without_weekday = input.split_once(", ").map(|(_, rest)| rest).unwrap_or(input);
    let with_year = format!("{}, {}", without_weekday.trim(), today.year());
    let date = parse_month_day_year(&with_year, today)?;
    if date < today {
        date.with_year(today.year() + 1)
    } else {
        Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn today_is_high_urgency() {
        let today = day(2024, 6, 1);
        assert_eq!(classify(Some("Today"), today), Urgency::High);
        assert_eq!(classify(Some("Tomorrow 3pm"), today), Urgency::High);
    }

    #[test]
    fn urgency_windows() {
        let today = day(2024, 6, 1);
        assert_eq!(urgency_for(day(2024, 6, 4), today), Urgency::High);
        assert_eq!(urgency_for(day(2024, 6, 5), today), Urgency::Medium);
        assert_eq!(urgency_for(day(2024, 6, 8), today), Urgency::Medium);
        assert_eq!(urgency_for(day(2024, 6, 9), today), Urgency::Low);
        assert_eq!(urgency_for(day(2024, 6, 11), today), Urgency::Low);
        assert_eq!(urgency_for(day(2024, 5, 31), today), Urgency::Low);
    }

    #[test]
    fn ten_days_out_is_low() {
        let today = day(2024, 6, 1);
        assert_eq!(classify(Some("Tue, Jun 11, 2024"), today), Urgency::Low);
    }

    #[test]
    fn unparseable_defaults_to_low() {
        let today = day(2024, 6, 1);
        assert_eq!(parse_event_date("sometime soon-ish", today), None);
        assert_eq!(classify(Some("sometime soon-ish"), today), Urgency::Low);
        assert_eq!(classify(Some(""), today), Urgency::Low);
        assert_eq!(classify(None, today), Urgency::Low);
    }

    #[test]
    fn parses_site_and_model_formats() {
        let today = day(2024, 6, 1);
        assert_eq!(parse_event_date("Mon, Jun 3, 2024", today), Some(day(2024, 6, 3)));
        assert_eq!(parse_event_date("Jun 3, 2024", today), Some(day(2024, 6, 3)));
        assert_eq!(parse_event_date("06/03/2024", today), Some(day(2024, 6, 3)));
        assert_eq!(
            parse_event_date("Apr 23, 2025 - Apr 25, 2025", today),
            Some(day(2025, 4, 23))
        );
        assert_eq!(
            parse_event_date("Mon, Jun 3, 2024; Jun 10, 2024", today),
            Some(day(2024, 6, 3))
        );
    }

    #[test]
    fn mismatched_weekday_still_parses() {
        let today = day(2024, 6, 1);
        assert_eq!(parse_event_date("Fri, Jun 3, 2024", today), Some(day(2024, 6, 3)));
    }

    #[test]
    fn month_day_rolls_into_next_year_once_past() {
        let today = day(2024, 6, 1);
        assert_eq!(parse_event_date("Jun 5", today), Some(day(2024, 6, 5)));
        assert_eq!(parse_event_date("Jan 5", today), Some(day(2025, 1, 5)));
    }

    #[test]
    fn display_format_has_no_padding() {
        assert_eq!(format_display(day(2024, 6, 3)), "Mon, Jun 3, 2024");
    }
}
