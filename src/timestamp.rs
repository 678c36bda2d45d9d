//! Post timestamp parsing.
//!
//! Two textual shapes are accepted:
//!
//! - `YY/MM/DD(W)HH:MM:SS`, a 2-digit year (always `2000 + YY`) with a
//!   single weekday glyph that must agree with the calendar date;
//! - `YYYY/MM/DD HH:MM:SS`, a 4-digit year without a weekday.
//!
//! All values are naive local wall-clock times; no timezone conversion.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

/// Weekday glyphs, Sunday first.
pub const WEEKDAYS: [char; 7] = ['日', '月', '火', '水', '木', '金', '土'];

static SHORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{2})\((.)\)(\d{2}):(\d{2}):(\d{2})$")
        .expect("static timestamp pattern")
});

static LONG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})/(\d{2})/(\d{2})\s+(\d{2}):(\d{2}):(\d{2})$")
        .expect("static timestamp pattern")
});

/// Options for [`parse_timestamp_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Accept a weekday glyph that does not match the date.
    pub skip_weekday_check: bool,
}

/// Parse a timestamp, enforcing the weekday glyph.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    parse_timestamp_with(text, ParseOptions::default())
}

/// Parse a timestamp with explicit options. Returns `None` on any mismatch.
pub fn parse_timestamp_with(text: &str, options: ParseOptions) -> Option<NaiveDateTime> {
    let trimmed = text.trim();

    if let Some(caps) = SHORT_PATTERN.captures(trimmed) {
        let year = 2000 + caps[1].parse::<i32>().ok()?;
        let glyph = caps[4].chars().next()?;
        let parsed = build(year, &caps[2], &caps[3], &caps[5], &caps[6], &caps[7])?;
        if !options.skip_weekday_check && weekday_glyph(&parsed) != glyph {
            return None;
        }
        return Some(parsed);
    }

    if let Some(caps) = LONG_PATTERN.captures(trimmed) {
        let year = caps[1].parse::<i32>().ok()?;
        return build(year, &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]);
    }

    None
}

fn build(year: i32, mm: &str, dd: &str, hh: &str, mi: &str, ss: &str) -> Option<NaiveDateTime> {
    let month: u32 = mm.parse().ok()?;
    let day: u32 = dd.parse().ok()?;
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mi.parse().ok()?;
    let second: u32 = ss.parse().ok()?;

    let value = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    // Reject anything the calendar normalised away (e.g. 02/30).
    let same = value.year() == year
        && value.month() == month
        && value.day() == day
        && value.hour() == hour
        && value.minute() == minute
        && value.second() == second;
    same.then_some(value)
}

/// The glyph for the date's actual weekday.
pub fn weekday_glyph(value: &NaiveDateTime) -> char {
    WEEKDAYS[value.weekday().num_days_from_sunday() as usize]
}

/// Render in the short `YY/MM/DD(W)HH:MM:SS` form the thread pages use.
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    format!(
        "{:02}/{:02}/{:02}({}){:02}:{:02}:{:02}",
        value.year().rem_euclid(100),
        value.month(),
        value.day(),
        weekday_glyph(value),
        value.hour(),
        value.minute(),
        value.second()
    )
}

/// Render as `YYYY/MM/DD HH:MM:SS`, the status line form.
pub fn format_long(value: &NaiveDateTime) -> String {
    value.format("%Y/%m/%d %H:%M:%S").to_string()
}

/// Strip a poster-ID suffix (`... ID:abcd`) from timestamp text.
pub fn strip_id_suffix(text: &str) -> &str {
    match text.find("ID:") {
        Some(pos) => text[..pos].trim(),
        None => text.trim(),
    }
}
