//! Validators for user-supplied values. Each returns a tagged result and
//! never panics.

use reqwest::Url;

use crate::dom::groups::parse_post_number;
use crate::error::{ValidationCode, ValidationError};
use crate::timestamp::{parse_timestamp_with, ParseOptions};

/// A 0-based response index must address one of `len` responses.
pub fn validate_response_index(input: i64, len: usize) -> Result<usize, ValidationError> {
    if len == 0 {
        return Err(ValidationError::new(
            ValidationCode::ResponseArrayEmpty,
            "no responses found; load the thread before starting",
            format!("{input} (of {len})"),
        ));
    }
    match usize::try_from(input) {
        Ok(index) if index < len => Ok(index),
        _ => Err(ValidationError::new(
            ValidationCode::ResponseIndexOutOfRange,
            format!("response index must be between 0 and {}", len - 1),
            input.to_string(),
        )),
    }
}

pub fn validate_speed_multiplier(input: f64) -> Result<f64, ValidationError> {
    if !input.is_finite() {
        return Err(ValidationError::new(
            ValidationCode::SpeedMultiplierNotFinite,
            "speed multiplier must be a finite number",
            input.to_string(),
        ));
    }
    if input <= 0.0 {
        return Err(ValidationError::new(
            ValidationCode::SpeedMultiplierNonPositive,
            "speed multiplier must be greater than 0",
            input.to_string(),
        ));
    }
    Ok(input)
}

/// Accepts both timestamp shapes; the weekday glyph is not checked.
pub fn validate_timestamp_text(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    let options = ParseOptions { skip_weekday_check: true };
    match parse_timestamp_with(trimmed, options) {
        Some(_) => Ok(trimmed.to_string()),
        None => Err(ValidationError::new(
            ValidationCode::TimestampInvalidFormat,
            "timestamp must look like 25/11/16(日)22:48:03 or 2025/11/16 22:48:03",
            input,
        )),
    }
}

/// Accepts `No.<digits>` or bare digits; returns the number.
pub fn validate_post_number_text(input: &str) -> Result<u64, ValidationError> {
    let trimmed = input.trim();
    let bare = (!trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()))
        .then(|| trimmed.parse().ok())
        .flatten();
    bare.or_else(|| parse_post_number(trimmed)).ok_or_else(|| {
        ValidationError::new(
            ValidationCode::NoInvalidFormat,
            "post number must look like No.123456 or 123456",
            input,
        )
    })
}

/// Only absolute `http`/`https` URLs are accepted.
pub fn validate_thread_url(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    let invalid = || {
        ValidationError::new(
            ValidationCode::UrlInvalidFormat,
            "thread URL must be an http:// or https:// address",
            input,
        )
    };
    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(invalid()),
    }
}
