//! Start-position resolution: user anchor in, timeline instant out.

use chrono::NaiveDateTime;

use crate::error::StartPositionError;
use crate::extract::ResponseEntry;
use crate::settings::{StartAnchor, ThreadSettings};
use crate::timestamp::{parse_timestamp_with, ParseOptions};
use crate::validation::{validate_post_number_text, validate_response_index};

/// Resolve the settings' anchor against the current responses.
///
/// A parseable timestamp always resolves, even outside the thread's time
/// range; playback handles "not started yet" and "already over" itself.
pub fn resolve_start_position(
    settings: &ThreadSettings,
    responses: &[ResponseEntry],
) -> Result<NaiveDateTime, StartPositionError> {
    match &settings.start {
        StartAnchor::Index(target) => find_index_anchor(*target, responses)
            .map(|entry| entry.timestamp)
            .ok_or(StartPositionError::IndexOutOfRange {
                min: 0,
                max: responses.len().saturating_sub(1),
            }),
        StartAnchor::Timestamp(text) => {
            let options = ParseOptions { skip_weekday_check: true };
            parse_timestamp_with(text, options).ok_or_else(|| StartPositionError::TimestampParse {
                input: text.clone(),
            })
        }
        StartAnchor::No(text) => {
            let not_found = || StartPositionError::NoNotFound {
                searched: text.clone(),
            };
            let target = validate_post_number_text(text).map_err(|_| not_found())?;
            responses
                .iter()
                .find(|entry| entry.post_no == Some(target))
                .map(|entry| entry.timestamp)
                .ok_or_else(not_found)
        }
    }
}

/// The response an index anchor designates: an explicit response-number
/// annotation equal to `target` first, then the positional entry.
pub fn find_index_anchor(target: usize, responses: &[ResponseEntry]) -> Option<&ResponseEntry> {
    let wanted = u64::try_from(target).ok();
    if let Some(entry) = responses.iter().find(|entry| entry.res_no.is_some() && entry.res_no == wanted) {
        return Some(entry);
    }
    let position = validate_response_index(i64::try_from(target).ok()?, responses.len()).ok()?;
    responses
        .iter()
        .find(|entry| entry.index == position)
        .or_else(|| responses.get(position))
}
