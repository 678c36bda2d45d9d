//! # Timeline calculator
//!
//! Maps wall-clock time onto virtual thread time and finds the response
//! that was the latest one at a given virtual instant.
//!
//! ## Guarantees
//! - Virtual time never precedes its anchor: elapsed wall time is clamped at 0.
//! - Virtual time saturates at `NaiveDateTime::MAX` instead of overflowing.
//! - `find_previous` is deterministic under duplicate timestamps: the highest
//!   index among equals wins.

use chrono::{NaiveDateTime, TimeDelta};

/// Minimal projection of a response used for timeline search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineResponse {
    pub timestamp: NaiveDateTime,
    pub index: usize,
}

/// The playback clock.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineState {
    /// Post time playback is anchored to.
    pub thread_start_time: NaiveDateTime,
    /// Wall-clock ms at which playback last started or resumed.
    pub execution_start_ms: i64,
    /// Virtual seconds per wall second; always > 0.
    pub speed_multiplier: f64,
    /// Virtual time frozen at the most recent pause or speed change.
    pub baseline_thread_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineCalculator;

impl TimelineCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Virtual thread time at wall-clock `now_ms`.
    pub fn current_thread_time(&self, state: &TimelineState, now_ms: i64) -> NaiveDateTime {
        let elapsed_ms = now_ms.saturating_sub(state.execution_start_ms).max(0);
        let virtual_ms = (elapsed_ms as f64 * state.speed_multiplier).round() as i64;
        let anchor = state.baseline_thread_time.unwrap_or(state.thread_start_time);
        let offset = TimeDelta::try_milliseconds(virtual_ms).unwrap_or(TimeDelta::MAX);
        anchor.checked_add_signed(offset).unwrap_or(NaiveDateTime::MAX)
    }

    /// The rightmost response with `timestamp <= current`, ordering by
    /// timestamp then index. `responses` need not be sorted.
    pub fn find_previous(
        &self,
        responses: &[TimelineResponse],
        current: NaiveDateTime,
    ) -> Option<TimelineResponse> {
        if responses.is_empty() {
            return None;
        }

        let mut sorted = responses.to_vec();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.index.cmp(&b.index)));

        let count = sorted.partition_point(|r| r.timestamp <= current);
        count.checked_sub(1).map(|i| sorted[i])
    }
}
