//! # Playback controller
//!
//! Owns the stopped / playing / paused state machine and the timeline clock.
//! Each tick maps wall-clock time onto thread time and scrolls to the
//! response that was latest at that moment.
//!
//! ## State machine
//!
//! ```text
//! Stopped --start--> Playing <--pause/resume--> Paused
//!    ^                  |                          |
//!    +------stop--------+-----------stop-----------+
//! ```
//!
//! Passing the chronologically-last response performs one terminal scroll
//! and leaves the controller paused with `ended` set until the next
//! [`start`](PlaybackController::start).
//!
//! Status flows one way: every change is published as a
//! [`PlaybackSnapshot`] on a `watch` channel and the host renders it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::dom::SharedDocument;
use crate::error::{ReplayError, StartPositionError};
use crate::extract::ResponseEntry;
use crate::settings::{StartAnchor, ThreadSettings};
use crate::start_position::{find_index_anchor, resolve_start_position};
use crate::timeline::{TimelineCalculator, TimelineResponse, TimelineState};
use crate::timestamp::format_long;

pub const SPEED_MULTIPLIER_MIN: f64 = 0.1;
pub const SPEED_MULTIPLIER_MAX: f64 = 10.0;
pub const SPEED_MULTIPLIER_STEP: f64 = 0.1;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Transient message attached to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlaybackNotice {
    /// Started paused; waiting for the toggle key.
    Ready,
    SpeedChanged(f64),
    TimelineEnded,
}

/// What a status display needs to know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub thread_time: Option<NaiveDateTime>,
    pub speed_multiplier: f64,
    pub ended: bool,
    pub notice: Option<PlaybackNotice>,
}

impl PlaybackSnapshot {
    fn stopped(speed_multiplier: f64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            thread_time: None,
            speed_multiplier,
            ended: false,
            notice: None,
        }
    }

    fn same_status(&self, other: &PlaybackSnapshot) -> bool {
        self.state == other.state
            && self.thread_time == other.thread_time
            && self.speed_multiplier == other.speed_multiplier
            && self.ended == other.ended
    }

    /// `[playing] 2024/11/02 12:00:00 | 1.0x`
    pub fn status_text(&self) -> String {
        let label = match self.state {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        let time = self
            .thread_time
            .as_ref()
            .map_or_else(|| "----/--/-- --:--:--".to_string(), format_long);
        format!("[{label}] {time} | {:.1}x", self.speed_multiplier)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub start_paused: bool,
    /// Already-resolved anchor; skips start-position resolution.
    pub start_time: Option<NaiveDateTime>,
}

/// Where keyboard focus was when a key arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FocusTarget {
    #[default]
    Page,
    TextInput,
    TextArea,
    Select,
    ContentEditable,
}

impl FocusTarget {
    /// Shortcuts never fire while the user is typing.
    pub fn accepts_shortcuts(self) -> bool {
        matches!(self, FocusTarget::Page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: char,
    pub focus: FocusTarget,
}

impl KeyInput {
    pub fn page(key: char) -> Self {
        Self {
            key,
            focus: FocusTarget::Page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub speed_up: char,
    pub speed_down: char,
    pub toggle_pause: char,
}

impl KeyBindings {
    /// Bindings match case-insensitively, so they are kept lowercase.
    pub fn normalized(self) -> Self {
        Self {
            speed_up: self.speed_up.to_ascii_lowercase(),
            speed_down: self.speed_down.to_ascii_lowercase(),
            toggle_pause: self.toggle_pause.to_ascii_lowercase(),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            speed_up: 'd',
            speed_down: 's',
            toggle_pause: 'x',
        }
    }
}

/// The host's scroll primitive.
pub trait Scroller {
    fn scroll_to(&mut self, entry: &ResponseEntry);
}

impl<F: FnMut(&ResponseEntry)> Scroller for F {
    fn scroll_to(&mut self, entry: &ResponseEntry) {
        self(entry)
    }
}

/// Result of one [`PlaybackController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do: stopped, paused, or before the first response.
    Idle,
    Scrolled { index: usize },
    Ended,
    /// An internal inconsistency stopped the controller.
    Halted,
}

pub type ControllerErrorCallback = Box<dyn FnMut(&str)>;

pub struct PlaybackController {
    responses: Vec<ResponseEntry>,
    /// Parallel to `responses`.
    timeline: Vec<TimelineResponse>,
    /// Response index to position in `responses`.
    positions: HashMap<usize, usize>,
    settings: ThreadSettings,
    calculator: TimelineCalculator,
    scroller: Box<dyn Scroller>,
    clock: Rc<dyn Clock>,
    /// Live page the entries point into; checked before each scroll.
    document: Option<SharedDocument>,
    on_error: Option<ControllerErrorCallback>,
    bindings: KeyBindings,
    status: watch::Sender<PlaybackSnapshot>,

    state: PlaybackState,
    execution_start_ms: Option<i64>,
    baseline_thread_time: Option<NaiveDateTime>,
    start_thread_time: Option<NaiveDateTime>,
    current_thread_time: Option<NaiveDateTime>,
    speed_multiplier: f64,
    has_scrolled_initial: bool,
    last_response_timestamp: Option<NaiveDateTime>,
    timeline_ended: bool,
    keys_bound: bool,
    ticking: bool,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("responses", &self.responses.len())
            .field("speed_multiplier", &self.speed_multiplier)
            .field("current_thread_time", &self.current_thread_time)
            .field("ended", &self.timeline_ended)
            .finish()
    }
}

impl PlaybackController {
    pub fn new(
        responses: Vec<ResponseEntry>,
        settings: ThreadSettings,
        scroller: Box<dyn Scroller>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(PlaybackSnapshot::stopped(settings.speed_multiplier));
        let mut controller = Self {
            responses: Vec::new(),
            timeline: Vec::new(),
            positions: HashMap::new(),
            speed_multiplier: settings.speed_multiplier,
            settings,
            calculator: TimelineCalculator::new(),
            scroller,
            clock,
            document: None,
            on_error: None,
            bindings: KeyBindings::default(),
            status,
            state: PlaybackState::Stopped,
            execution_start_ms: None,
            baseline_thread_time: None,
            start_thread_time: None,
            current_thread_time: None,
            has_scrolled_initial: false,
            last_response_timestamp: None,
            timeline_ended: false,
            keys_bound: false,
            ticking: false,
        };
        controller.insert_responses(responses);
        controller.last_response_timestamp = controller.latest_timestamp();
        controller
    }

    pub fn with_error_handler(mut self, callback: ControllerErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn with_document(mut self, document: SharedDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_key_bindings(mut self, bindings: KeyBindings) -> Self {
        self.bindings = bindings.normalized();
        self
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn current_thread_time(&self) -> Option<NaiveDateTime> {
        self.current_thread_time
    }

    pub fn is_ended(&self) -> bool {
        self.timeline_ended
    }

    /// Started and not yet at the end of the timeline.
    pub fn is_running(&self) -> bool {
        self.state != PlaybackState::Stopped && !self.timeline_ended
    }

    /// Whether the tick loop should keep going.
    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn responses(&self) -> &[ResponseEntry] {
        &self.responses
    }

    /// Resolve the anchor, reset the clock and run the first tick.
    ///
    /// A resolution failure goes to the error handler and leaves the
    /// controller stopped.
    pub fn start(&mut self, options: StartOptions) -> Result<(), StartPositionError> {
        if self.ticking {
            self.stop();
        }

        let start = match options.start_time {
            Some(time) => time,
            None => match resolve_start_position(&self.settings, &self.responses) {
                Ok(time) => time,
                Err(e) => {
                    error!(kind = e.kind(), error = %e, "could not resolve start position");
                    self.report_error(&e.to_string());
                    return Err(e);
                }
            },
        };

        self.start_thread_time = Some(start);
        self.current_thread_time = Some(start);
        self.execution_start_ms = (!options.start_paused).then(|| self.clock.now_ms());
        self.baseline_thread_time = None;
        self.speed_multiplier = self.settings.speed_multiplier;
        self.has_scrolled_initial = false;
        self.timeline_ended = false;
        self.state = if options.start_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        self.last_response_timestamp = self.latest_timestamp();
        self.ticking = true;
        self.keys_bound = true;

        info!(
            start = %format_long(&start),
            speed = self.speed_multiplier,
            paused = options.start_paused,
            "playback started"
        );
        self.publish(options.start_paused.then_some(PlaybackNotice::Ready));

        self.tick();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.ticking = false;
        self.keys_bound = false;
        self.execution_start_ms = None;
        self.baseline_thread_time = None;
        self.state = PlaybackState::Stopped;
        self.current_thread_time = None;
        self.start_thread_time = None;
        self.has_scrolled_initial = false;
        self.timeline_ended = false;
        self.publish(None);
        debug!("playback stopped");
    }

    /// Advance the clock and scroll to whatever response is current.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.ticking {
            return TickOutcome::Idle;
        }
        let Some(start) = self.start_thread_time else {
            return TickOutcome::Idle;
        };

        match (self.state, self.execution_start_ms) {
            (PlaybackState::Playing, Some(exec)) => {
                let now = self.clock.now_ms();
                let state = self.timeline_state(start, exec);
                self.current_thread_time = Some(self.calculator.current_thread_time(&state, now));
            }
            _ => {
                if self.current_thread_time.is_none() {
                    self.current_thread_time = Some(start);
                }
            }
        }
        let Some(current) = self.current_thread_time else {
            return TickOutcome::Idle;
        };

        if self.last_response_timestamp.is_some_and(|last| current > last) {
            self.end_timeline();
            return TickOutcome::Ended;
        }

        self.publish(None);

        if self.state != PlaybackState::Playing || self.execution_start_ms.is_none() {
            return TickOutcome::Idle;
        }

        let Some(target) = self.calculator.find_previous(&self.timeline, current) else {
            return TickOutcome::Idle;
        };

        if !self.has_scrolled_initial {
            if let StartAnchor::Index(wanted) = self.settings.start {
                if let Some(anchor) = find_index_anchor(wanted, &self.responses).cloned() {
                    self.has_scrolled_initial = true;
                    return self.scroll_or_halt(&anchor);
                }
            }
        }

        match self.positions.get(&target.index).copied() {
            Some(position) => {
                let entry = self.responses[position].clone();
                self.scroll_or_halt(&entry)
            }
            None => self.halt(target.index),
        }
    }

    fn scroll_or_halt(&mut self, entry: &ResponseEntry) -> TickOutcome {
        if !self.element_present(entry) {
            return self.halt(entry.index);
        }
        self.scroller.scroll_to(entry);
        TickOutcome::Scrolled { index: entry.index }
    }

    /// A busy document is assumed unchanged.
    fn element_present(&self, entry: &ResponseEntry) -> bool {
        match &self.document {
            Some(document) => document
                .try_borrow()
                .map_or(true, |doc| doc.is_attached(entry.element)),
            None => true,
        }
    }

    fn halt(&mut self, index: usize) -> TickOutcome {
        let err = ReplayError::MissingElement { index };
        error!(index, "response has no element, stopping playback");
        self.report_error(&err.to_string());
        self.stop();
        TickOutcome::Halted
    }

    /// Nudge the speed by `delta`, rounded to one decimal and clamped.
    ///
    /// While playing, the current thread time is frozen first so the change
    /// does not make the timeline jump.
    pub fn adjust_speed(&mut self, delta: f64) {
        if self.timeline_ended {
            return;
        }
        if self.execution_start_ms.is_none() && self.state != PlaybackState::Paused {
            return;
        }

        let rounded = ((self.speed_multiplier + delta) * 10.0).round() / 10.0;
        let clamped = rounded.clamp(SPEED_MULTIPLIER_MIN, SPEED_MULTIPLIER_MAX);
        if (clamped - self.speed_multiplier).abs() < f64::EPSILON {
            return;
        }
        let Some(start) = self.start_thread_time else {
            return;
        };

        if let (PlaybackState::Playing, Some(exec)) = (self.state, self.execution_start_ms) {
            let now = self.clock.now_ms();
            let frozen = self
                .calculator
                .current_thread_time(&self.timeline_state(start, exec), now);
            self.baseline_thread_time = Some(frozen);
            self.current_thread_time = Some(frozen);
            self.execution_start_ms = Some(now);
        }

        self.speed_multiplier = clamped;
        debug!(speed = clamped, "speed changed");
        self.publish(Some(PlaybackNotice::SpeedChanged(clamped)));
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(start) = self.start_thread_time else {
            return;
        };

        if let Some(exec) = self.execution_start_ms {
            let frozen = self
                .calculator
                .current_thread_time(&self.timeline_state(start, exec), self.clock.now_ms());
            self.baseline_thread_time = Some(frozen);
            self.current_thread_time = Some(frozen);
        }
        self.execution_start_ms = None;
        self.state = PlaybackState::Paused;
        self.publish(None);
    }

    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused || self.timeline_ended {
            return;
        }
        self.execution_start_ms = Some(self.clock.now_ms());
        self.state = PlaybackState::Playing;
        self.publish(None);
    }

    pub fn toggle_pause(&mut self) {
        if self.state == PlaybackState::Paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Apply a shortcut. Returns whether it was consumed.
    pub fn handle_key(&mut self, input: KeyInput) -> bool {
        if !self.keys_bound || !input.focus.accepts_shortcuts() {
            return false;
        }
        let key = input.key.to_ascii_lowercase();
        if key == self.bindings.speed_up {
            self.adjust_speed(SPEED_MULTIPLIER_STEP);
        } else if key == self.bindings.speed_down {
            self.adjust_speed(-SPEED_MULTIPLIER_STEP);
        } else if key == self.bindings.toggle_pause {
            self.toggle_pause();
        } else {
            return false;
        }
        true
    }

    /// Add responses found after playback began.
    ///
    /// An entry whose index is already known replaces the old one.
    pub fn append_responses(&mut self, added: Vec<ResponseEntry>) {
        if added.is_empty() {
            return;
        }
        let count = added.len();
        self.insert_responses(added);
        self.last_response_timestamp = self.latest_timestamp();
        debug!(added = count, total = self.responses.len(), "responses appended to playback");
    }

    fn insert_responses(&mut self, entries: Vec<ResponseEntry>) {
        for entry in entries {
            match self.positions.get(&entry.index).copied() {
                Some(position) => {
                    self.timeline[position] = entry.to_timeline();
                    self.responses[position] = entry;
                }
                None => {
                    self.positions.insert(entry.index, self.responses.len());
                    self.timeline.push(entry.to_timeline());
                    self.responses.push(entry);
                }
            }
        }
    }

    fn end_timeline(&mut self) {
        if self.timeline_ended {
            return;
        }
        self.timeline_ended = true;

        let last = self
            .responses
            .iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.index.cmp(&b.index)))
            .cloned();
        if let Some(last) = last {
            self.current_thread_time = Some(last.timestamp);
            self.scroller.scroll_to(&last);
        }

        self.ticking = false;
        self.keys_bound = false;
        self.execution_start_ms = None;
        self.state = PlaybackState::Paused;
        info!("timeline ended");
        self.publish(Some(PlaybackNotice::TimelineEnded));
    }

    fn latest_timestamp(&self) -> Option<NaiveDateTime> {
        self.responses.iter().map(|r| r.timestamp).max()
    }

    fn timeline_state(&self, start: NaiveDateTime, exec: i64) -> TimelineState {
        TimelineState {
            thread_start_time: start,
            execution_start_ms: exec,
            speed_multiplier: self.speed_multiplier,
            baseline_thread_time: self.baseline_thread_time,
        }
    }

    fn report_error(&mut self, message: &str) {
        if let Some(callback) = self.on_error.as_mut() {
            callback(message);
        }
    }

    fn publish(&self, notice: Option<PlaybackNotice>) {
        let snapshot = PlaybackSnapshot {
            state: self.state,
            thread_time: self.current_thread_time,
            speed_multiplier: self.speed_multiplier,
            ended: self.timeline_ended,
            notice,
        };
        // A plain refresh keeps the pending notice on screen.
        self.status.send_if_modified(|current| {
            if notice.is_none() && current.same_status(&snapshot) {
                return false;
            }
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

/// Drive a started controller: ticks on `tick_interval`, plus keys and
/// appended batches as they arrive. Ends once the controller stops ticking.
///
/// Must be called inside a [`tokio::task::LocalSet`].
pub fn spawn_playback(
    controller: Rc<RefCell<PlaybackController>>,
    mut keys: mpsc::UnboundedReceiver<KeyInput>,
    mut appended: mpsc::UnboundedReceiver<Vec<ResponseEntry>>,
    tick_interval: Duration,
) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        // `start` already ran the first tick.
        let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keys_open = true;
        let mut appended_open = true;

        while controller.borrow().is_ticking() {
            tokio::select! {
                _ = ticker.tick() => {
                    controller.borrow_mut().tick();
                }
                key = keys.recv(), if keys_open => match key {
                    Some(key) => {
                        controller.borrow_mut().handle_key(key);
                    }
                    None => keys_open = false,
                },
                batch = appended.recv(), if appended_open => match batch {
                    Some(batch) => controller.borrow_mut().append_responses(batch),
                    None => appended_open = false,
                },
            }
        }
        debug!("playback loop finished");
    })
}
