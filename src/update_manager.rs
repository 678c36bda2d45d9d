//! # Live update manager
//!
//! Re-captures the live document on an interval and reports responses that
//! were genuinely appended since the previous capture.
//!
//! Only the last few entries of the previous capture are compared (the
//! "tail"), so a poll costs one extraction plus a handful of identity
//! lookups. Deleting posts between polls shrinks the capture; the next
//! growth is diffed against the shrunken snapshot, so nothing already seen
//! is announced twice.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut manager = LiveUpdateManager::builder(Rc::clone(&document))
//!     .poll_interval(Duration::from_secs(10))
//!     .on_responses_added(Box::new(move |added| { let _ = tx.send(added); }))
//!     .build();
//! manager.start(); // inside a LocalSet
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dom::SharedDocument;
use crate::error::ReplayError;
use crate::extract::{extract_responses, ResponseEntry};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_TAIL_SIZE: usize = 5;

pub type AddedCallback = Box<dyn FnMut(Vec<ResponseEntry>)>;
pub type ErrorCallback = Box<dyn FnMut(&ReplayError)>;

/// Where captures come from.
pub trait ResponseSource {
    fn capture(&self) -> Result<Vec<ResponseEntry>, ReplayError>;
}

impl ResponseSource for SharedDocument {
    fn capture(&self) -> Result<Vec<ResponseEntry>, ReplayError> {
        let doc = self.try_borrow().map_err(|_| ReplayError::DocumentBusy)?;
        Ok(extract_responses(&doc))
    }
}

struct ManagerState {
    source: Box<dyn ResponseSource>,
    current: Vec<ResponseEntry>,
    tail_size: usize,
    on_added: Option<AddedCallback>,
    on_error: Option<ErrorCallback>,
}

/// Polls a [`ResponseSource`] and diffs successive captures.
///
/// Idle until [`start`](Self::start); the poll loop is a `spawn_local`
/// task, so `start` must run inside a [`tokio::task::LocalSet`].
pub struct LiveUpdateManager {
    state: Rc<RefCell<ManagerState>>,
    poll_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LiveUpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveUpdateManager")
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl LiveUpdateManager {
    pub fn builder(source: impl ResponseSource + 'static) -> LiveUpdateManagerBuilder {
        LiveUpdateManagerBuilder::new(source)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Seed the current set and begin polling.
    ///
    /// A failed seed capture is reported through the error callback and
    /// leaves the manager idle. Starting a running manager is a no-op.
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!("live update manager is already running");
            return;
        }

        let seeded = self.state.borrow().source.capture();
        match seeded {
            Ok(responses) => {
                debug!(count = responses.len(), "seeded live responses");
                self.state.borrow_mut().current = responses;
            }
            Err(e) => {
                error!(error = %e, "failed to capture initial responses");
                notify_error(&self.state, &e);
                return;
            }
        }

        let state = Rc::clone(&self.state);
        let period = self.poll_interval;
        self.task = Some(tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                poll_once(&state);
            }
        }));
    }

    /// Stop polling. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("live update manager stopped");
        }
    }

    /// A copy of the most recent capture.
    pub fn current_responses(&self) -> Vec<ResponseEntry> {
        self.state.borrow().current.clone()
    }

    /// Run one poll now, outside the timer. Returns what was added.
    pub fn refresh(&self) -> Vec<ResponseEntry> {
        poll_once(&self.state)
    }
}

impl Drop for LiveUpdateManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_once(state: &Rc<RefCell<ManagerState>>) -> Vec<ResponseEntry> {
    let captured = state.borrow().source.capture();
    match captured {
        Ok(fresh) => {
            let added = {
                let mut st = state.borrow_mut();
                let added = detect_added(&st.current, &fresh, st.tail_size);
                st.current = fresh;
                added
            };
            if !added.is_empty() {
                info!(added = added.len(), "new responses detected");
                notify_added(state, added.clone());
            }
            added
        }
        Err(e) => {
            warn!(error = %e, "response poll failed, will retry next tick");
            notify_error(state, &e);
            Vec::new()
        }
    }
}

// Callbacks run with the state borrow released so they may call back in.
fn notify_added(state: &Rc<RefCell<ManagerState>>, added: Vec<ResponseEntry>) {
    let callback = state.borrow_mut().on_added.take();
    if let Some(mut callback) = callback {
        callback(added);
        state.borrow_mut().on_added = Some(callback);
    }
}

fn notify_error(state: &Rc<RefCell<ManagerState>>, err: &ReplayError) {
    let callback = state.borrow_mut().on_error.take();
    if let Some(mut callback) = callback {
        callback(err);
        state.borrow_mut().on_error = Some(callback);
    }
}

/// Entries of `current` that are new relative to `previous`.
///
/// Nothing at a position below `previous.len()` is ever reported, even when
/// it fails to match the tail.
pub fn detect_added(
    previous: &[ResponseEntry],
    current: &[ResponseEntry],
    tail_size: usize,
) -> Vec<ResponseEntry> {
    if current.len() <= previous.len() {
        return Vec::new();
    }

    let tail = tail_size.min(previous.len());
    let window_start = previous.len() - tail;
    let known: HashSet<String> = previous[window_start..]
        .iter()
        .map(ResponseEntry::identity)
        .collect();

    let first_unknown = current[window_start..]
        .iter()
        .position(|entry| !known.contains(&entry.identity()))
        .map(|offset| window_start + offset);

    let start = first_unknown.map_or(previous.len(), |i| i.max(previous.len()));
    current[start..].to_vec()
}

/// Builder for [`LiveUpdateManager`].
pub struct LiveUpdateManagerBuilder {
    source: Box<dyn ResponseSource>,
    poll_interval: Duration,
    tail_size: usize,
    on_added: Option<AddedCallback>,
    on_error: Option<ErrorCallback>,
}

impl LiveUpdateManagerBuilder {
    pub fn new(source: impl ResponseSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tail_size: DEFAULT_TAIL_SIZE,
            on_added: None,
            on_error: None,
        }
    }

    /// Override the poll interval (default 10 s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override how many trailing entries are compared (default 5).
    pub fn tail_size(mut self, size: usize) -> Self {
        self.tail_size = size;
        self
    }

    pub fn on_responses_added(mut self, callback: AddedCallback) -> Self {
        self.on_added = Some(callback);
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn build(self) -> LiveUpdateManager {
        LiveUpdateManager {
            state: Rc::new(RefCell::new(ManagerState {
                source: self.source,
                current: Vec::new(),
                tail_size: self.tail_size,
                on_added: self.on_added,
                on_error: self.on_error,
            })),
            poll_interval: self.poll_interval,
            task: None,
        }
    }
}
