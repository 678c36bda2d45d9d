//! # futaba-replay
//!
//! Replays an imageboard thread page as if it were being written live:
//! responses are extracted with their post times, wall-clock time is mapped
//! onto thread time at an adjustable speed, and the host is asked to scroll
//! to whichever response was latest at that moment.
//!
//! ## Pieces
//!
//! - [`dom`] and [`format`]: the parsed page and the per-site layout quirks.
//! - [`extract`]: thread document to ordered [`ResponseEntry`] records.
//! - [`timeline`]: pure time mapping and lookup.
//! - [`controller`]: the playback state machine and its tick driver.
//! - [`update_manager`]: polls the live page for appended responses.
//! - [`merge`]: pulls other thread pages into the live one.
//! - [`session`]: wires all of the above for one replay.
//!
//! Everything runs on one thread inside a [`tokio::task::LocalSet`]; the
//! document is shared as `Rc<RefCell<_>>` and no borrow is held across an
//! `.await`.

pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod format;
pub mod hash;
pub mod merge;
pub mod session;
pub mod settings;
pub mod start_position;
pub mod timeline;
pub mod timestamp;
pub mod update_manager;
pub mod validation;

pub use controller::{PlaybackController, PlaybackSnapshot, PlaybackState};
pub use dom::{SharedDocument, ThreadDocument};
pub use error::ReplayError;
pub use extract::{extract_responses, ResponseEntry};
pub use session::ReplaySession;
pub use settings::{StartAnchor, ThreadSettings};
