//! # Replay session
//!
//! Owns one complete replay of one document: the live update manager, the
//! playback controller and the task driving it. A host that wants to start
//! over disposes the current session (an awaited step) and launches a new
//! one; nothing is kept in globals.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ReplayConfig;
use crate::controller::{
    spawn_playback, KeyInput, PlaybackController, PlaybackSnapshot, Scroller, StartOptions,
};
use crate::dom::SharedDocument;
use crate::error::ReplayError;
use crate::fetcher::DocumentFetcher;
use crate::merge::{merge_threads, MergeProgress};
use crate::settings::ThreadSettings;
use crate::start_position::resolve_start_position;
use crate::update_manager::LiveUpdateManager;

pub struct ReplaySession {
    document: SharedDocument,
    manager: LiveUpdateManager,
    controller: Rc<RefCell<PlaybackController>>,
    keys: mpsc::UnboundedSender<KeyInput>,
    status: watch::Receiver<PlaybackSnapshot>,
    driver: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ReplaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySession")
            .field("manager", &self.manager)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl ReplaySession {
    /// Launch against the system clock. See [`launch_with_clock`](Self::launch_with_clock).
    pub async fn launch<F: DocumentFetcher>(
        document: SharedDocument,
        settings: ThreadSettings,
        config: &ReplayConfig,
        fetcher: &F,
        scroller: Box<dyn Scroller>,
        progress: &mut dyn MergeProgress,
    ) -> Result<Self, ReplayError> {
        Self::launch_with_clock(
            document,
            settings,
            config,
            fetcher,
            scroller,
            Rc::new(SystemClock),
            progress,
        )
        .await
    }

    /// Start live updates, merge any extra threads, resolve the anchor and
    /// begin playback.
    ///
    /// Fails with [`ReplayError::NoResponses`] when the page has nothing to
    /// play and with [`ReplayError::StartPosition`] when the anchor does not
    /// resolve, so the host can ask for different settings. Must run inside
    /// a [`tokio::task::LocalSet`].
    pub async fn launch_with_clock<F: DocumentFetcher>(
        document: SharedDocument,
        settings: ThreadSettings,
        config: &ReplayConfig,
        fetcher: &F,
        scroller: Box<dyn Scroller>,
        clock: Rc<dyn Clock>,
        progress: &mut dyn MergeProgress,
    ) -> Result<Self, ReplayError> {
        let (added_tx, added_rx) = mpsc::unbounded_channel();
        let mut manager = LiveUpdateManager::builder(Rc::clone(&document))
            .poll_interval(config.poll_interval())
            .tail_size(config.tail_comparison)
            .on_responses_added(Box::new(move |added| {
                if added_tx.send(added).is_err() {
                    debug!("playback gone, dropping added responses");
                }
            }))
            .on_error(Box::new(|e| warn!(error = %e, "live update failed")))
            .build();

        manager.start();
        if manager.current_responses().is_empty() {
            manager.stop();
            return Err(ReplayError::NoResponses);
        }

        let responses = merge_threads(
            &settings.additional_thread_urls,
            fetcher,
            &document,
            &mut manager,
            progress,
        )
        .await?;
        if responses.is_empty() {
            return Err(ReplayError::NoResponses);
        }

        let start_time = resolve_start_position(&settings, &responses)?;

        let mut controller = PlaybackController::new(responses, settings, scroller, clock)
            .with_document(Rc::clone(&document))
            .with_key_bindings(config.keys)
            .with_error_handler(Box::new(|message| error!(message, "playback error")));
        controller.start(StartOptions {
            start_paused: config.start_paused,
            start_time: Some(start_time),
        })?;
        let status = controller.subscribe();

        let controller = Rc::new(RefCell::new(controller));
        let (keys, keys_rx) = mpsc::unbounded_channel();
        let driver = spawn_playback(
            Rc::clone(&controller),
            keys_rx,
            added_rx,
            config.tick_interval(),
        );
        info!("replay session launched");

        Ok(Self {
            document,
            manager,
            controller,
            keys,
            status,
            driver: Some(driver),
        })
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn controller(&self) -> &Rc<RefCell<PlaybackController>> {
        &self.controller
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.status.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.manager.is_running()
    }

    /// Queue a key press for the playback driver.
    pub fn send_key(&self, input: KeyInput) -> bool {
        self.keys.send(input).is_ok()
    }

    /// A sender for hosts that read keys on another task or thread.
    pub fn key_sender(&self) -> mpsc::UnboundedSender<KeyInput> {
        self.keys.clone()
    }

    /// Resolve once playback stops on its own (timeline end or a halt).
    pub async fn wait(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            if let Err(e) = driver.await {
                if !e.is_cancelled() {
                    error!(error = %e, "playback driver failed");
                }
            }
            self.driver = None;
        }
    }

    /// Stop everything and wait for the driver task to go away.
    pub async fn dispose(mut self) {
        self.manager.stop();
        self.controller.borrow_mut().stop();
        if let Some(driver) = self.driver.take() {
            driver.abort();
            if let Err(e) = driver.await {
                if !e.is_cancelled() {
                    error!(error = %e, "playback driver failed");
                }
            }
        }
        info!("replay session disposed");
    }
}
