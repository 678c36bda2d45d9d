//! End-to-end tests for a replay session: launch, keys, live additions and
//! disposal.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futaba_replay::clock::ManualClock;
use futaba_replay::config::ReplayConfig;
use futaba_replay::controller::{KeyInput, PlaybackNotice, PlaybackState, Scroller};
use futaba_replay::dom::{SharedDocument, ThreadDocument};
use futaba_replay::error::ReplayError;
use futaba_replay::extract::ResponseEntry;
use futaba_replay::fetcher::DocumentFetcher;
use futaba_replay::merge::TracingProgress;
use futaba_replay::session::ReplaySession;
use futaba_replay::settings::{StartAnchor, ThreadSettings};
use tokio::task::LocalSet;

const MERGE_URL: &str = "https://may.2chan.net/b/res/1.htm";

struct OnePage(String);

impl DocumentFetcher for OnePage {
    async fn fetch_document(&self, url: &str) -> Result<ThreadDocument, ReplayError> {
        if url == MERGE_URL {
            Ok(ThreadDocument::parse(&self.0))
        } else {
            Err(ReplayError::Transport {
                url: url.to_string(),
                detail: "unreachable".into(),
            })
        }
    }
}

fn reply(no: u64, minute: u32) -> String {
    format!(
        r#"<table><tr><td class="rtd"><span class="cnw">24/11/02(土)12:{minute:02}:00</span><span class="cno">No.{no}</span><blockquote>r{no}</blockquote></td></tr></table>"#
    )
}

fn page(posts: &[u64]) -> String {
    let inner: String = posts.iter().map(|&no| reply(no, no as u32)).collect();
    format!(r#"<html><body><div class="thre">{inner}</div></body></html>"#)
}

fn shared(posts: &[u64]) -> SharedDocument {
    ThreadDocument::parse(&page(posts)).into_shared()
}

fn config() -> ReplayConfig {
    ReplayConfig {
        poll_interval_ms: 1_000,
        tick_interval_ms: 100,
        ..ReplayConfig::default()
    }
}

fn recorder() -> (Box<dyn Scroller>, Rc<RefCell<Vec<usize>>>) {
    let scrolled = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&scrolled);
    (
        Box::new(move |e: &ResponseEntry| sink.borrow_mut().push(e.index)),
        scrolled,
    )
}

async fn launch(
    doc: SharedDocument,
    settings: ThreadSettings,
    clock: &ManualClock,
) -> Result<(ReplaySession, Rc<RefCell<Vec<usize>>>), ReplayError> {
    let (scroller, scrolled) = recorder();
    let session = ReplaySession::launch_with_clock(
        doc,
        settings,
        &config(),
        &OnePage(page(&[1, 2])),
        scroller,
        Rc::new(clock.clone()),
        &mut TracingProgress,
    )
    .await?;
    Ok((session, scrolled))
}

// ---------------------------------------------------------------------------
// Launch failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_thread_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let doc = ThreadDocument::parse("<html><body><p>404</p></body></html>").into_shared();
            let err = launch(doc, ThreadSettings::default(), &ManualClock::new(0))
                .await
                .unwrap_err();
            assert!(matches!(err, ReplayError::NoResponses));
            assert!(err.is_user_facing());
        })
        .await;
}

#[tokio::test]
async fn test_unknown_post_number_is_a_start_error() {
    LocalSet::new()
        .run_until(async {
            let settings = ThreadSettings {
                start: StartAnchor::No("No.999".into()),
                ..ThreadSettings::default()
            };
            let err = launch(shared(&[3, 4]), settings, &ManualClock::new(0))
                .await
                .unwrap_err();
            assert!(matches!(err, ReplayError::StartPosition(_)));
        })
        .await;
}

#[tokio::test]
async fn test_unreachable_merge_url_fails_launch() {
    LocalSet::new()
        .run_until(async {
            let settings = ThreadSettings {
                additional_thread_urls: vec!["https://example.com/res/9.htm".into()],
                ..ThreadSettings::default()
            };
            let err = launch(shared(&[3]), settings, &ManualClock::new(0))
                .await
                .unwrap_err();
            assert!(matches!(err, ReplayError::Transport { .. }));
        })
        .await;
}

// ---------------------------------------------------------------------------
// Running session
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_merged_session_starts_paused_and_toggles() {
    LocalSet::new()
        .run_until(async {
            let clock = ManualClock::new(0);
            let settings = ThreadSettings {
                start: StartAnchor::Index(0),
                additional_thread_urls: vec![MERGE_URL.into()],
                ..ThreadSettings::default()
            };
            let (session, scrolled) = launch(shared(&[3, 4]), settings, &clock)
                .await
                .expect("launch");

            let status = session.subscribe();
            assert_eq!(status.borrow().state, PlaybackState::Paused);
            assert_eq!(status.borrow().notice, Some(PlaybackNotice::Ready));
            assert_eq!(session.controller().borrow().responses().len(), 4);
            assert!(scrolled.borrow().is_empty());
            assert!(session.is_polling());

            assert!(session.send_key(KeyInput::page('x')));
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(session.controller().borrow().state(), PlaybackState::Playing);
            assert_eq!(scrolled.borrow().first(), Some(&0));

            session.dispose().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_live_additions_reach_playback() {
    LocalSet::new()
        .run_until(async {
            let doc = shared(&[1, 2]);
            let (session, _) = launch(Rc::clone(&doc), ThreadSettings::default(), &ManualClock::new(0))
                .await
                .expect("launch");
            assert_eq!(session.controller().borrow().responses().len(), 2);

            *doc.borrow_mut() = ThreadDocument::parse(&page(&[1, 2, 5]));
            tokio::time::sleep(Duration::from_millis(1_050)).await;
            assert_eq!(session.controller().borrow().responses().len(), 3);

            session.dispose().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_when_timeline_ends() {
    LocalSet::new()
        .run_until(async {
            let clock = ManualClock::new(0);
            let settings = ThreadSettings {
                start: StartAnchor::Index(1),
                ..ThreadSettings::default()
            };
            let (mut session, scrolled) = launch(shared(&[1, 2]), settings, &clock)
                .await
                .expect("launch");
            session.send_key(KeyInput::page('x'));
            tokio::time::sleep(Duration::from_millis(10)).await;

            clock.advance(5_000);
            session.wait().await;
            assert!(session.controller().borrow().is_ended());
            assert_eq!(scrolled.borrow().last(), Some(&1));
            assert!(session.subscribe().borrow().ended);
            session.dispose().await;
        })
        .await;
}
