//! Tests for the live update manager polling a real document on a paused
//! tokio clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futaba_replay::dom::{SharedDocument, ThreadDocument};
use futaba_replay::error::ReplayError;
use futaba_replay::extract::ResponseEntry;
use futaba_replay::update_manager::LiveUpdateManager;
use tokio::task::LocalSet;

const POLL: Duration = Duration::from_secs(10);

fn reply(no: u64, minute: u32) -> String {
    format!(
        r#"<table><tr><td class="rtd"><span class="cnw">24/11/02(土)12:{minute:02}:00</span><span class="cno">No.{no}</span><blockquote>r{no}</blockquote></td></tr></table>"#
    )
}

fn page(posts: &[u64]) -> ThreadDocument {
    let inner: String = posts.iter().map(|&no| reply(no, no as u32)).collect();
    ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre">{inner}</div></body></html>"#
    ))
}

fn rewrite(doc: &SharedDocument, posts: &[u64]) {
    *doc.borrow_mut() = page(posts);
}

type Batches = Rc<RefCell<Vec<Vec<ResponseEntry>>>>;

fn recording_manager(doc: &SharedDocument) -> (LiveUpdateManager, Batches) {
    let batches: Batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    let manager = LiveUpdateManager::builder(Rc::clone(doc))
        .poll_interval(POLL)
        .on_responses_added(Box::new(move |added| sink.borrow_mut().push(added)))
        .build();
    (manager, batches)
}

async fn next_poll() {
    tokio::time::sleep(POLL + Duration::from_millis(1)).await;
}

fn post_numbers(batch: &[ResponseEntry]) -> Vec<Option<u64>> {
    batch.iter().map(|r| r.post_no).collect()
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_appended_posts_are_reported() {
    LocalSet::new()
        .run_until(async {
            let doc = page(&[1, 2]).into_shared();
            let (mut manager, batches) = recording_manager(&doc);
            manager.start();

            next_poll().await;
            assert!(batches.borrow().is_empty(), "no change, no callback");

            rewrite(&doc, &[1, 2, 3]);
            next_poll().await;
            assert_eq!(batches.borrow().len(), 1);
            assert_eq!(post_numbers(&batches.borrow()[0]), vec![Some(3)]);
            assert_eq!(manager.current_responses().len(), 3);
            manager.stop();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_shrink_then_grow_reports_only_new_posts() {
    LocalSet::new()
        .run_until(async {
            let doc = page(&[1, 2, 3]).into_shared();
            let (mut manager, batches) = recording_manager(&doc);
            manager.start();

            rewrite(&doc, &[1, 2]);
            next_poll().await;
            assert!(batches.borrow().is_empty());

            rewrite(&doc, &[1, 2, 4, 5]);
            next_poll().await;

            let seen = batches.borrow();
            assert_eq!(seen.len(), 1);
            assert_eq!(post_numbers(&seen[0]), vec![Some(4), Some(5)]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling() {
    LocalSet::new()
        .run_until(async {
            let doc = page(&[1]).into_shared();
            let (mut manager, batches) = recording_manager(&doc);
            manager.start();
            manager.stop();
            manager.stop();
            assert!(!manager.is_running());

            rewrite(&doc, &[1, 2]);
            next_poll().await;
            next_poll().await;
            assert!(batches.borrow().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_busy_document_is_retried_next_tick() {
    LocalSet::new()
        .run_until(async {
            let doc = page(&[1]).into_shared();
            let errors = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&errors);
            let batches: Batches = Rc::new(RefCell::new(Vec::new()));
            let added = Rc::clone(&batches);
            let mut manager = LiveUpdateManager::builder(Rc::clone(&doc))
                .poll_interval(POLL)
                .on_responses_added(Box::new(move |a| added.borrow_mut().push(a)))
                .on_error(Box::new(move |e: &ReplayError| sink.borrow_mut().push(e.to_string())))
                .build();
            manager.start();

            rewrite(&doc, &[1, 2]);
            {
                let _held = doc.borrow_mut();
                next_poll().await;
            }
            assert_eq!(errors.borrow().len(), 1);
            assert!(batches.borrow().is_empty());

            next_poll().await;
            assert_eq!(batches.borrow().len(), 1);
            assert_eq!(post_numbers(&batches.borrow()[0]), vec![Some(2)]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_callback_may_read_manager_state() {
    LocalSet::new()
        .run_until(async {
            let doc = page(&[1]).into_shared();
            let observed = Rc::new(RefCell::new(0usize));
            let sink = Rc::clone(&observed);
            let reader = Rc::clone(&doc);
            let mut manager = LiveUpdateManager::builder(Rc::clone(&doc))
                .poll_interval(POLL)
                .on_responses_added(Box::new(move |_| {
                    // The document must not still be borrowed by the poll.
                    *sink.borrow_mut() = futaba_replay::extract_responses(&reader.borrow()).len();
                }))
                .build();
            manager.start();
            rewrite(&doc, &[1, 2, 3]);
            next_poll().await;
            assert_eq!(*observed.borrow(), 3);
        })
        .await;
}
