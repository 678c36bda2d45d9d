//! Tests for response extraction across container shapes and malformed
//! input.

use futaba_replay::dom::ThreadDocument;
use futaba_replay::extract::extract_responses;
use futaba_replay::format::{detect_format, ThreadFormat};
use futaba_replay::timestamp::parse_timestamp;

/// Records `tracing` events emitted while a closure runs.
mod log_capture {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Debug, Clone)]
    pub struct CapturedEvent {
        pub level: tracing::Level,
        pub fields: HashMap<String, String>,
    }

    struct EventCapture(Arc<Mutex<Vec<CapturedEvent>>>);

    struct FieldVisitor(HashMap<String, String>);

    impl tracing::field::Visit for FieldVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut visitor = FieldVisitor(HashMap::new());
            event.record(&mut visitor);
            self.0.lock().unwrap().push(CapturedEvent {
                level: *event.metadata().level(),
                fields: visitor.0,
            });
        }
    }

    pub fn with_captured_events<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(EventCapture(Arc::clone(&events)));
        let result = tracing::subscriber::with_default(subscriber, f);
        let captured = events.lock().unwrap().clone();
        (result, captured)
    }
}

fn table(no: &str, stamp: &str) -> String {
    format!(
        r#"<table><tr><td class="rtd"><span class="cnw">{stamp}</span><span class="cno">{no}</span><blockquote>body of {no}</blockquote></td></tr></table>"#
    )
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[test]
fn test_unparseable_group_is_skipped() {
    let doc = ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre">{}{}</div></body></html>"#,
        table("No.1", "24/11/02(月)12:00:00"),
        table("No.2", "24/11/02(土)12:01:00"),
    ));
    let responses = extract_responses(&doc);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].post_no, Some(2));
    assert_eq!(responses[0].index, 0);
}

#[test]
fn test_unparseable_group_logs_a_warning() {
    let doc = ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre">{}{}</div></body></html>"#,
        table("No.1", "24/11/02(月)12:00:00"),
        table("No.2", "24/11/02(土)12:01:00"),
    ));
    let (responses, events) = log_capture::with_captured_events(|| extract_responses(&doc));
    assert_eq!(responses.len(), 1);

    let warnings: Vec<_> = events
        .iter()
        .filter(|e| e.level == tracing::Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1);
    let fields = &warnings[0].fields;
    assert!(fields["message"].contains("failed to parse response timestamp"));
    assert_eq!(fields["text"], "24/11/02(月)12:00:00");
}

#[test]
fn test_group_without_post_number_is_not_a_response() {
    let doc = ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre"><table><tr><td><span class="cnw">24/11/02(土)12:00:00</span></td></tr></table>{}</div></body></html>"#,
        table("No.5", "24/11/02(土)12:01:00"),
    ));
    let responses = extract_responses(&doc);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].post_no, Some(5));
}

#[test]
fn test_empty_page_yields_nothing() {
    let doc = ThreadDocument::parse("<html><body></body></html>");
    assert!(extract_responses(&doc).is_empty());
}

// ---------------------------------------------------------------------------
// Container fallbacks
// ---------------------------------------------------------------------------

#[test]
fn test_data_res_container() {
    let doc = ThreadDocument::parse(&format!(
        r#"<html><body><div data-res="1">{}</div></body></html>"#,
        table("No.8", "2024/11/02 12:00:00"),
    ));
    let responses = extract_responses(&doc);
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].timestamp,
        parse_timestamp("24/11/02(土)12:00:00").unwrap()
    );
}

#[test]
fn test_top_level_div_around_timestamps() {
    let doc = ThreadDocument::parse(&format!(
        r#"<html><body><div id="log">{}{}</div></body></html>"#,
        table("No.1", "24/11/02(土)12:00:00"),
        table("No.2", "24/11/02(土)12:00:30"),
    ));
    assert_eq!(extract_responses(&doc).len(), 2);
}

// ---------------------------------------------------------------------------
// Layout-specific pages
// ---------------------------------------------------------------------------

#[test]
fn test_futafuta_loose_starter_and_replies() {
    let mut doc = ThreadDocument::parse(&format!(
        r#"<html><head><title>futafuta log</title></head><body><div class="thre">画像ファイル名：1.jpg<a href="1.jpg">img</a><span class="cnw">24/11/02(土)11:58:00</span><span class="cno">No.100</span><blockquote>スレ本文</blockquote>{}{}</div></body></html>"#,
        table("No.101", "24/11/02(土)11:59:00"),
        table("No.102", "24/11/02(土)12:00:00"),
    ));
    let format = detect_format(&doc);
    assert_eq!(format, ThreadFormat::Futafuta);
    format.extract_groups(&mut doc);

    let responses = extract_responses(&doc);
    let nos: Vec<_> = responses.iter().map(|r| r.post_no).collect();
    assert_eq!(nos, vec![Some(100), Some(101), Some(102)]);
    assert!(responses[0].all_nodes.is_some());
    assert_ne!(responses[0].content_hash, responses[1].content_hash);
}

#[test]
fn test_identity_changes_with_content() {
    let a = ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre">{}</div></body></html>"#,
        table("No.1", "24/11/02(土)12:00:00"),
    ));
    let b = ThreadDocument::parse(&format!(
        r#"<html><body><div class="thre">{}</div></body></html>"#,
        table("No.2", "24/11/02(土)12:00:00"),
    ));
    assert_ne!(
        extract_responses(&a)[0].identity(),
        extract_responses(&b)[0].identity()
    );
}
