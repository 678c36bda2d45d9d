use std::io::BufRead;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, LocalSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use futaba_replay::cli::Args;
use futaba_replay::config::ReplayConfig;
use futaba_replay::controller::{KeyInput, PlaybackNotice, PlaybackSnapshot};
use futaba_replay::dom::{SharedDocument, ThreadDocument};
use futaba_replay::error::ReplayError;
use futaba_replay::extract::{extract_responses, ResponseEntry};
use futaba_replay::fetcher::{decode_html, DocumentFetcher, HttpFetcher};
use futaba_replay::format::detect_format;
use futaba_replay::merge::{merge_into_document, FetchedThread, TracingProgress};
use futaba_replay::session::ReplaySession;
use futaba_replay::settings::UiMode;
use futaba_replay::timestamp::format_long;

const EXCERPT_CHARS: usize = 60;

// ---------------------------------------------------------------------------
// Terminal output
// ---------------------------------------------------------------------------

fn excerpt(document: &SharedDocument, entry: &ResponseEntry) -> String {
    let Ok(doc) = document.try_borrow() else {
        return String::new();
    };
    let text = doc.text_content(entry.element);
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: String = flat.chars().take(EXCERPT_CHARS).collect();
    if flat.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}

fn print_scroll(document: &SharedDocument, entry: &ResponseEntry, json: bool) {
    if json {
        let line = serde_json::json!({
            "event": "scroll",
            "index": entry.index,
            "post_no": entry.post_no,
            "timestamp": format_long(&entry.timestamp),
        });
        println!("{line}");
        return;
    }
    let post = entry
        .post_no
        .map_or_else(|| "No.?".to_string(), |no| format!("No.{no}"));
    println!(
        "{} {} {}  {}",
        format!("#{:<4}", entry.index).bright_cyan().bold(),
        post.yellow(),
        format_long(&entry.timestamp).dimmed(),
        excerpt(document, entry)
    );
}

fn print_status(snapshot: &PlaybackSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "could not encode status"),
        }
        return;
    }
    let mut line = snapshot.status_text().bright_magenta().to_string();
    if let Some(notice) = snapshot.notice {
        let text = match notice {
            PlaybackNotice::Ready => "ready: press the pause key to start".to_string(),
            PlaybackNotice::SpeedChanged(speed) => format!("speed {speed:.1}x"),
            PlaybackNotice::TimelineEnded => "reached the last response".to_string(),
        };
        line.push_str(&format!("  {}", text.green()));
    }
    eprintln!("{line}");
}

fn spawn_status_printer(
    session: &ReplaySession,
    ui_mode: UiMode,
    json: bool,
) -> JoinHandle<()> {
    let mut updates = WatchStream::new(session.subscribe());
    tokio::task::spawn_local(async move {
        let mut last_state = None;
        while let Some(snapshot) = updates.next().await {
            // Auto-hide only shows changes worth reading.
            let changed = last_state != Some(snapshot.state);
            last_state = Some(snapshot.state);
            if ui_mode == UiMode::AutoHide && !changed && snapshot.notice.is_none() {
                continue;
            }
            print_status(&snapshot, json);
        }
    })
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Read stdin on a plain thread so a blocked read never holds up shutdown.
/// Each character of a line is one key press; `q` quits. End of input
/// only stops reading.
fn spawn_key_reader(keys: mpsc::UnboundedSender<KeyInput>) -> mpsc::UnboundedReceiver<()> {
    let (quit_tx, quit_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { return };
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("q") {
                let _ = quit_tx.send(());
                return;
            }
            for key in trimmed.chars() {
                if keys.send(KeyInput::page(key)).is_err() {
                    return;
                }
            }
        }
    });
    quit_rx
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

async fn load_document(args: &Args, fetcher: &HttpFetcher) -> Result<ThreadDocument, ReplayError> {
    let document = if args.is_remote() {
        fetcher.fetch_document(&args.source).await?
    } else {
        let bytes = tokio::fs::read(&args.source).await?;
        ThreadDocument::parse(&decode_html(&bytes, None))
    };
    let format = detect_format(&document);
    let responses = extract_responses(&document).len();
    info!(source = %args.source, format = %format, responses, "loaded thread");
    Ok(document)
}

/// Re-fetch a remote thread and fold new posts into the live document,
/// standing in for the board's own auto-refresh.
fn spawn_reload(
    url: String,
    document: SharedDocument,
    fetcher: HttpFetcher,
    period: Duration,
) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let fresh = match fetcher.fetch_document(&url).await {
                Ok(doc) => FetchedThread::from_document(doc),
                Err(e) => {
                    warn!(url = %url, error = %e, "reload failed");
                    continue;
                }
            };
            let Ok(mut live) = document.try_borrow_mut() else {
                debug!("document busy, skipping reload");
                continue;
            };
            match merge_into_document(&mut live, &[fresh]) {
                Ok(0) => {}
                Ok(imported) => debug!(imported, "reload merged new posts"),
                Err(e) => warn!(error = %e, "reload merge failed"),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

async fn run(args: Args) -> Result<(), ReplayError> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::load_from_path(path)?,
        None => ReplayConfig::default(),
    };
    if args.autoplay {
        config.start_paused = false;
    }

    let settings = args.settings_input().parse()?;
    let fetcher = HttpFetcher::new(config.user_agent.as_deref());
    let document = load_document(&args, &fetcher).await?.into_shared();

    let json = args.json_status;
    let scroll_doc = Rc::clone(&document);
    let scroller = move |entry: &ResponseEntry| print_scroll(&scroll_doc, entry, json);

    let mut progress = TracingProgress;
    let ui_mode = settings.ui_mode;
    let mut session = ReplaySession::launch(
        Rc::clone(&document),
        settings,
        &config,
        &fetcher,
        Box::new(scroller),
        &mut progress,
    )
    .await?;

    let status = spawn_status_printer(&session, ui_mode, json);
    let reload = args.is_remote().then(|| {
        spawn_reload(
            args.source.clone(),
            Rc::clone(&document),
            fetcher.clone(),
            config.poll_interval(),
        )
    });
    let mut quit = spawn_key_reader(session.key_sender());

    tokio::select! {
        _ = session.wait() => info!("playback finished"),
        Some(()) = quit.recv() => info!("quit requested"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    if let Some(reload) = reload {
        reload.abort();
    }
    session.dispose().await;
    status.abort();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let local = LocalSet::new();
    match local.run_until(run(args)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_user_facing() => {
            eprintln!("{} {}", "error:".bright_red().bold(), e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = ?e, "replay aborted");
            eprintln!("{} {}", "fatal:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
