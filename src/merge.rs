//! # Thread merger
//!
//! Pulls responses from other thread pages (older parts of a long thread,
//! archive copies) into the live document. Incoming groups are deduplicated
//! by post number against what the page already shows, the union is sorted
//! by post number and every group is given an explicit `.res_no`
//! annotation so index anchors keep working after the reorder.
//!
//! The live update manager is paused for the whole merge: a poll must never
//! observe a half-rewritten container.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::dom::groups::{
    find_in_nodes, find_thread_container, group_thread_responses, native_counter_in,
    post_number_in, res_number_in,
};
use crate::dom::selectors::{POST_NUMBER, REPLY_CELL, TIMESTAMP};
use crate::dom::{NodeGroup, SharedDocument, ThreadDocument};
use crate::error::ReplayError;
use crate::extract::{extract_responses, ResponseEntry};
use crate::fetcher::DocumentFetcher;
use crate::format::{detect_format, ThreadFormat};
use crate::update_manager::LiveUpdateManager;

/// Progress display for a running merge.
pub trait MergeProgress {
    fn begin(&mut self, total: usize);
    fn advance(&mut self, done: usize, total: usize);
    fn finish(&mut self);
    fn fail(&mut self, message: &str);
}

/// Reports merge progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl MergeProgress for TracingProgress {
    fn begin(&mut self, total: usize) {
        info!(total, "merging additional threads");
    }

    fn advance(&mut self, done: usize, total: usize) {
        info!(done, total, "thread fetched");
    }

    fn finish(&mut self) {
        info!("merge complete");
    }

    fn fail(&mut self, message: &str) {
        warn!(message, "merge failed");
    }
}

/// A fetched page and the response groups found in it.
#[derive(Debug)]
pub struct FetchedThread {
    pub document: ThreadDocument,
    pub format: ThreadFormat,
    pub groups: Vec<NodeGroup>,
}

impl FetchedThread {
    /// Detect the layout and extract its groups.
    pub fn from_document(mut document: ThreadDocument) -> Self {
        let format = detect_format(&document);
        let groups = format.extract_groups(&mut document);
        Self {
            document,
            format,
            groups,
        }
    }
}

struct Candidate {
    nodes: NodeGroup,
    post_no: Option<u64>,
}

/// Fetch `urls` one after another and merge them into `live`.
///
/// Returns the responses re-extracted from the updated document. With no
/// URLs the document is left alone and the manager's current set is
/// returned. Any fetch failure aborts the whole merge before the document
/// is touched; the manager is restarted either way if it was running.
pub async fn merge_threads<F: DocumentFetcher>(
    urls: &[String],
    fetcher: &F,
    live: &SharedDocument,
    manager: &mut LiveUpdateManager,
    progress: &mut dyn MergeProgress,
) -> Result<Vec<ResponseEntry>, ReplayError> {
    if urls.is_empty() {
        return Ok(manager.current_responses());
    }

    let was_running = manager.is_running();
    manager.stop();
    progress.begin(urls.len());

    let result = fetch_and_merge(urls, fetcher, live, progress).await;

    if was_running {
        manager.start();
    }

    match result {
        Ok(responses) => {
            progress.finish();
            Ok(responses)
        }
        Err(e) => {
            progress.fail(&e.to_string());
            Err(e)
        }
    }
}

async fn fetch_and_merge<F: DocumentFetcher>(
    urls: &[String],
    fetcher: &F,
    live: &SharedDocument,
    progress: &mut dyn MergeProgress,
) -> Result<Vec<ResponseEntry>, ReplayError> {
    let mut fetched = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let document = fetcher.fetch_document(url).await?;
        let thread = FetchedThread::from_document(document);
        debug!(
            url = %url,
            format = %thread.format,
            groups = thread.groups.len(),
            "fetched thread page"
        );
        fetched.push(thread);
        progress.advance(i + 1, urls.len());
    }

    let mut doc = live.try_borrow_mut().map_err(|_| ReplayError::DocumentBusy)?;
    let imported = merge_into_document(&mut doc, &fetched)?;
    let responses = extract_responses(&doc);
    info!(imported, total = responses.len(), "merged responses into thread");
    Ok(responses)
}

/// Merge fetched groups into `live`'s thread container.
///
/// Existing groups are scanned first so they win post-number ties. Returns
/// how many incoming groups were imported.
pub fn merge_into_document(
    live: &mut ThreadDocument,
    incoming: &[FetchedThread],
) -> Result<usize, ReplayError> {
    let container = find_thread_container(live).ok_or(ReplayError::ContainerNotFound)?;

    let mut seen = HashSet::new();
    let mut combined: Vec<Candidate> = group_thread_responses(live, container)
        .into_iter()
        .map(|nodes| {
            let post_no = post_number_in(live, &nodes);
            if let Some(no) = post_no {
                seen.insert(no);
            }
            Candidate { nodes, post_no }
        })
        .collect();
    let existing = combined.len();

    for thread in incoming {
        for group in &thread.groups {
            let post_no = post_number_in(&thread.document, group);
            if post_no.is_some_and(|no| !seen.insert(no)) {
                continue;
            }
            let nodes = group
                .iter()
                .filter_map(|&id| live.import_node(&thread.document, id))
                .collect();
            combined.push(Candidate { nodes, post_no });
        }
    }
    let imported = combined.len() - existing;

    // Stable: unnumbered groups keep their relative order after the rest.
    combined.sort_by_key(|c| (c.post_no.is_none(), c.post_no));
    annotate(live, &mut combined);

    let ordered: Vec<_> = combined.into_iter().flat_map(|c| c.nodes).collect();
    live.replace_children(container, &ordered);
    Ok(imported)
}

/// Give every group a `.res_no`, continuing from the last number seen.
/// The first unnumbered group gets 0, matching 0-based index anchors.
fn annotate(doc: &mut ThreadDocument, combined: &mut [Candidate]) {
    let mut last: Option<u64> = None;
    for candidate in combined.iter_mut() {
        if let Some(existing) = res_number_in(doc, &candidate.nodes) {
            last = Some(existing);
            continue;
        }
        if let Some(counter) = native_counter_in(doc, &candidate.nodes) {
            last = Some(counter);
            inject_res_no(doc, &mut candidate.nodes, counter, true);
            continue;
        }
        let next = last.map_or(0, |n| n + 1);
        last = Some(next);
        inject_res_no(doc, &mut candidate.nodes, next, false);
    }
}

fn inject_res_no(doc: &mut ThreadDocument, nodes: &mut NodeGroup, value: u64, hidden: bool) {
    let markup = if hidden {
        format!(r#"<span class="res_no" style="display:none">{value}</span>"#)
    } else {
        format!(r#"<span class="res_no">{value}</span>"#)
    };
    let Some(span) = doc.create_element(&markup) else {
        warn!(value, "could not build response number marker");
        return;
    };

    if let Some(cell) = find_in_nodes(doc, nodes, REPLY_CELL) {
        doc.prepend_child(cell, span);
        return;
    }

    let anchor = find_in_nodes(doc, nodes, TIMESTAMP).or_else(|| find_in_nodes(doc, nodes, POST_NUMBER));
    if let Some(anchor) = anchor {
        // A top-level member is re-parented by replace_children, so the
        // marker has to join the group list rather than the old parent.
        if let Some(pos) = nodes.iter().position(|&id| id == anchor) {
            nodes.insert(pos, span);
            return;
        }
        if doc.parent(anchor).is_some() {
            doc.insert_before(anchor, span);
            return;
        }
    }

    match nodes.first().copied() {
        Some(first) if doc.is_element(first) => doc.prepend_child(first, span),
        Some(first) if doc.is_text(first) => nodes.insert(1, span),
        _ => nodes.insert(0, span),
    }
}
