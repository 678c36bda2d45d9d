//! Grouping of a thread container's children into response units.
//!
//! A response is either one table-like node (a `<table>`, or a wrapper
//! `<div>` holding one) or a run of loose siblings between two table-like
//! nodes, as in layouts where the thread starter is not table-wrapped. A
//! group survives only if it carries both a timestamp node and a post-number
//! node.

use once_cell::sync::Lazy;
use regex::Regex;

use super::selectors::{self, NATIVE_COUNTER, POST_NUMBER, RES_NUMBER, TIMESTAMP};
use super::{NodeGroup, NodeHandle, ThreadDocument};

static POST_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"No\.(\d+)").expect("static post number pattern"));

/// Locate the thread container through the layout fallback chain.
///
/// Returns `None` only for a document without a body.
pub fn find_thread_container(doc: &ThreadDocument) -> Option<NodeHandle> {
    if let Some(id) = doc.select_first(&selectors::THREAD_DIRECT) {
        return Some(id);
    }
    if let Some(id) = doc.select_first(&selectors::THREAD_CLASS) {
        return Some(id);
    }
    if let Some(id) = doc.select_first(&selectors::DATA_RES) {
        return Some(id);
    }
    if let Some(stamp) = doc.select_first(&selectors::TIMESTAMP_NODE) {
        if let Some(thre) = doc.closest_by_class(stamp, selectors::THREAD) {
            return Some(thre);
        }
        if let Some(div) = top_level_div(doc, stamp) {
            return Some(div);
        }
    }
    doc.body()
}

/// The inclusive ancestor `div` whose parent is `<body>`.
fn top_level_div(doc: &ThreadDocument, from: NodeHandle) -> Option<NodeHandle> {
    let mut current = Some(from);
    while let Some(id) = current {
        let parent = doc.parent(id);
        let parent_is_body = parent.is_some_and(|p| doc.tag_name(p) == Some("body"));
        if doc.tag_name(id) == Some("div") && parent_is_body {
            return Some(id);
        }
        current = parent;
    }
    None
}

fn is_table_like(doc: &ThreadDocument, id: NodeHandle) -> bool {
    match doc.tag_name(id) {
        Some("table") => true,
        Some("div") => doc.has_descendant_tag(id, "table"),
        _ => false,
    }
}

/// Whether a node run carries both a timestamp and a post number.
pub fn has_metadata(doc: &ThreadDocument, nodes: &[NodeHandle]) -> bool {
    find_in_nodes(doc, nodes, TIMESTAMP).is_some() && find_in_nodes(doc, nodes, POST_NUMBER).is_some()
}

/// First element in `nodes` (or among their descendants) carrying `class`.
pub fn find_in_nodes(doc: &ThreadDocument, nodes: &[NodeHandle], class: &str) -> Option<NodeHandle> {
    nodes.iter().copied().filter(|&id| doc.is_element(id)).find_map(|id| {
        if doc.has_class(id, class) {
            Some(id)
        } else {
            doc.find_descendant_by_class(id, class)
        }
    })
}

/// Split the container's direct children into response groups, in DOM order.
pub fn group_thread_responses(doc: &ThreadDocument, container: NodeHandle) -> Vec<NodeGroup> {
    let mut groups = Vec::new();
    let mut pending: NodeGroup = Vec::new();

    for child in doc.children(container) {
        if is_table_like(doc, child) {
            flush(doc, &mut pending, &mut groups);
            if has_metadata(doc, &[child]) {
                groups.push(vec![child]);
            }
            continue;
        }
        pending.push(child);
    }
    flush(doc, &mut pending, &mut groups);

    groups
}

fn flush(doc: &ThreadDocument, pending: &mut NodeGroup, groups: &mut Vec<NodeGroup>) {
    if pending.is_empty() {
        return;
    }
    let group = std::mem::take(pending);
    if has_metadata(doc, &group) {
        groups.push(group);
    }
}

/// Parse `No.<digits>` out of arbitrary text.
pub fn parse_post_number(text: &str) -> Option<u64> {
    POST_NUMBER_PATTERN
        .captures(text.trim())
        .and_then(|caps| caps[1].parse().ok())
}

/// Leading decimal integer of `text`, ignoring surrounding whitespace.
pub fn leading_number(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().ok()
}

/// The group's `No.<digits>` post number.
pub fn post_number_in(doc: &ThreadDocument, nodes: &[NodeHandle]) -> Option<u64> {
    let node = find_in_nodes(doc, nodes, POST_NUMBER)?;
    parse_post_number(&doc.text_content(node))
}

/// The group's explicit response-number annotation.
pub fn res_number_in(doc: &ThreadDocument, nodes: &[NodeHandle]) -> Option<u64> {
    let node = find_in_nodes(doc, nodes, RES_NUMBER)?;
    leading_number(&doc.text_content(node))
}

/// The page's own running reply counter for the group.
pub fn native_counter_in(doc: &ThreadDocument, nodes: &[NodeHandle]) -> Option<u64> {
    let node = find_in_nodes(doc, nodes, NATIVE_COUNTER)?;
    leading_number(&doc.text_content(node))
}
