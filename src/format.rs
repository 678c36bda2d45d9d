//! # Layout detection
//!
//! Fetched thread pages come from the live board or from one of three
//! archive mirrors. All four share the futaba markup convention but differ
//! in wrappers, deleted-post markers and timestamp decorations. Each layout
//! is one [`ThreadFormat`] variant backed by one [`ExtractionStrategy`].

use std::fmt;

use tracing::debug;

use crate::dom::groups::group_thread_responses;
use crate::dom::selectors::{self, DELETED, TIMESTAMP};
use crate::dom::{NodeGroup, ThreadDocument};
use crate::timestamp::strip_id_suffix;

/// The four recognised thread page layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadFormat {
    /// The live board; also the fallback when nothing else matches.
    Futaba,
    /// Archive that wraps each reply table in a `<div>`.
    Futaclo,
    /// Archive with poster IDs after timestamps and deleted-reply stubs.
    Tsumanne,
    /// Archive whose thread starter is a run of loose nodes.
    Futafuta,
}

impl ThreadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadFormat::Futaba => "futaba",
            ThreadFormat::Futaclo => "futaclo",
            ThreadFormat::Tsumanne => "tsumanne",
            ThreadFormat::Futafuta => "futafuta",
        }
    }

    /// The extraction strategy for this layout.
    pub fn strategy(self) -> &'static dyn ExtractionStrategy {
        match self {
            ThreadFormat::Futaba => &FutabaLayout,
            ThreadFormat::Futaclo => &FutacloLayout,
            ThreadFormat::Tsumanne => &TsumanneLayout,
            ThreadFormat::Futafuta => &FutafutaLayout,
        }
    }

    /// Response node groups of a fetched document, in DOM order.
    pub fn extract_groups(self, doc: &mut ThreadDocument) -> Vec<NodeGroup> {
        let groups = self.strategy().extract_groups(doc);
        debug!(format = self.as_str(), groups = groups.len(), "extracted fetched groups");
        groups
    }
}

impl fmt::Display for ThreadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a fetched document into response node groups.
///
/// Strategies may normalise the groups in place; the document is discarded
/// once its groups have been imported into the live page.
pub trait ExtractionStrategy {
    fn extract_groups(&self, doc: &mut ThreadDocument) -> Vec<NodeGroup>;
}

/// Classify a fetched document. Checks run in a fixed order and the first
/// hit wins.
pub fn detect_format(doc: &ThreadDocument) -> ThreadFormat {
    if doc.title().to_lowercase().contains("futafuta") {
        return ThreadFormat::Futafuta;
    }

    let mirror_script = doc
        .select_all(&selectors::SCRIPT_WITH_SRC)
        .into_iter()
        .any(|id| doc.attr(id, "src").is_some_and(|src| src.contains("tsumanne.net")));
    if mirror_script {
        return ThreadFormat::Tsumanne;
    }

    let id_in_timestamp = doc
        .select_all(&selectors::TIMESTAMP_NODE)
        .into_iter()
        .any(|id| doc.text_content(id).contains("ID:"));
    if id_in_timestamp {
        return ThreadFormat::Tsumanne;
    }

    if doc.exists(&selectors::FUTACLO_WRAPPER) {
        return ThreadFormat::Futaclo;
    }

    ThreadFormat::Futaba
}

/// Groups under the first `.thre`; fetched pages get no wider fallback.
fn plain_groups(doc: &ThreadDocument) -> Vec<NodeGroup> {
    match doc.select_first(&selectors::THREAD_CLASS) {
        Some(container) => group_thread_responses(doc, container),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FutabaLayout;

impl ExtractionStrategy for FutabaLayout {
    fn extract_groups(&self, doc: &mut ThreadDocument) -> Vec<NodeGroup> {
        plain_groups(doc)
    }
}

/// The wrapper `<div>` is itself a group boundary, so it travels with its
/// table.
#[derive(Debug, Clone, Copy, Default)]
pub struct FutacloLayout;

impl ExtractionStrategy for FutacloLayout {
    fn extract_groups(&self, doc: &mut ThreadDocument) -> Vec<NodeGroup> {
        plain_groups(doc)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FutafutaLayout;

impl ExtractionStrategy for FutafutaLayout {
    fn extract_groups(&self, doc: &mut ThreadDocument) -> Vec<NodeGroup> {
        plain_groups(doc)
    }
}

/// Drops deleted-reply tables and strips ` ID:...` from timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsumanneLayout;

impl ExtractionStrategy for TsumanneLayout {
    fn extract_groups(&self, doc: &mut ThreadDocument) -> Vec<NodeGroup> {
        let groups: Vec<NodeGroup> = plain_groups(doc)
            .into_iter()
            .filter(|nodes| {
                let table = nodes.iter().copied().find(|&id| doc.tag_name(id) == Some("table"));
                !table.is_some_and(|id| doc.has_class(id, DELETED))
            })
            .collect();

        for nodes in &groups {
            for &node in nodes {
                if !doc.is_element(node) {
                    continue;
                }
                for stamp in doc.find_all_by_class(node, TIMESTAMP) {
                    let text = doc.text_content(stamp);
                    if text.contains("ID:") {
                        let trimmed = strip_id_suffix(&text).to_string();
                        doc.set_text_content(stamp, &trimmed);
                    }
                }
            }
        }
        groups
    }
}
