//! Response extraction: thread document in, ordered timestamped records out.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::dom::groups::{
    find_in_nodes, find_thread_container, group_thread_responses, post_number_in, res_number_in,
};
use crate::dom::selectors::{POST_NUMBER, TIMESTAMP};
use crate::dom::{NodeHandle, ThreadDocument};
use crate::hash::content_hash;
use crate::timeline::TimelineResponse;
use crate::timestamp::{parse_timestamp, strip_id_suffix};

/// One logical post, as captured from the document at one point in time.
///
/// Holds only owned data plus opaque node handles; the nodes themselves
/// belong to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    /// Post time parsed from the page text.
    pub timestamp: NaiveDateTime,
    /// Node to scroll to.
    pub element: NodeHandle,
    /// 0-based position among the responses retained by one capture pass.
    pub index: usize,
    /// Identity token for comparing successive captures; never displayed.
    pub content_hash: String,
    /// Every member node, when the response spans several loose siblings.
    pub all_nodes: Option<Vec<NodeHandle>>,
    /// `No.<digits>` post number, if the group carries one.
    pub post_no: Option<u64>,
    /// Explicit response-number annotation, if present.
    pub res_no: Option<u64>,
}

impl ResponseEntry {
    /// Identity used by the update manager's tail comparison.
    pub fn identity(&self) -> String {
        format!(
            "{}-{}",
            self.timestamp.and_utc().timestamp_millis(),
            self.content_hash
        )
    }

    pub fn to_timeline(&self) -> TimelineResponse {
        TimelineResponse {
            timestamp: self.timestamp,
            index: self.index,
        }
    }
}

/// Capture every parseable response in DOM order.
///
/// Groups with a missing or unparseable timestamp are skipped with a
/// warning; an absent container yields an empty list.
pub fn extract_responses(doc: &ThreadDocument) -> Vec<ResponseEntry> {
    let Some(container) = find_thread_container(doc) else {
        debug!("no thread container, nothing to extract");
        return Vec::new();
    };

    let groups = group_thread_responses(doc, container);
    let mut responses = Vec::with_capacity(groups.len());

    for (position, nodes) in groups.iter().enumerate() {
        let group_no = position + 1;

        let Some(stamp_node) = find_in_nodes(doc, nodes, TIMESTAMP) else {
            warn!(group = group_no, "response has no timestamp node, skipping");
            continue;
        };

        let raw = doc.text_content(stamp_node);
        let text = strip_id_suffix(&raw);
        if text.is_empty() {
            warn!(group = group_no, "response timestamp is empty, skipping");
            continue;
        }
        let Some(timestamp) = parse_timestamp(text) else {
            warn!(group = group_no, text, "failed to parse response timestamp, skipping");
            continue;
        };

        let Some(element) = anchor_for(doc, nodes) else {
            warn!(group = group_no, "response has no scroll anchor, skipping");
            continue;
        };

        let single_element = nodes.len() == 1 && doc.is_element(nodes[0]);
        let body_text: String = if single_element {
            doc.text_content(nodes[0])
        } else {
            nodes.iter().map(|&id| doc.text_content(id)).collect()
        };

        responses.push(ResponseEntry {
            timestamp,
            element,
            index: responses.len(),
            content_hash: content_hash(&body_text, &timestamp),
            all_nodes: (!single_element).then(|| nodes.clone()),
            post_no: post_number_in(doc, nodes),
            res_no: res_number_in(doc, nodes),
        });
    }

    debug!(count = responses.len(), "extracted responses");
    responses
}

fn anchor_for(doc: &ThreadDocument, nodes: &[NodeHandle]) -> Option<NodeHandle> {
    nodes
        .iter()
        .copied()
        .find(|&id| doc.is_element(id))
        .or_else(|| find_in_nodes(doc, nodes, TIMESTAMP))
        .or_else(|| find_in_nodes(doc, nodes, POST_NUMBER))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(no: u64, ts: &str, body: &str) -> String {
        format!(
            r#"<table><tr><td class="rtd"><span class="cnw">{ts}</span><span class="cno">No.{no}</span><blockquote>{body}</blockquote></td></tr></table>"#
        )
    }

    fn page(inner: &str) -> ThreadDocument {
        ThreadDocument::parse(&format!(
            r#"<html><body><div class="thre">{inner}</div></body></html>"#
        ))
    }

    #[test]
    fn indexes_follow_retained_order() {
        let doc = page(&format!(
            "{}{}{}",
            table(1, "24/11/02(土)12:00:00", "a"),
            table(2, "bogus", "b"),
            table(3, "24/11/02(土)12:02:00", "c"),
        ));
        let responses = extract_responses(&doc);
        let indexes: Vec<_> = responses.iter().map(|r| r.index).collect();
        let nos: Vec<_> = responses.iter().map(|r| r.post_no).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(nos, vec![Some(1), Some(3)]);
    }

    #[test]
    fn id_suffix_is_stripped_before_parsing() {
        let doc = page(&table(9, "24/11/02(土)12:00:00 ID:Ab12Cd", "x"));
        let responses = extract_responses(&doc);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].timestamp.to_string(), "2024-11-02 12:00:00");
    }

    #[test]
    fn multi_node_group_keeps_all_nodes() {
        let doc = page(&format!(
            r#"画像ファイル名：a.jpg<span class="cnw">24/11/02(土)11:59:00</span><span class="cno">No.1</span><blockquote>op</blockquote>{}"#,
            table(2, "24/11/02(土)12:00:00", "reply")
        ));
        let responses = extract_responses(&doc);
        assert_eq!(responses.len(), 2);
        let op = &responses[0];
        assert_eq!(op.all_nodes.as_ref().map(Vec::len), Some(4));
        assert_eq!(doc.tag_name(op.element), Some("span"), "first element anchors the group");
        assert!(responses[1].all_nodes.is_none());
    }

    #[test]
    fn same_text_same_time_same_hash() {
        let a = page(&table(1, "24/11/02(土)12:00:00", "same"));
        let b = page(&table(1, "24/11/02(土)12:00:00", "same"));
        assert_eq!(
            extract_responses(&a)[0].content_hash,
            extract_responses(&b)[0].content_hash
        );
    }

    #[test]
    fn explicit_res_number_is_captured() {
        let doc = page(
            r#"<table><tr><td class="rtd"><span class="res_no">4</span><span class="cnw">24/11/02(土)12:00:00</span><span class="cno">No.8</span></td></tr></table>"#,
        );
        let responses = extract_responses(&doc);
        assert_eq!(responses[0].res_no, Some(4));
    }

    #[test]
    fn output_is_dom_order_not_time_order() {
        let doc = page(&format!(
            "{}{}",
            table(1, "24/11/02(土)12:05:00", "later"),
            table(2, "24/11/02(土)12:00:00", "earlier"),
        ));
        let responses = extract_responses(&doc);
        assert!(responses[0].timestamp > responses[1].timestamp);
        assert_eq!(responses[0].post_no, Some(1));
    }
}
