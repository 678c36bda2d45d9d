//! # DOM adapter
//!
//! The one place that touches the parsed document tree. Everything else in
//! the crate holds [`NodeHandle`]s plus owned derived data and asks this
//! adapter to read or mutate on its behalf.
//!
//! Handles stay valid for the lifetime of the [`ThreadDocument`] that issued
//! them: detaching a node leaves it in the arena, so a merge that rewrites
//! the container never dangles an older handle. A detached node is simply no
//! longer reachable from the root.

pub mod groups;
pub mod selectors;

use std::cell::RefCell;
use std::rc::Rc;

use scraper::node::Text;
use scraper::{Html, Node, Selector};

/// Opaque reference to a node owned by a [`ThreadDocument`].
pub type NodeHandle = ego_tree::NodeId;

/// A run of sibling nodes forming one logical response.
pub type NodeGroup = Vec<NodeHandle>;

/// The live document shared between the update manager, the merger and
/// the playback host. Only ever borrowed between `.await` points.
pub type SharedDocument = Rc<RefCell<ThreadDocument>>;

/// A parsed thread page.
pub struct ThreadDocument {
    html: Html,
}

impl std::fmt::Debug for ThreadDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDocument")
            .field("title", &self.title())
            .finish()
    }
}

impl ThreadDocument {
    /// Parse a full HTML document.
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// Wrap the document in the shared handle used by a session.
    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub fn root(&self) -> NodeHandle {
        self.html.tree.root().id()
    }

    /// Text of the first `<title>`, or empty.
    pub fn title(&self) -> String {
        self.select_first(&selectors::TITLE)
            .map(|id| self.text_content(id))
            .unwrap_or_default()
    }

    pub fn select_first(&self, selector: &Selector) -> Option<NodeHandle> {
        self.html.select(selector).next().map(|el| el.id())
    }

    pub fn select_all(&self, selector: &Selector) -> Vec<NodeHandle> {
        self.html.select(selector).map(|el| el.id()).collect()
    }

    pub fn exists(&self, selector: &Selector) -> bool {
        self.html.select(selector).next().is_some()
    }

    /// The `<body>` element, if the parser produced one.
    pub fn body(&self) -> Option<NodeHandle> {
        self.html
            .tree
            .root()
            .descendants()
            .find(|n| n.value().as_element().is_some_and(|el| el.name() == "body"))
            .map(|n| n.id())
    }

    pub fn children(&self, id: NodeHandle) -> Vec<NodeHandle> {
        self.html
            .tree
            .get(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeHandle) -> Option<NodeHandle> {
        self.html.tree.get(id)?.parent().map(|p| p.id())
    }

    /// Whether `id` still hangs off the document root. Detached nodes keep
    /// their handle but are no longer part of the page.
    pub fn is_attached(&self, id: NodeHandle) -> bool {
        let root = self.root();
        let mut current = self.html.tree.get(id);
        while let Some(node) = current {
            if node.id() == root {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub fn is_element(&self, id: NodeHandle) -> bool {
        self.html.tree.get(id).is_some_and(|n| n.value().is_element())
    }

    pub fn is_text(&self, id: NodeHandle) -> bool {
        self.html.tree.get(id).is_some_and(|n| n.value().is_text())
    }

    /// Lowercase tag name of an element node.
    pub fn tag_name(&self, id: NodeHandle) -> Option<&str> {
        self.html.tree.get(id)?.value().as_element().map(|el| el.name())
    }

    pub fn has_class(&self, id: NodeHandle, class: &str) -> bool {
        self.html
            .tree
            .get(id)
            .and_then(|n| n.value().as_element())
            .is_some_and(|el| el.classes().any(|c| c == class))
    }

    pub fn attr(&self, id: NodeHandle, name: &str) -> Option<&str> {
        self.html.tree.get(id)?.value().as_element()?.attr(name)
    }

    /// First strict descendant element carrying `class`, in document order.
    pub fn find_descendant_by_class(&self, id: NodeHandle, class: &str) -> Option<NodeHandle> {
        let node = self.html.tree.get(id)?;
        node.descendants()
            .skip(1)
            .find(|n| {
                n.value()
                    .as_element()
                    .is_some_and(|el| el.classes().any(|c| c == class))
            })
            .map(|n| n.id())
    }

    /// Every inclusive descendant element carrying `class`, in document order.
    pub fn find_all_by_class(&self, id: NodeHandle, class: &str) -> Vec<NodeHandle> {
        let Some(node) = self.html.tree.get(id) else {
            return Vec::new();
        };
        node.descendants()
            .filter(|n| {
                n.value()
                    .as_element()
                    .is_some_and(|el| el.classes().any(|c| c == class))
            })
            .map(|n| n.id())
            .collect()
    }

    /// Whether any strict descendant is a `<tag>` element.
    pub fn has_descendant_tag(&self, id: NodeHandle, tag: &str) -> bool {
        self.html.tree.get(id).is_some_and(|node| {
            node.descendants()
                .skip(1)
                .any(|n| n.value().as_element().is_some_and(|el| el.name() == tag))
        })
    }

    /// Nearest inclusive ancestor carrying `class`.
    pub fn closest_by_class(&self, id: NodeHandle, class: &str) -> Option<NodeHandle> {
        if self.has_class(id, class) {
            return Some(id);
        }
        self.html
            .tree
            .get(id)?
            .ancestors()
            .find(|n| {
                n.value()
                    .as_element()
                    .is_some_and(|el| el.classes().any(|c| c == class))
            })
            .map(|n| n.id())
    }

    /// Concatenated text of the node and all its descendants.
    pub fn text_content(&self, id: NodeHandle) -> String {
        let Some(node) = self.html.tree.get(id) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|n| n.value().as_text().map(|t| &**t))
            .collect()
    }

    /// Replace every child of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeHandle, text: &str) {
        for child in self.children(id) {
            if let Some(mut node) = self.html.tree.get_mut(child) {
                node.detach();
            }
        }
        let text_id = self
            .html
            .tree
            .orphan(Node::Text(Text { text: text.into() }))
            .id();
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.append_id(text_id);
        }
    }

    /// Deep-copy a subtree of `source` into this document as a detached node.
    pub fn import_node(&mut self, source: &ThreadDocument, id: NodeHandle) -> Option<NodeHandle> {
        let node = source.html.tree.get(id)?;
        Some(self.import_subtree(node))
    }

    fn import_subtree(&mut self, node: ego_tree::NodeRef<'_, Node>) -> NodeHandle {
        let copy = self.html.tree.orphan(node.value().clone()).id();
        for child in node.children() {
            let child_copy = self.import_subtree(child);
            if let Some(mut parent) = self.html.tree.get_mut(copy) {
                parent.append_id(child_copy);
            }
        }
        copy
    }

    /// Build a detached element from a markup snippet such as
    /// `<span class="res_no">3</span>`.
    pub fn create_element(&mut self, markup: &str) -> Option<NodeHandle> {
        let fragment = ThreadDocument {
            html: Html::parse_fragment(markup),
        };
        let root_element = fragment.html.root_element();
        let first = root_element.children().find(|n| n.value().is_element())?;
        self.import_node(&fragment, first.id())
    }

    pub fn prepend_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.prepend_id(child);
        }
    }

    pub fn insert_before(&mut self, sibling: NodeHandle, node: NodeHandle) {
        if let Some(mut target) = self.html.tree.get_mut(sibling) {
            target.insert_id_before(node);
        }
    }

    /// Swap the whole child list of `parent` for `nodes`, in order.
    pub fn replace_children(&mut self, parent: NodeHandle, nodes: &[NodeHandle]) {
        for child in self.children(parent) {
            if let Some(mut node) = self.html.tree.get_mut(child) {
                node.detach();
            }
        }
        for &id in nodes {
            if id == parent {
                continue;
            }
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
            }
            if let Some(mut target) = self.html.tree.get_mut(parent) {
                target.append_id(id);
            }
        }
    }
}
