// packages/sdk/src/dom/document.rs
//! Observable document tree
//!
//! An arena-backed model of the host document: element and text nodes,
//! mutation notification, and element-visibility (intersection) streams.
//! The monitoring core only ever observes this tree; it never mutates it.
//! Detached subtrees stay in the arena so removal records can still be
//! serialized.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Index of a node in the document arena.
pub type NodeId = usize;

/// Node content.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text {
        content: String,
    },
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// What changed in a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One observed mutation.
#[derive(Debug, Clone)]
pub struct DomMutation {
    pub kind: MutationKind,

    pub target: NodeId,

    /// Child-index path of the target at mutation time
    pub target_path: Vec<usize>,

    pub added: Vec<NodeId>,

    pub removed: Vec<NodeId>,

    pub attribute_name: Option<String>,

    pub old_value: Option<String>,
}

/// Mutation observer options.
#[derive(Debug, Clone, Copy)]
pub struct MutationObserverOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
    pub attribute_old_value: bool,
    pub character_data: bool,
    pub character_data_old_value: bool,
}

impl Default for MutationObserverOptions {
    fn default() -> Self {
        Self {
            child_list: true,
            subtree: true,
            attributes: true,
            attribute_old_value: true,
            character_data: true,
            character_data_old_value: true,
        }
    }
}

/// An element visibility change.
#[derive(Debug, Clone)]
pub struct IntersectionChange {
    pub node: NodeId,
    pub path: Vec<usize>,
    pub ratio: f64,
    pub is_intersecting: bool,
}

pub type MutationCallback = Arc<dyn Fn(&DomMutation) + Send + Sync>;
pub type IntersectionCallback = Arc<dyn Fn(&IntersectionChange) + Send + Sync>;

/// Observer handle, used to disconnect.
pub type ObserverId = u64;

#[derive(Default)]
struct DocumentInner {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
    doctype: Option<String>,
}

impl DocumentInner {
    fn path_of(&self, node: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = node;
        loop {
            if Some(current) == self.root {
                path.reverse();
                return Some(path);
            }
            let parent = self.nodes.get(current)?.parent?;
            let index = self.nodes[parent]
                .children
                .iter()
                .position(|&c| c == current)?;
            path.push(index);
            current = parent;
        }
    }
}

/// The observable document.
pub struct Document {
    inner: Mutex<DocumentInner>,
    mutation_observers: Mutex<Vec<(ObserverId, MutationObserverOptions, MutationCallback)>>,
    intersection_observers: Mutex<Vec<(ObserverId, HashSet<NodeId>, IntersectionCallback)>>,
    next_observer_id: AtomicU64,
}

impl Document {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DocumentInner::default()),
            mutation_observers: Mutex::new(Vec::new()),
            intersection_observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    // ---- construction & mutation (driven by the host) ----

    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        let mut inner = self.inner.lock();
        let id = inner.nodes.len();
        inner.nodes.push(NodeData {
            kind: NodeKind::Element {
                tag: tag.into(),
                attributes: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_text(&self, content: impl Into<String>) -> NodeId {
        let mut inner = self.inner.lock();
        let id = inner.nodes.len();
        inner.nodes.push(NodeData {
            kind: NodeKind::Text {
                content: content.into(),
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn set_root(&self, node: NodeId) {
        self.inner.lock().root = Some(node);
    }

    pub fn set_doctype(&self, doctype: impl Into<String>) {
        self.inner.lock().doctype = Some(doctype.into());
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let record = {
            let mut inner = self.inner.lock();
            if parent >= inner.nodes.len() || child >= inner.nodes.len() {
                return;
            }
            inner.nodes[child].parent = Some(parent);
            inner.nodes[parent].children.push(child);
            DomMutation {
                kind: MutationKind::ChildList,
                target: parent,
                target_path: inner.path_of(parent).unwrap_or_default(),
                added: vec![child],
                removed: vec![],
                attribute_name: None,
                old_value: None,
            }
        };
        self.notify_mutation(record);
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) {
        let record = {
            let mut inner = self.inner.lock();
            let Some(position) = inner
                .nodes
                .get(parent)
                .and_then(|p| p.children.iter().position(|&c| c == child))
            else {
                return;
            };
            let target_path = inner.path_of(parent).unwrap_or_default();
            inner.nodes[parent].children.remove(position);
            inner.nodes[child].parent = None;
            DomMutation {
                kind: MutationKind::ChildList,
                target: parent,
                target_path,
                added: vec![],
                removed: vec![child],
                attribute_name: None,
                old_value: None,
            }
        };
        self.notify_mutation(record);
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) {
        let record = {
            let mut inner = self.inner.lock();
            let target_path = match inner.path_of(node) {
                Some(path) => path,
                None => Vec::new(),
            };
            let Some(data) = inner.nodes.get_mut(node) else {
                return;
            };
            let NodeKind::Element { attributes, .. } = &mut data.kind else {
                return;
            };
            let old_value = attributes.insert(name.to_string(), value.into());
            DomMutation {
                kind: MutationKind::Attributes,
                target: node,
                target_path,
                added: vec![],
                removed: vec![],
                attribute_name: Some(name.to_string()),
                old_value,
            }
        };
        self.notify_mutation(record);
    }

    pub fn set_text(&self, node: NodeId, content: impl Into<String>) {
        let record = {
            let mut inner = self.inner.lock();
            let target_path = inner.path_of(node).unwrap_or_default();
            let Some(data) = inner.nodes.get_mut(node) else {
                return;
            };
            let NodeKind::Text { content: existing } = &mut data.kind else {
                return;
            };
            let old_value = std::mem::replace(existing, content.into());
            DomMutation {
                kind: MutationKind::CharacterData,
                target: node,
                target_path,
                added: vec![],
                removed: vec![],
                attribute_name: None,
                old_value: Some(old_value),
            }
        };
        self.notify_mutation(record);
    }

    /// Host-driven intersection update for `node`.
    pub fn set_intersection(&self, node: NodeId, ratio: f64) {
        let path = self.node_path(node).unwrap_or_default();
        let change = IntersectionChange {
            node,
            path,
            ratio,
            is_intersecting: ratio > 0.0,
        };

        let observers: Vec<IntersectionCallback> = self
            .intersection_observers
            .lock()
            .iter()
            .filter(|(_, nodes, _)| nodes.contains(&node))
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();

        for callback in observers {
            callback(&change);
        }
    }

    // ---- read access ----

    pub fn root(&self) -> Option<NodeId> {
        self.inner.lock().root
    }

    pub fn doctype(&self) -> Option<String> {
        self.inner.lock().doctype.clone()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.lock().nodes.get(node).map(|n| n.kind.clone())
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        match self.inner.lock().nodes.get(node)?.kind {
            NodeKind::Element { ref tag, .. } => Some(tag.clone()),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match self.inner.lock().nodes.get(node)?.kind {
            NodeKind::Element { ref attributes, .. } => attributes.get(name).cloned(),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> BTreeMap<String, String> {
        match self.inner.lock().nodes.get(node) {
            Some(NodeData {
                kind: NodeKind::Element { attributes, .. },
                ..
            }) => attributes.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.lock().nodes.get(node)?.parent
    }

    pub fn text_content(&self, node: NodeId) -> Option<String> {
        match self.inner.lock().nodes.get(node)?.kind {
            NodeKind::Text { ref content } => Some(content.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    /// Child-index path from the root to `node`. `None` when detached.
    pub fn node_path(&self, node: NodeId) -> Option<Vec<usize>> {
        self.inner.lock().path_of(node)
    }

    /// Resolve a child-index path back to a node.
    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeId> {
        let inner = self.inner.lock();
        let mut current = inner.root?;
        for &index in path {
            current = *inner.nodes.get(current)?.children.get(index)?;
        }
        Some(current)
    }

    /// All attached elements with the given tag, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let Some(root) = inner.root else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(data) = inner.nodes.get(node) {
                if let NodeKind::Element { tag: t, .. } = &data.kind {
                    if t == tag {
                        result.push(node);
                    }
                }
                for &child in data.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        result
    }

    // ---- observers ----

    /// Register a mutation observer over the whole document.
    pub fn observe_mutations(
        &self,
        options: MutationObserverOptions,
        callback: MutationCallback,
    ) -> ObserverId {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.mutation_observers.lock().push((id, options, callback));
        id
    }

    pub fn disconnect_mutations(&self, id: ObserverId) {
        self.mutation_observers.lock().retain(|(i, _, _)| *i != id);
    }

    /// Register an intersection observer for a fixed node set.
    pub fn observe_intersections(
        &self,
        nodes: impl IntoIterator<Item = NodeId>,
        callback: IntersectionCallback,
    ) -> ObserverId {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.intersection_observers
            .lock()
            .push((id, nodes.into_iter().collect(), callback));
        id
    }

    pub fn disconnect_intersections(&self, id: ObserverId) {
        self.intersection_observers.lock().retain(|(i, _, _)| *i != id);
    }

    fn notify_mutation(&self, record: DomMutation) {
        let observers: Vec<(MutationObserverOptions, MutationCallback)> = self
            .mutation_observers
            .lock()
            .iter()
            .map(|(_, options, cb)| (*options, Arc::clone(cb)))
            .collect();

        let is_root = self.root() == Some(record.target);
        for (options, callback) in observers {
            let wanted = match record.kind {
                MutationKind::ChildList => options.child_list,
                MutationKind::Attributes => options.attributes,
                MutationKind::CharacterData => options.character_data,
            };
            if !wanted {
                continue;
            }
            if !options.subtree && !is_root {
                continue;
            }

            let keep_old = match record.kind {
                MutationKind::Attributes => options.attribute_old_value,
                MutationKind::CharacterData => options.character_data_old_value,
                MutationKind::ChildList => true,
            };

            if keep_old {
                callback(&record);
            } else {
                let mut stripped = record.clone();
                stripped.old_value = None;
                callback(&stripped);
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_document() -> (Document, NodeId, NodeId) {
        let doc = Document::new();
        let html = doc.create_element("html");
        doc.set_root(html);
        let body = doc.create_element("body");
        doc.append_child(html, body);
        (doc, html, body)
    }

    #[test]
    fn test_tree_construction() {
        let (doc, html, body) = small_document();
        let div = doc.create_element("div");
        doc.append_child(body, div);

        assert_eq!(doc.root(), Some(html));
        assert_eq!(doc.children(body), vec![div]);
        assert_eq!(doc.parent(div), Some(body));
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
    }

    #[test]
    fn test_node_path_round_trip() {
        let (doc, _, body) = small_document();
        let div = doc.create_element("div");
        doc.append_child(body, div);
        let span = doc.create_element("span");
        doc.append_child(div, span);

        let path = doc.node_path(span).unwrap();
        assert_eq!(path, vec![0, 0, 0]);
        assert_eq!(doc.node_at_path(&path), Some(span));
    }

    #[test]
    fn test_mutation_records() {
        let (doc, _, body) = small_document();

        let records: Arc<Mutex<Vec<DomMutation>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        doc.observe_mutations(
            MutationObserverOptions::default(),
            Arc::new(move |m| sink.lock().push(m.clone())),
        );

        let div = doc.create_element("div");
        doc.append_child(body, div);
        doc.set_attribute(div, "class", "card");
        doc.set_attribute(div, "class", "card active");
        doc.remove_child(body, div);

        let records = records.lock();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].kind, MutationKind::ChildList);
        assert_eq!(records[0].added, vec![div]);
        assert_eq!(records[1].attribute_name.as_deref(), Some("class"));
        assert_eq!(records[1].old_value, None);
        assert_eq!(records[2].old_value.as_deref(), Some("card"));
        assert_eq!(records[3].removed, vec![div]);
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let (doc, _, body) = small_document();

        let records: Arc<Mutex<Vec<DomMutation>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let id = doc.observe_mutations(
            MutationObserverOptions::default(),
            Arc::new(move |m| sink.lock().push(m.clone())),
        );
        doc.disconnect_mutations(id);

        let div = doc.create_element("div");
        doc.append_child(body, div);
        assert!(records.lock().is_empty());
    }

    #[test]
    fn test_removed_subtree_still_readable() {
        let (doc, _, body) = small_document();
        let div = doc.create_element("div");
        let text = doc.create_text("hello");
        doc.append_child(body, div);
        doc.append_child(div, text);

        doc.remove_child(body, div);

        // Detached but still serializable
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
        assert_eq!(doc.text_content(text).as_deref(), Some("hello"));
        assert_eq!(doc.node_path(div), None);
    }

    #[test]
    fn test_elements_by_tag_in_document_order() {
        let (doc, _, body) = small_document();
        let first = doc.create_element("img");
        let div = doc.create_element("div");
        let second = doc.create_element("img");
        doc.append_child(body, first);
        doc.append_child(body, div);
        doc.append_child(div, second);

        assert_eq!(doc.elements_by_tag("img"), vec![first, second]);
    }

    #[test]
    fn test_intersection_observer_scoped_to_nodes() {
        let (doc, _, body) = small_document();
        let img = doc.create_element("img");
        let video = doc.create_element("video");
        doc.append_child(body, img);
        doc.append_child(body, video);

        let seen: Arc<Mutex<Vec<IntersectionChange>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        doc.observe_intersections([img], Arc::new(move |c| sink.lock().push(c.clone())));

        doc.set_intersection(video, 1.0);
        doc.set_intersection(img, 0.5);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].node, img);
        assert!(seen[0].is_intersecting);
    }
}
