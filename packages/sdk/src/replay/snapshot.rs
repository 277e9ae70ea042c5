// packages/sdk/src/replay/snapshot.rs
//! Document snapshot serialization
//!
//! Serializes the document tree into the replay wire format, masking
//! sensitive attributes and replacing the subtrees of sensitive elements
//! with a masked text node. Serialization is pure: applying it twice to
//! the same tree yields the same record.

use crate::dom::{matches_any, Document, NodeId, NodeKind};
use crate::event::types::{SerializedNode, SnapshotDelta, Viewport};
use std::collections::BTreeMap;

/// Attribute names whose values are always masked.
pub const SENSITIVE_ATTRIBUTES: [&str; 3] = ["data-secret", "data-token", "data-api-key"];

/// Selectors whose subtrees are replaced with a masked text node.
pub const SENSITIVE_SELECTORS: [&str; 7] = [
    "input[type=password]",
    "input[type=email]",
    "input[type=tel]",
    "[data-sensitive]",
    ".password",
    ".credit-card",
    ".sensitive",
];

/// The masked-content literal.
pub const MASKED_TEXT: &str = "[MASKED]";

/// Snapshot serialization options.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Apply attribute and subtree masking
    pub mask: bool,

    /// Extra selectors treated as sensitive
    pub blocked_selectors: Vec<String>,
}

impl SnapshotOptions {
    pub fn masked() -> Self {
        Self {
            mask: true,
            blocked_selectors: Vec::new(),
        }
    }
}

/// Whether `node` matches the sensitive selector set (built-in plus any
/// configured extras).
pub fn is_sensitive_element(doc: &Document, node: NodeId, options: &SnapshotOptions) -> bool {
    if !options.mask {
        return false;
    }
    matches_any(doc, node, &SENSITIVE_SELECTORS)
        || (!options.blocked_selectors.is_empty()
            && matches_any(doc, node, &options.blocked_selectors))
}

fn masked_attributes(attributes: BTreeMap<String, String>, mask: bool) -> BTreeMap<String, String> {
    if !mask {
        return attributes;
    }
    attributes
        .into_iter()
        .map(|(name, value)| {
            if SENSITIVE_ATTRIBUTES.contains(&name.as_str()) {
                (name, MASKED_TEXT.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

/// Serialize one node (and its subtree) from the document.
pub fn serialize_node(doc: &Document, node: NodeId, options: &SnapshotOptions) -> Option<SerializedNode> {
    match doc.kind(node)? {
        NodeKind::Text { content } => Some(SerializedNode::Text {
            text_content: content,
        }),
        NodeKind::Element { tag, attributes } => {
            let attributes = masked_attributes(attributes, options.mask);

            if is_sensitive_element(doc, node, options) {
                // The whole subtree collapses to a masked text node
                return Some(SerializedNode::Element {
                    tag_name: tag,
                    attributes,
                    children: vec![SerializedNode::Text {
                        text_content: MASKED_TEXT.to_string(),
                    }],
                });
            }

            let children = doc
                .children(node)
                .into_iter()
                .filter_map(|child| serialize_node(doc, child, options))
                .collect();

            Some(SerializedNode::Element {
                tag_name: tag,
                attributes,
                children,
            })
        }
    }
}

/// Serialize the full document into the base replay record.
pub fn full_snapshot(
    doc: &Document,
    url: String,
    viewport: Viewport,
    options: &SnapshotOptions,
) -> Option<SnapshotDelta> {
    let root = doc.root()?;
    let node = serialize_node(doc, root, options)?;
    Some(SnapshotDelta {
        full_snapshot: true,
        node,
        viewport,
        url,
        doctype: doc.doctype(),
    })
}
