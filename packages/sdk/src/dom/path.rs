// packages/sdk/src/dom/path.rs
//! Element paths and selector matching
//!
//! Interaction targets are encoded as CSS paths built root-to-leaf. An
//! `#id` segment anchors the path and stops the ascent; `:nth-child` is
//! added only when an element has same-tag siblings.

use crate::dom::document::{Document, NodeId};

/// Build the CSS path for `node`, root-to-leaf.
pub fn css_path(doc: &Document, node: NodeId) -> Option<String> {
    doc.tag_name(node)?;

    let mut segments = Vec::new();
    let mut current = Some(node);

    while let Some(id) = current {
        let Some(tag) = doc.tag_name(id) else { break };

        if let Some(element_id) = doc.attribute(id, "id") {
            // An id uniquely anchors the path
            segments.push(format!("{}#{}", tag, element_id));
            break;
        }

        let mut segment = tag.clone();
        if let Some(classes) = doc.attribute(id, "class") {
            let joined: Vec<&str> = classes.split_whitespace().collect();
            if !joined.is_empty() {
                segment.push('.');
                segment.push_str(&joined.join("."));
            }
        }

        if let Some(parent) = doc.parent(id) {
            let same_tag: Vec<NodeId> = doc
                .children(parent)
                .into_iter()
                .filter(|&sibling| doc.tag_name(sibling).as_deref() == Some(tag.as_str()))
                .collect();
            if same_tag.len() > 1 {
                if let Some(position) = same_tag.iter().position(|&s| s == id) {
                    segment.push_str(&format!(":nth-child({})", position + 1));
                }
            }
        }

        segments.push(segment);
        current = doc.parent(id);
    }

    segments.reverse();
    Some(segments.join(" > "))
}

/// Match `node` against a simple selector.
///
/// Supported forms: `tag`, `#id`, `.class`, `[attr]`, `[attr=value]`, and
/// compounds like `input[type=password]` or `div.card[data-x]`.
pub fn matches_selector(doc: &Document, node: NodeId, selector: &str) -> bool {
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };

    let mut rest = selector.trim();
    if rest.is_empty() {
        return false;
    }

    // Leading tag name
    if !rest.starts_with(['.', '#', '[']) {
        let end = rest
            .find(['.', '#', '['])
            .unwrap_or(rest.len());
        if !rest[..end].eq_ignore_ascii_case(&tag) {
            return false;
        }
        rest = &rest[end..];
    }

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('#') {
            let end = stripped.find(['.', '#', '[']).unwrap_or(stripped.len());
            if doc.attribute(node, "id").as_deref() != Some(&stripped[..end]) {
                return false;
            }
            rest = &stripped[end..];
        } else if let Some(stripped) = rest.strip_prefix('.') {
            let end = stripped.find(['.', '#', '[']).unwrap_or(stripped.len());
            let class = &stripped[..end];
            let has = doc
                .attribute(node, "class")
                .map(|c| c.split_whitespace().any(|part| part == class))
                .unwrap_or(false);
            if !has {
                return false;
            }
            rest = &stripped[end..];
        } else if let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                return false;
            };
            let body = &stripped[..end];
            let matched = match body.split_once('=') {
                Some((name, value)) => {
                    let value = value.trim_matches(['"', '\'']);
                    doc.attribute(node, name.trim()).as_deref() == Some(value)
                }
                None => doc.attribute(node, body.trim()).is_some(),
            };
            if !matched {
                return false;
            }
            rest = &stripped[end + 1..];
        } else {
            return false;
        }
    }

    true
}

/// Whether `node` matches any selector in `selectors`.
pub fn matches_any(doc: &Document, node: NodeId, selectors: &[impl AsRef<str>]) -> bool {
    selectors
        .iter()
        .any(|s| matches_selector(doc, node, s.as_ref()))
}
