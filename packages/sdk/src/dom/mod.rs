// packages/sdk/src/dom/mod.rs
//! Document model
//!
//! - **Document**: arena-backed observable tree with mutation and
//!   intersection streams
//! - **Path**: CSS-path encoding and simple selector matching

pub mod document;
pub mod path;

pub use document::{
    Document, DomMutation, IntersectionChange, MutationCallback, MutationKind,
    MutationObserverOptions, NodeId, NodeKind, ObserverId,
};
pub use path::{css_path, matches_any, matches_selector};
