//! Document capability traits
//!
//! The engine sees the page only through these traits. A live browser host
//! implements them over the real DOM; [`MemoryDocument`] implements them over
//! an in-memory arena for tests, benchmarks and the CLI harness.

mod fixture;
mod memory;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::DomError;
use crate::query::TagFilter;
use crate::types::{ElementIdentifier, Position, Rect, StyleProperty, Viewport, ZIndex};

pub use fixture::{ElementFixture, MutationFixture, PageFixture, StyleFixture};
pub use memory::{MemoryDocument, NodeId};

// =============================================================================
// Capability Traits
// =============================================================================

/// Read-only access to resolved (computed) style values.
///
/// Values are never cached by callers; every read reflects the current state.
pub trait StyleReader {
    type Node: Clone + PartialEq + fmt::Debug;

    /// Current computed value of `property` for `node`.
    fn read(&self, node: &Self::Node, property: StyleProperty) -> Result<String, DomError>;
}

/// Everything the heuristics need from a document.
pub trait Document: StyleReader {
    /// A search root: an element, or an open shadow root.
    type Root: Clone;

    fn body(&self) -> Option<Self::Node>;

    /// The `<html>` root element.
    fn html(&self) -> Option<Self::Node>;

    /// Use an element as a search root.
    fn element_root(&self, node: &Self::Node) -> Self::Root;

    /// The open shadow root attached to `node`, if any.
    fn shadow_root(&self, node: &Self::Node) -> Option<Self::Root>;

    /// The host element of the shadow tree `node` lives in, if any.
    fn shadow_host(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Descendants of `root` (excluding `root` itself) admitted by `filter`,
    /// in document order. Does not cross into nested shadow roots.
    fn descendants(&self, root: &Self::Root, filter: &TagFilter) -> Vec<Self::Node>;

    fn bounding_rect(&self, node: &Self::Node) -> Result<Rect, DomError>;

    fn viewport(&self) -> Viewport;

    /// Fresh tag/id/class snapshot.
    fn identifier(&self, node: &Self::Node) -> Result<ElementIdentifier, DomError>;

    /// Serialized markup of the element's content.
    fn inner_html(&self, node: &Self::Node) -> Result<String, DomError>;

    fn is_connected(&self, node: &Self::Node) -> bool;

    /// Inline (`style` attribute) value, `None` when unset.
    fn inline_style(&self, node: &Self::Node, property: StyleProperty) -> Option<String>;

    /// Set an inline style with `!important` priority.
    fn set_inline_style(&mut self, node: &Self::Node, property: StyleProperty, value: &str) -> Result<(), DomError>;

    fn set_class_name(&mut self, node: &Self::Node, class_name: &str) -> Result<(), DomError>;

    /// Append a `<style>` element holding `css` to the document head.
    fn inject_style(&mut self, css: &str) -> Result<(), DomError>;
}

// =============================================================================
// Typed Style Reads
// =============================================================================

pub fn position_of<R: StyleReader>(reader: &R, node: &R::Node) -> Result<Position, DomError> {
    reader.read(node, StyleProperty::Position).map(|v| Position::parse(&v))
}

pub fn z_index_of<R: StyleReader>(reader: &R, node: &R::Node) -> Result<ZIndex, DomError> {
    reader.read(node, StyleProperty::ZIndex).map(|v| ZIndex::parse(&v))
}

/// Whether the element currently computes to `display: none`.
pub fn is_hidden<R: StyleReader>(reader: &R, node: &R::Node) -> Result<bool, DomError> {
    reader.read(node, StyleProperty::Display).map(|v| v.trim() == "none")
}

// =============================================================================
// Block Notification
// =============================================================================

/// Receives one fire-and-forget signal per newly injected suppression rule.
pub trait BlockNotifier {
    fn blocked(&self);
}

/// Notifier for hosts without a badge.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl BlockNotifier for NoopNotifier {
    fn blocked(&self) {}
}

/// Counts notifications. Clones share the same counter.
#[derive(Debug, Default, Clone)]
pub struct CountingNotifier {
    count: Rc<Cell<usize>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }
}

impl BlockNotifier for CountingNotifier {
    fn blocked(&self) {
        self.count.set(self.count.get() + 1);
    }
}
