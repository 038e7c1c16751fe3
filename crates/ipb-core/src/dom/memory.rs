//! In-memory document
//!
//! All nodes live in one arena and are addressed by [`NodeId`]. Computed style
//! and geometry are whatever the builder set; nothing is laid out or cascaded.
//! Shadow roots are arena nodes too, marked as such and linked to their host.

use std::collections::HashMap;

use super::Document;
use super::StyleReader;
use crate::error::DomError;
use crate::query::TagFilter;
use crate::types::{ElementIdentifier, Rect, StyleProperty, Viewport};

/// Handle to a node in a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct MemoryNode {
    /// Upper-case tag name; empty for shadow roots.
    tag: String,
    id: String,
    class_name: String,
    text: String,
    computed: HashMap<StyleProperty, String>,
    inline: HashMap<StyleProperty, String>,
    rect: Rect,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    /// Set on shadow-root nodes only.
    host: Option<NodeId>,
    /// Style reads fail, as for a node the host cannot resolve.
    unreadable: bool,
}

/// Arena-backed [`Document`] implementation.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<MemoryNode>,
    html: NodeId,
    body: NodeId,
    viewport: Viewport,
    head_available: bool,
    injected_styles: Vec<String>,
}

impl MemoryDocument {
    /// An empty `<html><body></body></html>` document.
    pub fn new(viewport: Viewport) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            html: NodeId(0),
            body: NodeId(0),
            viewport,
            head_available: true,
            injected_styles: Vec::new(),
        };
        doc.html = doc.create_element("html");
        doc.body = doc.append(doc.html, "body");
        doc
    }

    pub fn body_id(&self) -> NodeId {
        self.body
    }

    pub fn html_id(&self) -> NodeId {
        self.html
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // -------------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            tag: tag.to_ascii_uppercase(),
            ..MemoryNode::default()
        });
        id
    }

    /// Move `child` under `parent` as its last child.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Create an element and append it to `parent`.
    pub fn append(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let child = self.create_element(tag);
        self.append_child(parent, child);
        child
    }

    /// Attach an open shadow root to `host` and return it.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.nodes[host.0].shadow_root {
            return existing;
        }
        let root = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            host: Some(host),
            ..MemoryNode::default()
        });
        self.nodes[host.0].shadow_root = Some(root);
        root
    }

    /// Remove `node` (and its subtree) from the tree.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    pub fn set_computed(&mut self, node: NodeId, property: StyleProperty, value: &str) {
        self.nodes[node.0].computed.insert(property, value.to_string());
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.nodes[node.0].rect = rect;
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
    }

    /// Rewrite id and class, as a page does when it re-renders a banner.
    pub fn rename(&mut self, node: NodeId, id: &str, class_name: &str) {
        let entry = &mut self.nodes[node.0];
        entry.id = id.to_string();
        entry.class_name = class_name.to_string();
    }

    pub fn set_unreadable(&mut self, node: NodeId) {
        self.nodes[node.0].unreadable = true;
    }

    /// Simulate a document without a usable `<head>`.
    pub fn set_head_available(&mut self, available: bool) {
        self.head_available = available;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Every `<style>` text injected so far, in order.
    pub fn injected_styles(&self) -> &[String] {
        &self.injected_styles
    }

    pub fn class_name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].class_name
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// First connected element whose `id` attribute equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .find(|node| self.nodes[node.0].id == id && self.is_connected(node))
    }

    /// Topmost ancestor reachable through parent links (a shadow root or the
    /// document element, or the node itself when detached).
    fn tree_root(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.nodes[current.0].parent {
            current = parent;
        }
        current
    }

    fn element(&self, node: NodeId) -> Result<&MemoryNode, DomError> {
        if !self.is_connected(&node) {
            return Err(DomError::Detached);
        }
        Ok(&self.nodes[node.0])
    }

    fn serialize_children(&self, node: NodeId, out: &mut String) {
        for child in &self.nodes[node.0].children {
            let entry = &self.nodes[child.0];
            let tag = entry.tag.to_ascii_lowercase();
            out.push('<');
            out.push_str(&tag);
            if !entry.id.is_empty() {
                out.push_str(&format!(" id=\"{}\"", entry.id));
            }
            if !entry.class_name.is_empty() {
                out.push_str(&format!(" class=\"{}\"", entry.class_name));
            }
            out.push('>');
            out.push_str(&entry.text);
            self.serialize_children(*child, out);
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

impl StyleReader for MemoryDocument {
    type Node = NodeId;

    fn read(&self, node: &NodeId, property: StyleProperty) -> Result<String, DomError> {
        let entry = self.element(*node)?;
        if entry.unreadable {
            return Err(DomError::StyleUnavailable(property.css_name()));
        }
        let value = entry.computed.get(&property).map(String::as_str).unwrap_or(match property {
            StyleProperty::Position => "static",
            StyleProperty::ZIndex => "auto",
            StyleProperty::Display => "block",
            StyleProperty::Overflow => "visible",
        });
        Ok(value.to_string())
    }
}

impl Document for MemoryDocument {
    type Root = NodeId;

    fn body(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn html(&self) -> Option<NodeId> {
        Some(self.html)
    }

    fn element_root(&self, node: &NodeId) -> NodeId {
        *node
    }

    fn shadow_root(&self, node: &NodeId) -> Option<NodeId> {
        self.nodes[node.0].shadow_root
    }

    fn shadow_host(&self, node: &NodeId) -> Option<NodeId> {
        let root = self.tree_root(*node);
        if root == *node {
            return None;
        }
        self.nodes[root.0].host
    }

    fn descendants(&self, root: &NodeId, filter: &TagFilter) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            let entry = &self.nodes[node.0];
            if filter.admits(&entry.tag) {
                found.push(node);
            }
            stack.extend(entry.children.iter().rev().copied());
        }
        found
    }

    fn bounding_rect(&self, node: &NodeId) -> Result<Rect, DomError> {
        self.element(*node).map(|entry| entry.rect)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn identifier(&self, node: &NodeId) -> Result<ElementIdentifier, DomError> {
        let entry = self.element(*node)?;
        Ok(ElementIdentifier::new(entry.tag.as_str(), entry.id.as_str(), entry.class_name.as_str()))
    }

    fn inner_html(&self, node: &NodeId) -> Result<String, DomError> {
        let entry = self.element(*node)?;
        let mut out = entry.text.clone();
        self.serialize_children(*node, &mut out);
        Ok(out)
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        let mut current = *node;
        loop {
            let root = self.tree_root(current);
            if root == self.html {
                return true;
            }
            match self.nodes[root.0].host {
                Some(host) => current = host,
                None => return false,
            }
        }
    }

    fn inline_style(&self, node: &NodeId, property: StyleProperty) -> Option<String> {
        self.nodes[node.0].inline.get(&property).cloned()
    }

    fn set_inline_style(&mut self, node: &NodeId, property: StyleProperty, value: &str) -> Result<(), DomError> {
        self.element(*node)?;
        self.nodes[node.0].inline.insert(property, value.to_string());
        Ok(())
    }

    fn set_class_name(&mut self, node: &NodeId, class_name: &str) -> Result<(), DomError> {
        self.element(*node)?;
        self.nodes[node.0].class_name = class_name.to_string();
        Ok(())
    }

    fn inject_style(&mut self, css: &str) -> Result<(), DomError> {
        if !self.head_available {
            return Err(DomError::HeadUnavailable);
        }
        self.injected_styles.push(css.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> MemoryDocument {
        MemoryDocument::new(Viewport::new(1024.0, 768.0))
    }

    #[test]
    fn test_descendants_in_document_order() {
        let mut doc = doc();
        let body = doc.body_id();
        let a = doc.append(body, "div");
        let a1 = doc.append(a, "section");
        let b = doc.append(body, "aside");

        let found = doc.descendants(&body, &TagFilter::popup());
        assert_eq!(found, vec![a, a1, b]);
    }

    #[test]
    fn test_shadow_host_and_connectivity() {
        let mut doc = doc();
        let body = doc.body_id();
        let host = doc.append(body, "consent-box");
        let shadow = doc.attach_shadow(host);
        let inner = doc.append(shadow, "div");

        assert_eq!(doc.shadow_host(&inner), Some(host));
        assert_eq!(doc.shadow_host(&host), None);
        assert!(doc.is_connected(&inner));

        doc.remove(host);
        assert!(!doc.is_connected(&inner));
        assert_eq!(doc.identifier(&inner), Err(DomError::Detached));
    }

    #[test]
    fn test_inner_html_serializes_subtree() {
        let mut doc = doc();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.set_text(banner, "We use ");
        let link = doc.append(banner, "a");
        doc.rename(link, "", "more");
        doc.set_text(link, "cookies");

        assert_eq!(doc.inner_html(&banner).unwrap(), "We use <a class=\"more\">cookies</a>");
    }

    #[test]
    fn test_inject_style_requires_head() {
        let mut doc = doc();
        doc.set_head_available(false);
        assert_eq!(doc.inject_style("DIV { display: none !important; }"), Err(DomError::HeadUnavailable));
        assert!(doc.injected_styles().is_empty());
    }
}
