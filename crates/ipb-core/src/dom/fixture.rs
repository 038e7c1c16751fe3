//! JSON page fixtures
//!
//! A fixture describes a page as the engine would observe it: elements with
//! their computed style and geometry, and timed insertions that play the role
//! of later DOM mutations.

use serde::{Deserialize, Serialize};

use super::memory::{MemoryDocument, NodeId};
use crate::types::{Rect, StyleProperty, Viewport};
use crate::Millis;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleFixture {
    pub position: Option<String>,
    pub z_index: Option<String>,
    pub display: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementFixture {
    pub tag: String,
    pub id: String,
    pub class: String,
    pub text: String,
    pub style: StyleFixture,
    pub rect: Rect,
    pub children: Vec<ElementFixture>,
    /// Content of an open shadow root attached to this element.
    pub shadow: Option<Vec<ElementFixture>>,
}

/// An element inserted at `at` milliseconds after page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationFixture {
    pub at: Millis,
    /// `id` of the parent element; the body when absent.
    #[serde(default)]
    pub parent: Option<String>,
    pub element: ElementFixture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFixture {
    pub host: String,
    pub viewport: Viewport,
    #[serde(default)]
    pub body_class: String,
    #[serde(default)]
    pub elements: Vec<ElementFixture>,
    #[serde(default)]
    pub mutations: Vec<MutationFixture>,
}

impl MemoryDocument {
    /// Build the initial document of a fixture (mutations are not applied).
    pub fn from_fixture(page: &PageFixture) -> Self {
        let mut doc = Self::new(page.viewport);
        let body = doc.body_id();
        doc.rename(body, "", &page.body_class);
        for element in &page.elements {
            doc.insert_fixture(body, element);
        }
        doc
    }

    /// Insert `element` and its subtree under `parent`.
    pub fn insert_fixture(&mut self, parent: NodeId, element: &ElementFixture) -> NodeId {
        let tag = if element.tag.is_empty() { "div" } else { element.tag.as_str() };
        let node = self.append(parent, tag);
        self.rename(node, &element.id, &element.class);
        self.set_text(node, &element.text);
        self.set_rect(node, element.rect);

        let style = &element.style;
        for (property, value) in [
            (StyleProperty::Position, &style.position),
            (StyleProperty::ZIndex, &style.z_index),
            (StyleProperty::Display, &style.display),
        ] {
            if let Some(value) = value {
                self.set_computed(node, property, value);
            }
        }

        for child in &element.children {
            self.insert_fixture(node, child);
        }

        if let Some(shadow_children) = &element.shadow {
            let shadow = self.attach_shadow(node);
            for child in shadow_children {
                self.insert_fixture(shadow, child);
            }
        }

        node
    }

    /// Apply one timed insertion. Returns the inserted node, or `None` when the
    /// named parent does not exist.
    pub fn apply_mutation(&mut self, mutation: &MutationFixture) -> Option<NodeId> {
        let parent = match &mutation.parent {
            Some(id) => self.find_by_id(id)?,
            None => self.body_id(),
        };
        Some(self.insert_fixture(parent, &mutation.element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, StyleReader};

    #[test]
    fn test_fixture_builds_document() {
        let page: PageFixture = serde_json::from_str(
            r#"{
                "host": "example.com",
                "viewport": { "width": 1280, "height": 800 },
                "body_class": "has-cookie-banner",
                "elements": [
                    { "tag": "div", "id": "backdrop",
                      "style": { "position": "fixed", "z_index": "1000" },
                      "rect": { "top": 0, "left": 0, "width": 1280, "height": 800 } }
                ],
                "mutations": [
                    { "at": 1500, "element": { "tag": "section", "text": "late" } }
                ]
            }"#,
        )
        .expect("fixture should parse");

        let mut doc = MemoryDocument::from_fixture(&page);
        let backdrop = doc.find_by_id("backdrop").expect("backdrop exists");
        assert_eq!(doc.read(&backdrop, StyleProperty::Position).unwrap(), "fixed");
        assert_eq!(doc.bounding_rect(&backdrop).unwrap().width, 1280.0);
        assert_eq!(doc.class_name(doc.body_id()), "has-cookie-banner");

        let late = doc.apply_mutation(&page.mutations[0]).expect("body parent");
        assert_eq!(doc.inner_html(&late).unwrap(), "late");
    }
}
