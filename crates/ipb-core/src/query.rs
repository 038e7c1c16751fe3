//! Tag-filtered computed-style queries
//!
//! The one primitive every detector builds on: "every popup-capable element
//! under this root whose computed `property` satisfies a predicate", reaching
//! one level into the open shadow roots of the elements found.

use std::sync::OnceLock;

use log::debug;

use crate::dom::Document;
use crate::types::{Position, PositionSet, StyleProperty, ZIndex};
use crate::LOG_PREFIX;

// =============================================================================
// Tag Filter
// =============================================================================

/// Tags that can form a popup container.
pub const POPUP_TAGS: &[&str] = &["div", "section", "footer", "aside", "form", "iframe", "dialog"];

/// Known HTML tag names. Everything here that is not in [`POPUP_TAGS`] is
/// excluded; unknown (custom) element names are admitted.
pub const HTML_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "applet", "area", "article", "aside", "audio", "b", "base",
    "basefont", "bdi", "bdo", "big", "blockquote", "body", "br", "button", "canvas", "caption",
    "center", "cite", "code", "col", "colgroup", "data", "datalist", "dd", "del", "details", "dfn",
    "dialog", "dir", "div", "dl", "dt", "em", "embed", "fieldset", "figcaption", "figure", "font",
    "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header",
    "hr", "html", "i", "iframe", "img", "input", "ins", "kbd", "label", "legend", "li", "link",
    "main", "map", "mark", "meta", "meter", "nav", "noframes", "noscript", "object", "ol",
    "optgroup", "option", "output", "p", "param", "picture", "pre", "progress", "q", "rp", "rt",
    "ruby", "s", "samp", "script", "section", "select", "small", "source", "span", "strike",
    "strong", "style", "sub", "summary", "sup", "svg", "table", "tbody", "td", "template",
    "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "tt", "u", "ul", "var",
    "video", "wbr",
];

/// Restricts queries to popup-capable tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagFilter;

impl TagFilter {
    pub const fn popup() -> Self {
        Self
    }

    /// Whether an element with this tag name takes part in queries.
    pub fn admits(&self, tag: &str) -> bool {
        let is = |list: &[&str]| list.iter().any(|known| known.eq_ignore_ascii_case(tag));
        is(POPUP_TAGS) || !is(HTML_TAGS)
    }

    /// The equivalent negative selector, `*:not(a):not(abbr)...`.
    pub fn selector(&self) -> &'static str {
        static SELECTOR: OnceLock<String> = OnceLock::new();
        SELECTOR.get_or_init(|| {
            let mut selector = String::from("*");
            for tag in HTML_TAGS.iter().filter(|tag| !POPUP_TAGS.contains(*tag)) {
                selector.push_str(":not(");
                selector.push_str(tag);
                selector.push(')');
            }
            selector
        })
    }
}

// =============================================================================
// Style Predicates
// =============================================================================

/// A predicate over one computed style property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleMatch<'a> {
    /// Exact value equality.
    Equals(StyleProperty, &'a str),
    /// `position` is any member of the set.
    Position(PositionSet),
    /// `z-index` is numeric and strictly greater than the threshold.
    ZIndexAbove(i64),
}

impl StyleMatch<'static> {
    pub const FIXED: Self = StyleMatch::Position(PositionSet::FIXED);
}

impl StyleMatch<'_> {
    pub fn property(&self) -> StyleProperty {
        match self {
            Self::Equals(property, _) => *property,
            Self::Position(_) => StyleProperty::Position,
            Self::ZIndexAbove(_) => StyleProperty::ZIndex,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Equals(_, expected) => value.trim() == *expected,
            Self::Position(set) => set.intersects(Position::parse(value).to_set()),
            Self::ZIndexAbove(threshold) => ZIndex::parse(value).is_above(*threshold),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Popup-capable elements under `root` (default: body), plus those found one
/// level into the shadow roots of the elements found.
pub fn popup_candidates<D: Document>(doc: &D, root: Option<&D::Node>) -> Vec<D::Node> {
    let search_root = match root {
        Some(node) => doc.element_root(node),
        None => match doc.body() {
            Some(body) => doc.element_root(&body),
            None => return Vec::new(),
        },
    };

    let filter = TagFilter::popup();
    let mut elements = doc.descendants(&search_root, &filter);

    let shadow_elements: Vec<D::Node> = elements
        .iter()
        .filter_map(|element| doc.shadow_root(element))
        .flat_map(|shadow| doc.descendants(&shadow, &filter))
        .collect();

    elements.extend(shadow_elements);
    elements
}

/// Every popup candidate under `root` whose computed style satisfies `matcher`.
///
/// Elements whose style cannot be read are skipped.
pub fn find_by_style<D: Document>(doc: &D, matcher: &StyleMatch<'_>, root: Option<&D::Node>) -> Vec<D::Node> {
    popup_candidates(doc, root)
        .into_iter()
        .filter(|element| style_matches(doc, element, matcher))
        .collect()
}

/// Whether any popup candidate under `root` satisfies `matcher`.
pub fn any_by_style<D: Document>(doc: &D, matcher: &StyleMatch<'_>, root: Option<&D::Node>) -> bool {
    popup_candidates(doc, root)
        .iter()
        .any(|element| style_matches(doc, element, matcher))
}

pub(crate) fn style_matches<D: Document>(doc: &D, element: &D::Node, matcher: &StyleMatch<'_>) -> bool {
    match doc.read(element, matcher.property()) {
        Ok(value) => matcher.matches(&value),
        Err(err) => {
            debug!("{LOG_PREFIX} skipping {element:?}: {err}");
            false
        }
    }
}
