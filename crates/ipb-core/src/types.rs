//! Core type definitions for the popup blocker
//!
//! These are read-only snapshots of what the host reports about an element.
//! None of them are cached by the engine: styles, geometry and identifiers are
//! re-read on every use because the page keeps rewriting them.

use serde::{Deserialize, Serialize};

// =============================================================================
// Style Properties
// =============================================================================

/// Computed style properties the heuristics inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleProperty {
    Position,
    ZIndex,
    Display,
    Overflow,
}

impl StyleProperty {
    /// CSS property name, as passed to `getPropertyValue`.
    pub const fn css_name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::ZIndex => "z-index",
            Self::Display => "display",
            Self::Overflow => "overflow",
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// Resolved value of the `position` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
    Other,
}

impl Position {
    /// Parse a computed `position` value.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "static" => Self::Static,
            "relative" => Self::Relative,
            "absolute" => Self::Absolute,
            "fixed" => Self::Fixed,
            "sticky" => Self::Sticky,
            _ => Self::Other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Relative => "relative",
            Self::Absolute => "absolute",
            Self::Fixed => "fixed",
            Self::Sticky => "sticky",
            Self::Other => "",
        }
    }

    /// The single-member set for this position.
    pub fn to_set(self) -> PositionSet {
        match self {
            Self::Static => PositionSet::STATIC,
            Self::Relative => PositionSet::RELATIVE,
            Self::Absolute => PositionSet::ABSOLUTE,
            Self::Fixed => PositionSet::FIXED,
            Self::Sticky => PositionSet::STICKY,
            Self::Other => PositionSet::empty(),
        }
    }
}

bitflags::bitflags! {
    /// A set of `position` values a query accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PositionSet: u8 {
        const STATIC = 1 << 0;
        const RELATIVE = 1 << 1;
        const ABSOLUTE = 1 << 2;
        const FIXED = 1 << 3;
        const STICKY = 1 << 4;

        /// Positions that take an element out of normal flow, where banners live.
        const OUT_OF_FLOW = Self::ABSOLUTE.bits() | Self::FIXED.bits();
    }
}

// =============================================================================
// Z-Index
// =============================================================================

/// Resolved value of the `z-index` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ZIndex {
    #[default]
    Auto,
    Value(i64),
}

impl ZIndex {
    /// Parse a computed `z-index` value. Anything non-numeric is `Auto`.
    pub fn parse(value: &str) -> Self {
        value
            .trim()
            .parse::<i64>()
            .map(Self::Value)
            .unwrap_or(Self::Auto)
    }

    /// Numeric value, or `None` for `auto`.
    pub const fn value(self) -> Option<i64> {
        match self {
            Self::Auto => None,
            Self::Value(v) => Some(v),
        }
    }

    /// Strict numeric comparison. `auto` is never above anything.
    pub fn is_above(self, threshold: i64) -> bool {
        matches!(self, Self::Value(v) if v > threshold)
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Bounding rectangle of an element relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self { top, left, width, height }
    }
}

/// Inner size of the window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

// =============================================================================
// Element Identifier
// =============================================================================

/// Snapshot of the attributes a suppression selector is built from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementIdentifier {
    /// Tag name as reported by the host (upper-case for HTML elements).
    pub tag: String,
    /// `id` attribute, empty when absent.
    pub id: String,
    /// Raw `class` attribute, empty when absent.
    pub class_name: String,
}

impl ElementIdentifier {
    pub fn new(tag: impl Into<String>, id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: id.into(),
            class_name: class_name.into(),
        }
    }

    /// Class tokens, skipping the empty ones produced by repeated spaces.
    pub fn class_tokens(&self) -> impl Iterator<Item = &str> {
        self.class_name.split(' ').filter(|token| !token.is_empty())
    }

    /// Build the CSS selector `TAG#id.class1.class2`.
    pub fn selector(&self) -> String {
        let mut selector = String::with_capacity(self.tag.len() + self.id.len() + self.class_name.len() + 2);
        selector.push_str(&self.tag);

        if !self.id.is_empty() {
            selector.push('#');
            selector.push_str(&self.id);
        }

        for token in self.class_tokens() {
            selector.push('.');
            selector.push_str(token);
        }

        selector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(Position::parse("fixed"), Position::Fixed);
        assert_eq!(Position::parse(" absolute "), Position::Absolute);
        assert_eq!(Position::parse("-webkit-sticky"), Position::Other);
        assert!(PositionSet::OUT_OF_FLOW.contains(Position::Fixed.to_set()));
        assert!(!PositionSet::OUT_OF_FLOW.intersects(Position::Relative.to_set()));
        assert!(!PositionSet::OUT_OF_FLOW.intersects(Position::Other.to_set()));
    }

    #[test]
    fn test_z_index() {
        assert_eq!(ZIndex::parse("9999"), ZIndex::Value(9999));
        assert_eq!(ZIndex::parse("-1"), ZIndex::Value(-1));
        assert_eq!(ZIndex::parse("auto"), ZIndex::Auto);
        assert!(ZIndex::Value(101).is_above(100));
        assert!(!ZIndex::Value(100).is_above(100));
        assert!(!ZIndex::Auto.is_above(-1));
    }

    #[test]
    fn test_selector() {
        let ident = ElementIdentifier::new("DIV", "consent", "banner  bottom ");
        assert_eq!(ident.selector(), "DIV#consent.banner.bottom");
        assert_eq!(ElementIdentifier::new("SECTION", "", "").selector(), "SECTION");
        assert_eq!(ElementIdentifier::new("DIV", "", "banner").selector(), "DIV.banner");
    }
}
