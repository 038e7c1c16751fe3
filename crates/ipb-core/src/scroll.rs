//! Scroll unlocking
//!
//! Banners commonly lock page scrolling, either through `overflow` on the
//! root and body or through a marker class on the body. Both are undone here.

use log::{debug, info};

use crate::dom::{position_of, Document};
use crate::suppress::RuleCache;
use crate::types::{Position, StyleProperty};
use crate::LOG_PREFIX;

/// Document-level fallback for pages whose scripts fight the inline overrides.
pub const SCROLL_FALLBACK_RULE: &str =
    "html { overflow: auto !important; } body { overflow: auto !important; }";

/// Whether root/body inline overflow still differs from the unlocked values.
pub fn is_scroll_locked<D: Document>(doc: &D) -> bool {
    let body_unlocked = doc
        .body()
        .and_then(|body| doc.inline_style(&body, StyleProperty::Overflow))
        .is_some_and(|value| value == "unset");
    let html_unlocked = doc
        .html()
        .and_then(|html| doc.inline_style(&html, StyleProperty::Overflow))
        .is_some_and(|value| value == "auto");

    !(body_unlocked && html_unlocked)
}

/// Force root and body scrollable again. No-op when already unlocked.
///
/// Returns whether anything was changed.
pub fn unlock_scroll<D: Document>(doc: &mut D, rules: &mut RuleCache) -> bool {
    if !is_scroll_locked(&*doc) {
        return false;
    }

    let targets = [(doc.html(), "auto"), (doc.body(), "unset")];
    for (element, overflow) in targets {
        let Some(element) = element else { continue };

        if let Err(err) = doc.set_inline_style(&element, StyleProperty::Overflow, overflow) {
            debug!("{LOG_PREFIX} could not unlock overflow on {element:?}: {err}");
        }

        if matches!(position_of(&*doc, &element), Ok(Position::Absolute)) {
            if let Err(err) = doc.set_inline_style(&element, StyleProperty::Position, "unset") {
                debug!("{LOG_PREFIX} could not reset position on {element:?}: {err}");
            }
        }
    }

    rules.inject(doc, SCROLL_FALLBACK_RULE);
    true
}

/// Drop every body class containing one of `keywords`.
///
/// Returns the number of classes removed.
pub fn strip_body_class_keywords<D: Document>(doc: &mut D, keywords: &[String]) -> usize {
    let Some(body) = doc.body() else { return 0 };
    let Ok(identifier) = doc.identifier(&body) else { return 0 };

    let (dropped, kept): (Vec<&str>, Vec<&str>) = identifier
        .class_tokens()
        .partition(|class| keywords.iter().any(|keyword| class.contains(keyword.as_str())));

    if dropped.is_empty() {
        return 0;
    }

    info!("{LOG_PREFIX} removing body classes {dropped:?}");
    if doc.set_class_name(&body, &kept.join(" ")).is_err() {
        return 0;
    }
    dropped.len()
}
