//! Cookie-banner detection
//!
//! A cookie banner is an out-of-flow or high-z-index element whose markup
//! mentions one of the configured keywords. Wrappers that contain a fixed
//! element are skipped so that only the innermost banner container is hidden.

use log::{debug, info};

use crate::dom::{is_hidden, Document};
use crate::overlay::OVERLAY_Z_INDEX_THRESHOLD;
use crate::query::{any_by_style, find_by_style, StyleMatch};
use crate::suppress::Suppressor;
use crate::types::PositionSet;
use crate::{Millis, LOG_PREFIX};

/// Whether `keyword` first occurs in `content` past offset 1.
///
/// Matches at offsets 0 and 1 are deliberately rejected, exactly as the
/// heuristic has always behaved, and only the first occurrence counts.
pub fn keyword_offset_qualifies(content: &str, keyword: &str) -> bool {
    content.find(keyword).is_some_and(|offset| offset > 1)
}

/// Hide every visible banner candidate containing a keyword.
///
/// `keywords` must be lower-case. Returns whether at least one banner matched.
pub fn remove_cookie_banners<D: Document>(
    doc: &mut D,
    suppressor: &mut Suppressor<D::Node>,
    keywords: &[String],
    now: Millis,
) -> bool {
    let mut candidates = find_by_style(&*doc, &StyleMatch::Position(PositionSet::OUT_OF_FLOW), None);
    candidates.extend(find_by_style(&*doc, &StyleMatch::ZIndexAbove(OVERLAY_Z_INDEX_THRESHOLD), None));

    let mut blocked = false;

    for candidate in &candidates {
        if any_by_style(&*doc, &StyleMatch::FIXED, Some(candidate)) {
            continue;
        }

        let content = match doc.inner_html(candidate) {
            Ok(content) => content.to_lowercase(),
            Err(err) => {
                debug!("{LOG_PREFIX} skipping {candidate:?}: {err}");
                continue;
            }
        };

        for keyword in keywords {
            if !keyword_offset_qualifies(&content, keyword) {
                continue;
            }

            match is_hidden(&*doc, candidate) {
                Ok(false) => {
                    info!("{LOG_PREFIX} FOUND Element by keyword = {keyword}: {candidate:?}");
                    suppressor.hide(doc, candidate, now);
                    blocked = true;
                }
                Ok(true) => {}
                Err(err) => debug!("{LOG_PREFIX} skipping {candidate:?}: {err}"),
            }
        }
    }

    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId, NoopNotifier};
    use crate::types::{StyleProperty, Viewport};

    fn keywords() -> Vec<String> {
        vec!["cookie".to_string()]
    }

    fn banner(doc: &mut MemoryDocument, class: &str, text: &str) -> NodeId {
        let body = doc.body_id();
        let node = doc.append(body, "div");
        doc.rename(node, "", class);
        doc.set_computed(node, StyleProperty::Position, "absolute");
        doc.set_text(node, text);
        node
    }

    fn rule_for(class: &str) -> String {
        format!("DIV.{class} {{ display: none !important; }}")
    }

    #[test]
    fn test_keyword_offset_boundary() {
        assert!(!keyword_offset_qualifies("cookie notice", "cookie"));
        assert!(!keyword_offset_qualifies(" cookie notice", "cookie"));
        assert!(keyword_offset_qualifies("  cookie notice", "cookie"));
        // Only the first occurrence is considered.
        assert!(!keyword_offset_qualifies("cookies and more cookies", "cookie"));
        assert!(!keyword_offset_qualifies("anything", ""));
    }

    #[test]
    fn test_visible_banner_is_suppressed() {
        let mut doc = MemoryDocument::new(Viewport::new(1280.0, 800.0));
        let mut suppressor = Suppressor::new(Box::new(NoopNotifier));
        banner(&mut doc, "notice", "We use a Cookie to improve your visit");

        assert!(remove_cookie_banners(&mut doc, &mut suppressor, &keywords(), 0));
        assert!(doc.injected_styles().contains(&rule_for("notice")));
    }

    #[test]
    fn test_hidden_banner_is_left_alone() {
        let mut doc = MemoryDocument::new(Viewport::new(1280.0, 800.0));
        let mut suppressor = Suppressor::new(Box::new(NoopNotifier));
        let node = banner(&mut doc, "notice", "We use a cookie to improve your visit");
        doc.set_computed(node, StyleProperty::Display, "none");

        assert!(!remove_cookie_banners(&mut doc, &mut suppressor, &keywords(), 0));
        assert!(suppressor.rules().is_empty());
    }

    #[test]
    fn test_wrapper_with_fixed_descendant_is_skipped() {
        let mut doc = MemoryDocument::new(Viewport::new(1280.0, 800.0));
        let mut suppressor = Suppressor::new(Box::new(NoopNotifier));
        let wrapper = banner(&mut doc, "wrapper", "site chrome");
        let inner = doc.append(wrapper, "div");
        doc.rename(inner, "", "inner");
        doc.set_computed(inner, StyleProperty::Position, "fixed");
        doc.set_text(inner, "Accept all cookies?");

        assert!(remove_cookie_banners(&mut doc, &mut suppressor, &keywords(), 0));
        assert!(doc.injected_styles().contains(&rule_for("inner")));
        assert!(!doc.injected_styles().contains(&rule_for("wrapper")));
    }

    #[test]
    fn test_high_z_index_static_element_is_candidate() {
        let mut doc = MemoryDocument::new(Viewport::new(1280.0, 800.0));
        let mut suppressor = Suppressor::new(Box::new(NoopNotifier));
        let body = doc.body_id();
        let node = doc.append(body, "section");
        doc.rename(node, "consent", "");
        doc.set_computed(node, StyleProperty::ZIndex, "2147483647");
        doc.set_text(node, "Manage cookie preferences");

        assert!(remove_cookie_banners(&mut doc, &mut suppressor, &keywords(), 0));
        assert!(doc
            .injected_styles()
            .contains(&"SECTION#consent { display: none !important; }".to_string()));
    }

    #[test]
    fn test_keyword_at_start_is_not_matched() {
        let mut doc = MemoryDocument::new(Viewport::new(1280.0, 800.0));
        let mut suppressor = Suppressor::new(Box::new(NoopNotifier));
        banner(&mut doc, "notice", "Cookie settings");

        assert!(!remove_cookie_banners(&mut doc, &mut suppressor, &keywords(), 0));
    }
}
