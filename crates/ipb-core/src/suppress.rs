//! Suppression rules
//!
//! An element is suppressed by injecting `SELECTOR { display: none !important; }`
//! where the selector is rebuilt from the element's current tag, id and class.
//! Every injected rule is remembered for the page lifetime so the same text is
//! never injected twice.

use std::collections::HashSet;
use std::fmt;

use log::{debug, error, info};

use crate::dom::{BlockNotifier, Document};
use crate::scroll;
use crate::{Millis, LOG_PREFIX};

/// Delay before re-deriving a suppressed element's selector.
pub const RETRY_DELAY_MS: Millis = 500;

// =============================================================================
// Suppression Rule
// =============================================================================

/// A hide rule for one selector. Identity is the literal rule text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuppressionRule(String);

impl SuppressionRule {
    pub fn hide(selector: &str) -> Self {
        Self(format!("{selector} {{ display: none !important; }}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SuppressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Rule Cache
// =============================================================================

/// Append-only record of every style text injected this page lifetime.
///
/// Dedup is exact string equality: two texts that hide the same element with
/// different whitespace are two entries.
#[derive(Debug, Default, Clone)]
pub struct RuleCache {
    rules: Vec<String>,
    seen: HashSet<String>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, css: &str) -> bool {
        self.seen.contains(css)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in the order they were injected.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(String::as_str)
    }

    /// Inject `css` unless the exact text was injected before.
    ///
    /// Returns whether a new `<style>` was added. A failed injection is logged
    /// and not recorded.
    pub fn inject<D: Document>(&mut self, doc: &mut D, css: &str) -> bool {
        if self.contains(css) {
            return false;
        }

        if let Err(err) = doc.inject_style(css) {
            error!("{LOG_PREFIX} could not inject style rule: {err}");
            return false;
        }

        info!("{LOG_PREFIX} ADD customCSSRules {}", css.replace('\n', " "));
        self.seen.insert(css.to_string());
        self.rules.push(css.to_string());
        true
    }
}

// =============================================================================
// Suppressor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retry,
}

#[derive(Debug, Clone)]
struct PendingRetry<N> {
    due: Millis,
    element: N,
}

/// Applies suppression rules and schedules their verification retries.
pub struct Suppressor<N> {
    rules: RuleCache,
    /// Persisted rules not yet merged into the site cache.
    unflushed: Vec<String>,
    retries: Vec<PendingRetry<N>>,
    notifier: Box<dyn BlockNotifier>,
}

impl<N: Clone + PartialEq + fmt::Debug> Suppressor<N> {
    pub fn new(notifier: Box<dyn BlockNotifier>) -> Self {
        Self {
            rules: RuleCache::new(),
            unflushed: Vec::new(),
            retries: Vec::new(),
            notifier,
        }
    }

    pub fn rules(&self) -> &RuleCache {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleCache {
        &mut self.rules
    }

    /// Hide `element`. Returns whether a new rule was injected.
    ///
    /// Elements inside a shadow tree are hidden through their host, since a
    /// document-level rule cannot reach into the shadow tree. A new rule also
    /// unlocks page scrolling, signals the notifier, queues the rule for the
    /// site cache and schedules one re-check after [`RETRY_DELAY_MS`].
    pub fn hide<D>(&mut self, doc: &mut D, element: &N, now: Millis) -> bool
    where
        D: Document<Node = N>,
    {
        self.apply(doc, element, now, Attempt::Initial)
    }

    fn apply<D>(&mut self, doc: &mut D, element: &N, now: Millis, attempt: Attempt) -> bool
    where
        D: Document<Node = N>,
    {
        let target = doc.shadow_host(element).unwrap_or_else(|| element.clone());

        let identifier = match doc.identifier(&target) {
            Ok(identifier) => identifier,
            Err(err) => {
                debug!("{LOG_PREFIX} cannot identify {target:?}: {err}");
                return false;
            }
        };

        let rule = SuppressionRule::hide(&identifier.selector());
        if !self.rules.inject(doc, rule.as_str()) {
            return false;
        }

        self.unflushed.push(rule.into_string());
        scroll::unlock_scroll(doc, &mut self.rules);
        self.notifier.blocked();

        if attempt == Attempt::Initial {
            self.retries.push(PendingRetry {
                due: now + RETRY_DELAY_MS,
                element: target,
            });
        }

        true
    }

    /// Re-apply suppression for every retry due at `now`.
    ///
    /// A retry rebuilds the selector from the same element, so a page that
    /// renamed the element after the first rule gets a second rule. Retries
    /// never schedule further retries. Returns the number of new rules.
    pub fn run_due_retries<D>(&mut self, doc: &mut D, now: Millis) -> usize
    where
        D: Document<Node = N>,
    {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retries)
            .into_iter()
            .partition(|retry| retry.due <= now);
        self.retries = waiting;

        let mut applied = 0;
        for retry in due {
            if !doc.is_connected(&retry.element) {
                debug!("{LOG_PREFIX} retry target {:?} left the document", retry.element);
                continue;
            }
            if self.apply(doc, &retry.element, now, Attempt::Retry) {
                applied += 1;
            }
        }
        applied
    }

    pub fn next_retry_at(&self) -> Option<Millis> {
        self.retries.iter().map(|retry| retry.due).min()
    }

    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Drain rules applied since the last call, for the site cache.
    pub fn take_unflushed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.unflushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{CountingNotifier, MemoryDocument, NodeId};
    use crate::types::Viewport;

    fn setup() -> (MemoryDocument, Suppressor<NodeId>, CountingNotifier) {
        let notifier = CountingNotifier::new();
        let suppressor = Suppressor::new(Box::new(notifier.clone()));
        (MemoryDocument::new(Viewport::new(1280.0, 800.0)), suppressor, notifier)
    }

    fn hide_rules(doc: &MemoryDocument) -> Vec<&str> {
        doc.injected_styles()
            .iter()
            .map(String::as_str)
            .filter(|css| css.contains("display: none"))
            .collect()
    }

    #[test]
    fn test_rule_format() {
        assert_eq!(
            SuppressionRule::hide("DIV#consent.banner").as_str(),
            "DIV#consent.banner { display: none !important; }"
        );
    }

    #[test]
    fn test_same_identifier_is_injected_once() {
        let (mut doc, mut suppressor, notifier) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.rename(banner, "", "banner");

        assert!(suppressor.hide(&mut doc, &banner, 0));
        assert!(!suppressor.hide(&mut doc, &banner, 10));

        assert_eq!(hide_rules(&doc), vec!["DIV.banner { display: none !important; }"]);
        assert_eq!(notifier.count(), 1);
        assert_eq!(suppressor.take_unflushed().len(), 1);
        assert_eq!(suppressor.pending_retries(), 1);
    }

    #[test]
    fn test_retry_follows_renamed_element() {
        let (mut doc, mut suppressor, notifier) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.rename(banner, "", "banner");

        suppressor.hide(&mut doc, &banner, 1_000);
        assert_eq!(suppressor.next_retry_at(), Some(1_500));

        doc.rename(banner, "", "banner-v2");
        assert_eq!(suppressor.run_due_retries(&mut doc, 1_499), 0);
        assert_eq!(suppressor.run_due_retries(&mut doc, 1_500), 1);

        assert_eq!(
            hide_rules(&doc),
            vec![
                "DIV.banner { display: none !important; }",
                "DIV.banner-v2 { display: none !important; }",
            ]
        );
        assert_eq!(notifier.count(), 2);
        // The retry does not schedule another retry.
        assert_eq!(suppressor.next_retry_at(), None);
    }

    #[test]
    fn test_retry_without_rename_adds_nothing() {
        let (mut doc, mut suppressor, _) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.rename(banner, "gdpr", "");

        suppressor.hide(&mut doc, &banner, 0);
        assert_eq!(suppressor.run_due_retries(&mut doc, RETRY_DELAY_MS), 0);
        assert_eq!(hide_rules(&doc).len(), 1);
    }

    #[test]
    fn test_retry_on_removed_element_is_noop() {
        let (mut doc, mut suppressor, _) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.rename(banner, "", "banner");

        suppressor.hide(&mut doc, &banner, 0);
        doc.remove(banner);
        assert_eq!(suppressor.run_due_retries(&mut doc, RETRY_DELAY_MS), 0);
        assert_eq!(suppressor.pending_retries(), 0);
    }

    #[test]
    fn test_shadow_content_is_hidden_through_host() {
        let (mut doc, mut suppressor, _) = setup();
        let body = doc.body_id();
        let host = doc.append(body, "consent-dialog");
        let shadow = doc.attach_shadow(host);
        let inner = doc.append(shadow, "div");
        doc.rename(inner, "", "inner");

        assert!(suppressor.hide(&mut doc, &inner, 0));
        assert_eq!(hide_rules(&doc), vec!["CONSENT-DIALOG { display: none !important; }"]);
    }

    #[test]
    fn test_new_rule_unlocks_scroll() {
        let (mut doc, mut suppressor, _) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");

        suppressor.hide(&mut doc, &banner, 0);
        assert!(doc.injected_styles().iter().any(|css| css == scroll::SCROLL_FALLBACK_RULE));
        assert!(!scroll::is_scroll_locked(&doc));
    }

    #[test]
    fn test_failed_injection_is_not_recorded() {
        let (mut doc, mut suppressor, notifier) = setup();
        let body = doc.body_id();
        let banner = doc.append(body, "div");
        doc.set_head_available(false);

        assert!(!suppressor.hide(&mut doc, &banner, 0));
        assert!(suppressor.rules().is_empty());
        assert_eq!(notifier.count(), 0);
        assert_eq!(suppressor.pending_retries(), 0);

        doc.set_head_available(true);
        assert!(suppressor.hide(&mut doc, &banner, 0));
    }
}
