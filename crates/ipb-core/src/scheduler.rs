//! Mutation-driven rescan scheduling
//!
//! Mutation notifications are expanded to popup-capable descendants, filtered
//! to fixed elements and accumulated into a batch. Each notification that
//! leaves the batch non-empty replaces the pending rescan deadline, so only
//! the latest deadline in a debounce window ever fires. The debounce window
//! grows as the page ages.

use log::debug;

use crate::dom::Document;
use crate::query::{style_matches, StyleMatch, TagFilter};
use crate::{Millis, LOG_PREFIX};

/// Notifications expanding to more candidates than this are dropped.
pub const MAX_MUTATION_CANDIDATES: usize = 2000;

/// Debounce window for a page that has been alive for `elapsed` ms.
pub fn wait_for_elapsed(elapsed: Millis) -> Millis {
    match elapsed {
        e if e > 20_000 => 2_000,
        e if e > 10_000 => 1_000,
        e if e > 5_000 => 500,
        _ => 200,
    }
}

/// What a notification did to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Too many candidates; the notification was dropped without effect.
    Discarded { candidates: usize },
    /// Nothing fixed has been gathered yet.
    Idle,
    /// A rescan is pending at `at`, replacing any earlier one.
    Scheduled { at: Millis },
    /// The scheduler no longer observes this page.
    Stopped,
}

/// Debounced rescan scheduler for one page lifetime.
#[derive(Debug)]
pub struct MutationScheduler<N> {
    started_at: Millis,
    wait: Millis,
    last_modification: Option<Millis>,
    pending: Vec<N>,
    deadline: Option<Millis>,
    stopped: bool,
}

impl<N: Clone + PartialEq + std::fmt::Debug> MutationScheduler<N> {
    pub fn new(started_at: Millis) -> Self {
        Self {
            started_at,
            wait: wait_for_elapsed(0),
            last_modification: None,
            pending: Vec::new(),
            deadline: None,
            stopped: false,
        }
    }

    /// Current debounce window. Never decreases.
    pub fn wait_timer(&mut self, now: Millis) -> Millis {
        let wait = wait_for_elapsed(now.saturating_sub(self.started_at));
        self.wait = self.wait.max(wait);
        self.wait
    }

    /// Whether a modification happened less than one debounce window ago.
    pub fn is_settling(&mut self, now: Millis) -> bool {
        let wait = self.wait_timer(now);
        self.last_modification
            .is_some_and(|last| now.saturating_sub(last) < wait)
    }

    /// Feed one mutation notification: the nodes whose subtrees changed.
    pub fn notify<D>(&mut self, doc: &D, changed: &[N], now: Millis) -> NotifyOutcome
    where
        D: Document<Node = N>,
    {
        if self.stopped {
            return NotifyOutcome::Stopped;
        }

        let filter = TagFilter::popup();
        let mut candidates: Vec<N> = changed.to_vec();
        for node in changed {
            candidates.extend(doc.descendants(&doc.element_root(node), &filter));
            if candidates.len() > MAX_MUTATION_CANDIDATES {
                break;
            }
        }

        if candidates.len() > MAX_MUTATION_CANDIDATES {
            debug!("{LOG_PREFIX} dropping mutation with {} candidates", candidates.len());
            return NotifyOutcome::Discarded { candidates: candidates.len() };
        }

        self.pending.extend(
            candidates
                .into_iter()
                .filter(|node| style_matches(doc, node, &StyleMatch::FIXED)),
        );

        if self.pending.is_empty() {
            return NotifyOutcome::Idle;
        }

        self.last_modification = Some(now);
        let at = now + self.wait_timer(now);
        self.deadline = Some(at);
        NotifyOutcome::Scheduled { at }
    }

    /// Take the batch if its rescan is due at `now`.
    ///
    /// If the debounce window grew since the rescan was scheduled and the last
    /// modification is still inside it, the rescan is pushed back instead.
    pub fn tick(&mut self, now: Millis) -> Option<Vec<N>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        if self.is_settling(now) {
            let last = self.last_modification.unwrap_or(now);
            self.deadline = Some(last + self.wait);
            debug!("{LOG_PREFIX} rescan deferred to {:?}", self.deadline);
            return None;
        }

        self.deadline = None;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.deadline
    }

    pub fn pending(&self) -> &[N] {
        &self.pending
    }

    pub fn last_modification(&self) -> Option<Millis> {
        self.last_modification
    }

    /// Stop observing for good, dropping any pending batch.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
        self.deadline = None;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};
    use crate::types::{StyleProperty, Viewport};

    fn doc() -> MemoryDocument {
        MemoryDocument::new(Viewport::new(1280.0, 800.0))
    }

    fn fixed_child(doc: &mut MemoryDocument, parent: NodeId) -> NodeId {
        let node = doc.append(parent, "div");
        doc.set_computed(node, StyleProperty::Position, "fixed");
        node
    }

    #[test]
    fn test_wait_timer_steps() {
        assert_eq!(wait_for_elapsed(3_000), 200);
        assert_eq!(wait_for_elapsed(5_000), 200);
        assert_eq!(wait_for_elapsed(7_000), 500);
        assert_eq!(wait_for_elapsed(15_000), 1_000);
        assert_eq!(wait_for_elapsed(25_000), 2_000);
    }

    #[test]
    fn test_wait_timer_is_monotonic() {
        let mut scheduler: MutationScheduler<NodeId> = MutationScheduler::new(1_000);
        assert_eq!(scheduler.wait_timer(4_000), 200);
        assert_eq!(scheduler.wait_timer(12_000), 1_000);
        // A clock that steps backwards does not shrink the window.
        assert_eq!(scheduler.wait_timer(2_000), 1_000);
    }

    #[test]
    fn test_fixed_descendants_are_batched() {
        let mut doc = doc();
        let body = doc.body_id();
        let container = doc.append(body, "div");
        let popup = fixed_child(&mut doc, container);
        doc.append(container, "section");

        let mut scheduler = MutationScheduler::new(0);
        assert_eq!(scheduler.notify(&doc, &[container], 1_000), NotifyOutcome::Scheduled { at: 1_200 });
        assert_eq!(scheduler.pending(), &[popup]);
    }

    #[test]
    fn test_non_fixed_mutation_is_idle() {
        let mut doc = doc();
        let body = doc.body_id();
        let container = doc.append(body, "div");
        doc.append(container, "div");

        let mut scheduler = MutationScheduler::new(0);
        assert_eq!(scheduler.notify(&doc, &[container], 100), NotifyOutcome::Idle);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_oversized_notification_is_discarded() {
        let mut doc = doc();
        let body = doc.body_id();
        let first = doc.append(body, "div");
        let popup = fixed_child(&mut doc, first);

        let mut scheduler = MutationScheduler::new(0);
        scheduler.notify(&doc, &[first], 100);
        let before = scheduler.pending().to_vec();
        let deadline = scheduler.next_deadline();

        let flood = doc.append(body, "div");
        for _ in 0..MAX_MUTATION_CANDIDATES {
            fixed_child(&mut doc, flood);
        }

        let outcome = scheduler.notify(&doc, &[flood], 150);
        assert!(matches!(outcome, NotifyOutcome::Discarded { .. }));
        assert_eq!(scheduler.pending(), before.as_slice());
        assert_eq!(scheduler.pending(), &[popup]);
        assert_eq!(scheduler.next_deadline(), deadline);
        assert_eq!(scheduler.last_modification(), Some(100));
    }

    #[test]
    fn test_latest_notification_replaces_deadline() {
        let mut doc = doc();
        let body = doc.body_id();
        let a = fixed_child(&mut doc, body);
        let b = fixed_child(&mut doc, body);

        let mut scheduler = MutationScheduler::new(0);
        scheduler.notify(&doc, &[a], 1_000);
        scheduler.notify(&doc, &[b], 1_150);
        assert_eq!(scheduler.next_deadline(), Some(1_350));

        assert_eq!(scheduler.tick(1_200), None);
        assert_eq!(scheduler.tick(1_350), Some(vec![a, b]));
        assert!(scheduler.pending().is_empty());
        assert_eq!(scheduler.tick(5_000), None);
    }

    #[test]
    fn test_rescan_deferred_when_window_grows() {
        let mut doc = doc();
        let body = doc.body_id();
        let a = fixed_child(&mut doc, body);

        let mut scheduler = MutationScheduler::new(0);
        assert_eq!(scheduler.notify(&doc, &[a], 4_900), NotifyOutcome::Scheduled { at: 5_100 });

        // At 5.1s the window is 500ms and the modification is only 200ms old.
        assert_eq!(scheduler.tick(5_100), None);
        assert_eq!(scheduler.next_deadline(), Some(5_400));
        assert_eq!(scheduler.tick(5_400), Some(vec![a]));
    }

    #[test]
    fn test_stopped_scheduler_ignores_notifications() {
        let mut doc = doc();
        let body = doc.body_id();
        let a = fixed_child(&mut doc, body);

        let mut scheduler = MutationScheduler::new(0);
        scheduler.notify(&doc, &[a], 100);
        scheduler.stop();
        assert_eq!(scheduler.notify(&doc, &[a], 200), NotifyOutcome::Stopped);
        assert_eq!(scheduler.tick(10_000), None);
    }
}
