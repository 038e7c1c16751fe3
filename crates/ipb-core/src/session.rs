//! Page session
//!
//! All state scoped to one document lifetime lives in a [`PageSession`]: the
//! start time, applied rules, pending verification retries, the mutation
//! scheduler and the cookie-banner latch. The host owns the session, feeds it
//! mutation notifications, and calls [`PageSession::tick`] whenever
//! [`PageSession::next_deadline`] passes.

use log::{error, info};

use crate::cache::{KeyValueStore, SiteCache};
use crate::config::EngineConfig;
use crate::cookie::remove_cookie_banners;
use crate::dom::{BlockNotifier, Document};
use crate::error::StoreError;
use crate::overlay::find_and_suppress_overlays;
use crate::scheduler::{MutationScheduler, NotifyOutcome};
use crate::scroll::{strip_body_class_keywords, unlock_scroll};
use crate::suppress::{RuleCache, Suppressor};
use crate::{Millis, LOG_PREFIX};

/// Delay of the full rescan that follows startup.
pub const FOLLOW_UP_SCAN_DELAY_MS: Millis = 100;

/// Without `removeRadicalAllPopus`, scanning ends this long after load.
pub const SCAN_CUTOFF_MS: Millis = 30_000;

/// Result of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// The cookie-banner detector hid something during this scan.
    pub cookie_banner: bool,
    /// Elements hidden by the overlay detector.
    pub overlays: usize,
    /// The overlay pass was skipped because mutations are still settling.
    pub deferred: bool,
    /// The session is past its cutoff and did nothing.
    pub stopped: bool,
}

/// Result of one [`PageSession::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// New rules added by verification retries.
    pub retried: usize,
    pub scans: Vec<ScanReport>,
}

pub struct PageSession<N> {
    config: EngineConfig,
    site: SiteCache,
    started_at: Millis,
    suppressor: Suppressor<N>,
    scheduler: MutationScheduler<N>,
    cookie_banner_blocked: bool,
    follow_up_at: Option<Millis>,
}

impl<N: Clone + PartialEq + std::fmt::Debug> PageSession<N> {
    pub fn new(config: EngineConfig, site: SiteCache, notifier: Box<dyn BlockNotifier>, now: Millis) -> Self {
        Self {
            config,
            site,
            started_at: now,
            suppressor: Suppressor::new(notifier),
            scheduler: MutationScheduler::new(now),
            cookie_banner_blocked: false,
            follow_up_at: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn site(&self) -> &SiteCache {
        &self.site
    }

    pub fn rules(&self) -> &RuleCache {
        self.suppressor.rules()
    }

    pub fn cookie_banner_blocked(&self) -> bool {
        self.cookie_banner_blocked
    }

    pub fn is_stopped(&self) -> bool {
        self.scheduler.is_stopped()
    }

    /// Replay cached rules, then run the first full scan and arm the
    /// follow-up scan.
    pub fn start<D>(&mut self, doc: &mut D, cached_rules: Option<&str>, now: Millis) -> ScanReport
    where
        D: Document<Node = N>,
    {
        if let Some(rules) = cached_rules.filter(|rules| !rules.trim().is_empty()) {
            info!("{LOG_PREFIX} restoredFromCache");
            self.suppressor.rules_mut().inject(doc, rules);
            unlock_scroll(doc, self.suppressor.rules_mut());
            strip_body_class_keywords(doc, &self.config.cookie_body_class_keywords);
        }

        let report = self.scan(doc, None, now);
        if !self.is_stopped() {
            self.follow_up_at = Some(now + FOLLOW_UP_SCAN_DELAY_MS);
        }
        report
    }

    /// Run the detectors. `candidates` restricts the overlay pass to a
    /// mutation batch; `None` scans the whole document.
    pub fn scan<D>(&mut self, doc: &mut D, candidates: Option<Vec<N>>, now: Millis) -> ScanReport
    where
        D: Document<Node = N>,
    {
        let mut report = ScanReport::default();

        if self.past_cutoff(now) {
            if !self.is_stopped() {
                info!("{LOG_PREFIX} scan window closed");
                self.stop();
            }
            report.stopped = true;
            return report;
        }

        if !self.cookie_banner_blocked {
            report.cookie_banner = remove_cookie_banners(
                doc,
                &mut self.suppressor,
                &self.config.cookie_html_keywords,
                now,
            );
            self.cookie_banner_blocked = report.cookie_banner;
        }

        // Overlay detection is the expensive pass; wait for mutations to settle.
        if self.scheduler.is_settling(now) {
            report.deferred = true;
            return report;
        }

        report.overlays = find_and_suppress_overlays(doc, &mut self.suppressor, candidates, now);
        report
    }

    /// Feed one mutation notification.
    pub fn on_mutations<D>(&mut self, doc: &D, changed: &[N], now: Millis) -> NotifyOutcome
    where
        D: Document<Node = N>,
    {
        if self.past_cutoff(now) {
            self.stop();
        }
        self.scheduler.notify(doc, changed, now)
    }

    /// Run everything due at `now`: verification retries, the follow-up
    /// scan, and the debounced rescan.
    pub fn tick<D>(&mut self, doc: &mut D, now: Millis) -> TickReport
    where
        D: Document<Node = N>,
    {
        let mut report = TickReport {
            retried: self.suppressor.run_due_retries(doc, now),
            scans: Vec::new(),
        };

        if self.follow_up_at.is_some_and(|at| at <= now) {
            self.follow_up_at = None;
            report.scans.push(self.scan(doc, None, now));
            if !self.is_stopped() {
                strip_body_class_keywords(doc, &self.config.cookie_body_class_keywords);
            }
        }

        if let Some(batch) = self.scheduler.tick(now) {
            report.scans.push(self.scan(doc, Some(batch), now));
        }

        report
    }

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Millis> {
        [
            self.suppressor.next_retry_at(),
            self.follow_up_at,
            self.scheduler.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Rules applied since the last flush.
    pub fn take_unflushed(&mut self) -> Vec<String> {
        self.suppressor.take_unflushed()
    }

    /// Merge unflushed rules into the host's persisted record.
    ///
    /// A failed write is logged and its rules are not retried.
    pub async fn flush<S: KeyValueStore>(&mut self, store: &S) -> Result<usize, StoreError> {
        let rules = self.take_unflushed();
        if rules.is_empty() {
            return Ok(0);
        }

        self.site.merge(store, &rules).await.map_err(|err| {
            error!("{LOG_PREFIX} could not update site cache: {err}");
            err
        })
    }

    fn past_cutoff(&self, now: Millis) -> bool {
        !self.config.remove_radical_all_popups && now.saturating_sub(self.started_at) >= SCAN_CUTOFF_MS
    }

    fn stop(&mut self) {
        self.scheduler.stop();
        self.follow_up_at = None;
    }
}
