//! Fixture replay on a virtual clock.
//!
//! The page is built from its fixture at t=0. From there the clock jumps to
//! whichever comes first: the next timed mutation or the session's next
//! deadline. Mutations are delivered the way a `MutationObserver` reports a
//! child-list change, with the parent as the changed node.

use ipb_core::dom::{CountingNotifier, MemoryDocument, PageFixture};
use ipb_core::{EngineConfig, KeyValueStore, Millis, PageSession, SiteCache, StoreError, LOG_PREFIX};
use log::{debug, warn};

#[derive(Debug, Default)]
pub struct SimulationReport {
    /// Every style text injected, in order.
    pub rules: Vec<String>,
    /// Badge notifications sent.
    pub blocked: usize,
    /// Rules written to the store.
    pub cached: usize,
    /// Virtual time at which the page went quiet.
    pub finished_at: Millis,
}

/// Split `host` into the hostname (without port) and the full host.
pub fn site_for(host: &str) -> SiteCache {
    let hostname = host.split(':').next().unwrap_or(host);
    SiteCache::new(hostname, host)
}

/// Replay `page`. Returns `None` when the host has opted out.
pub async fn run<S: KeyValueStore>(
    page: &PageFixture,
    config: EngineConfig,
    store: &S,
) -> Result<Option<SimulationReport>, StoreError> {
    let site = site_for(&page.host);
    let boot = site.bootstrap(store).await?;
    if boot.ignored {
        return Ok(None);
    }

    let mut doc = MemoryDocument::from_fixture(page);
    let notifier = CountingNotifier::new();
    let mut session = PageSession::new(config, site, Box::new(notifier.clone()), 0);
    let mut report = SimulationReport::default();

    session.start(&mut doc, boot.cached_rules.as_deref(), 0);
    report.cached += flush(&mut session, store).await;

    let mut mutations = page.mutations.clone();
    mutations.sort_by_key(|mutation| mutation.at);
    let mut mutations = mutations.into_iter().peekable();

    loop {
        let deadline = session.next_deadline();
        let next_mutation = mutations.peek().map(|mutation| mutation.at);

        let mutation_first = match (next_mutation, deadline) {
            (None, None) => break,
            (Some(at), Some(deadline)) => at <= deadline,
            (Some(_), None) => true,
            (None, Some(_)) => false,
        };

        if mutation_first {
            let Some(mutation) = mutations.next() else { break };
            let at = mutation.at;
            report.finished_at = at;

            let target = match &mutation.parent {
                Some(id) => doc.find_by_id(id),
                None => Some(doc.body_id()),
            };
            let Some(target) = target else {
                warn!("{LOG_PREFIX} mutation at {at}ms names unknown parent {:?}", mutation.parent);
                continue;
            };

            doc.apply_mutation(&mutation);
            let outcome = session.on_mutations(&doc, &[target], at);
            debug!("{LOG_PREFIX} t={at}ms mutation -> {outcome:?}");
        } else if let Some(deadline) = deadline {
            report.finished_at = deadline;
            let tick = session.tick(&mut doc, deadline);
            debug!("{LOG_PREFIX} t={deadline}ms tick -> {tick:?}");
            report.cached += flush(&mut session, store).await;
        }
    }

    report.rules = session.rules().iter().map(str::to_string).collect();
    report.blocked = notifier.count();
    Ok(Some(report))
}

async fn flush<S: KeyValueStore>(session: &mut PageSession<ipb_core::dom::NodeId>, store: &S) -> usize {
    // Failures are already logged by the session.
    session.flush(store).await.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipb_core::MemoryStore;
    use serde_json::json;

    fn fixture(json: serde_json::Value) -> PageFixture {
        serde_json::from_value(json).expect("fixture should parse")
    }

    #[tokio::test]
    async fn test_late_overlay_is_caught_and_cached() {
        let page = fixture(json!({
            "host": "news.example",
            "viewport": { "width": 1280, "height": 800 },
            "elements": [ { "tag": "main", "id": "content" } ],
            "mutations": [
                { "at": 3000, "element": {
                    "tag": "div", "class": "nl-backdrop",
                    "style": { "position": "fixed", "z_index": "9999" },
                    "rect": { "top": 0, "left": 0, "width": 1280, "height": 800 }
                } },
                { "at": 3000, "element": {
                    "tag": "div", "class": "nl-dialog",
                    "style": { "z_index": "10000" }
                } }
            ]
        }));
        let store = MemoryStore::new();

        let report = run(&page, EngineConfig::default(), &store)
            .await
            .unwrap()
            .expect("site not ignored");

        assert!(report.rules.contains(&"DIV.nl-backdrop { display: none !important; }".to_string()));
        assert!(report.rules.contains(&"DIV.nl-dialog { display: none !important; }".to_string()));
        assert_eq!(report.blocked, 2);
        assert_eq!(report.cached, 2);

        let record = store.entry("news.example-cache").expect("record written");
        assert_eq!(
            record["cssRulesCache"],
            json!("DIV.nl-backdrop { display: none !important; } DIV.nl-dialog { display: none !important; }")
        );
    }

    #[tokio::test]
    async fn test_ignored_host_does_not_run() {
        let page = fixture(json!({
            "host": "shop.example:8443",
            "viewport": { "width": 1024, "height": 768 }
        }));
        let store = MemoryStore::new().with_entry("shop.example", json!("i"));

        assert!(run(&page, EngineConfig::default(), &store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_does_not_start() {
        let page = fixture(json!({
            "host": "example.com",
            "viewport": { "width": 1024, "height": 768 }
        }));
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(run(&page, EngineConfig::default(), &store).await.is_err());
    }

    #[test]
    fn test_site_for_strips_port() {
        let site = site_for("shop.example:8443");
        assert_eq!(site.hostname(), "shop.example");
        assert_eq!(site.cache_key(), "shop.example:8443-cache");
    }
}
