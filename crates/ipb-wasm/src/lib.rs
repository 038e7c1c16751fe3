//! WebAssembly bindings for Inline Popup Blocker
//!
//! The content script calls [`start`] once the DOM is ready. Everything after
//! that is driven from here: one `MutationObserver` on the body, one timer
//! re-armed to the session's next deadline, and background cache flushes.

mod console_log;
mod extension;
mod live_dom;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ipb_core::dom::Document;
use ipb_core::scheduler::NotifyOutcome;
use ipb_core::{DomError, EngineConfig, EngineError, Millis, PageSession, SiteCache, LOG_PREFIX};
use log::{debug, error, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord, Window};

pub use extension::{BrowserStorage, RuntimeNotifier};
pub use live_dom::{LiveDocument, LiveRoot};

type MutationCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

struct Runtime {
    doc: LiveDocument,
    session: PageSession<Element>,
    storage: Rc<BrowserStorage>,
    timer: Option<i32>,
    flushing: bool,
    on_timer: Closure<dyn FnMut()>,
    observer: Option<MutationObserver>,
    _on_mutation: Option<MutationCallback>,
}

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
    static STARTING: Cell<bool> = const { Cell::new(false) };
}

fn now() -> Millis {
    js_sys::Date::now() as Millis
}

fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    RUNTIME.with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Start blocking on the current page.
///
/// `config_json` is the static configuration table; defaults apply when it
/// is absent. Storage and DOM failures are logged and leave the page alone.
#[wasm_bindgen]
pub fn start(config_json: Option<String>) -> Result<(), JsValue> {
    let config = match config_json.as_deref() {
        Some(text) => EngineConfig::from_json(text).map_err(|e| JsValue::from_str(&e.to_string()))?,
        None => EngineConfig::default(),
    };
    console_log::init(config.log_level());

    claim_start()?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let location = window.location();
    let site = SiteCache::new(&location.hostname()?, &location.host()?);

    let storage = match BrowserStorage::sync() {
        Ok(storage) => storage,
        Err(err) => {
            error!("{LOG_PREFIX} ERROR: {err}");
            return Ok(());
        }
    };

    spawn_local(async move {
        match site.bootstrap(&storage).await {
            Ok(boot) if boot.ignored => info!("{LOG_PREFIX} {} is on the ignore list", site.hostname()),
            Ok(boot) => {
                if let Err(err) = launch(window, config, site, storage, boot.cached_rules) {
                    error!("{LOG_PREFIX} ERROR: {err}");
                }
            }
            Err(err) => error!("{LOG_PREFIX} ERROR: {err}"),
        }
    });

    Ok(())
}

/// True from the first accepted [`start`] call, including while the
/// bootstrap read is still pending.
#[wasm_bindgen]
pub fn is_started() -> bool {
    STARTING.with(Cell::get) || RUNTIME.with(|cell| cell.borrow().is_some())
}

fn claim_start() -> Result<(), JsValue> {
    if is_started() {
        return Err(JsValue::from_str("Already started. Reload the page to restart."));
    }
    STARTING.with(|starting| starting.set(true));
    Ok(())
}

/// Every style text injected on this page so far.
#[wasm_bindgen]
pub fn applied_rules() -> js_sys::Array {
    let rules = js_sys::Array::new();
    with_runtime(|rt| {
        for rule in rt.session.rules().iter() {
            rules.push(&JsValue::from_str(rule));
        }
    });
    rules
}

fn launch(
    window: Window,
    config: EngineConfig,
    site: SiteCache,
    storage: BrowserStorage,
    cached_rules: Option<String>,
) -> Result<(), EngineError> {
    let mut doc = LiveDocument::new(window)?;
    let started_at = now();
    let mut session = PageSession::new(config, site, Box::new(RuntimeNotifier::new()), started_at);
    session.start(&mut doc, cached_rules.as_deref(), started_at);

    let (observer, on_mutation) = if session.is_stopped() {
        (None, None)
    } else {
        let (observer, callback) = observe(&doc)?;
        (Some(observer), Some(callback))
    };

    RUNTIME.with(|cell| {
        *cell.borrow_mut() = Some(Runtime {
            doc,
            session,
            storage: Rc::new(storage),
            timer: None,
            flushing: false,
            on_timer: Closure::new(on_timer),
            observer,
            _on_mutation: on_mutation,
        });
    });

    rearm();
    schedule_flush();
    Ok(())
}

fn observe(doc: &LiveDocument) -> Result<(MutationObserver, MutationCallback), DomError> {
    let host_error = |err: JsValue| DomError::Host(format!("{err:?}"));
    let body = doc.body().ok_or_else(|| DomError::Host("document has no body".to_string()))?;
    let callback: MutationCallback = Closure::new(on_mutations);
    let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(host_error)?;

    let init = MutationObserverInit::new();
    init.set_attributes(false);
    init.set_child_list(true);
    init.set_subtree(true);
    observer.observe_with_options(&body, &init).map_err(host_error)?;

    Ok((observer, callback))
}

fn on_mutations(records: js_sys::Array, _observer: MutationObserver) {
    let changed: Vec<Element> = records
        .iter()
        .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
        .filter_map(|record| record.target())
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect();

    with_runtime(|rt| {
        let outcome = rt.session.on_mutations(&rt.doc, &changed, now());
        if let NotifyOutcome::Discarded { candidates } = outcome {
            debug!("{LOG_PREFIX} ignored mutation batch of {candidates} elements");
        }
        rt.disconnect_if_stopped();
    });
    rearm();
}

fn on_timer() {
    with_runtime(|rt| {
        rt.timer = None;
        let report = rt.session.tick(&mut rt.doc, now());
        if report.retried > 0 {
            debug!("{LOG_PREFIX} verification added {} rule(s)", report.retried);
        }
        rt.disconnect_if_stopped();
    });
    rearm();
    schedule_flush();
}

/// Point the single timer at the session's next deadline.
fn rearm() {
    with_runtime(|rt| {
        if let Some(handle) = rt.timer.take() {
            rt.doc.window().clear_timeout_with_handle(handle);
        }
        let Some(deadline) = rt.session.next_deadline() else {
            return;
        };

        let delay = deadline.saturating_sub(now()).min(i32::MAX as Millis) as i32;
        match rt
            .doc
            .window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(rt.on_timer.as_ref().unchecked_ref(), delay)
        {
            Ok(handle) => rt.timer = Some(handle),
            Err(err) => error!("{LOG_PREFIX} could not arm timer: {err:?}"),
        }
    });
}

/// Merge unflushed rules into `storage.sync`, one write at a time.
fn schedule_flush() {
    let job = with_runtime(|rt| {
        if rt.flushing {
            return None;
        }
        let rules = rt.session.take_unflushed();
        if rules.is_empty() {
            return None;
        }
        rt.flushing = true;
        Some((rt.session.site().clone(), Rc::clone(&rt.storage), rules))
    })
    .flatten();

    let Some((site, storage, rules)) = job else {
        return;
    };

    spawn_local(async move {
        if let Err(err) = site.merge(storage.as_ref(), &rules).await {
            error!("{LOG_PREFIX} could not update site cache: {err}");
        }
        with_runtime(|rt| rt.flushing = false);
        schedule_flush();
    });
}

impl Runtime {
    fn disconnect_if_stopped(&mut self) {
        if !self.session.is_stopped() {
            return;
        }
        if let Some(observer) = self.observer.take() {
            observer.disconnect();
            info!("{LOG_PREFIX} stopped observing");
        }
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_second_start_is_rejected_before_bootstrap() {
        assert!(!is_started());
        assert_eq!(applied_rules().length(), 0);

        assert!(claim_start().is_ok());
        assert!(is_started());
        assert!(claim_start().is_err());
        assert_eq!(applied_rules().length(), 0);
    }
}
