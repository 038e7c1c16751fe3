//! Inline Popup Blocker Core Library
//!
//! This crate provides the detection-and-suppression engine for the Inline
//! Popup Blocker. It removes two classes of intrusive UI without any
//! site-specific rules: full-viewport overlays (newsletter and app-install
//! popups) and cookie-consent banners.
//!
//! # Architecture
//!
//! The engine never touches a browser directly. Everything it needs from the
//! page is expressed by the [`dom::Document`] capability trait, and everything
//! it needs from persistent storage by [`cache::KeyValueStore`]. A host (the
//! `ipb-wasm` bindings, the CLI harness, or a test) implements those traits and
//! drives a [`session::PageSession`] with mutation notifications and timer
//! ticks.
//!
//! # Modules
//!
//! - `types`: shared value types (positions, z-index, rectangles, identifiers)
//! - `config`: the static engine configuration table
//! - `dom`: document capability traits plus an in-memory document
//! - `query`: tag-filtered computed-style queries
//! - `overlay`: full-viewport overlay detection
//! - `cookie`: cookie-banner detection
//! - `suppress`: rule derivation, dedup, injection and verification retries
//! - `scroll`: scroll unlocking and body class stripping
//! - `scheduler`: adaptive mutation debouncing
//! - `cache`: the per-host persisted replay cache
//! - `session`: the page-lifetime context tying everything together

pub mod types;
pub mod error;
pub mod config;
pub mod dom;
pub mod query;
pub mod overlay;
pub mod cookie;
pub mod suppress;
pub mod scroll;
pub mod scheduler;
pub mod cache;
pub mod session;

/// Prefix carried by every log line the engine emits.
pub const LOG_PREFIX: &str = "[inline-popup-blocker]";

/// Milliseconds on the host's clock.
pub type Millis = u64;

// Re-export commonly used types
pub use cache::{KeyValueStore, MemoryStore, SiteCache};
pub use config::EngineConfig;
pub use dom::{BlockNotifier, Document, MemoryDocument, StyleReader};
pub use error::{DomError, EngineError, StoreError};
pub use session::PageSession;
pub use types::{ElementIdentifier, Position, Rect, StyleProperty, Viewport, ZIndex};
