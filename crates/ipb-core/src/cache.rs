//! Per-host replay cache
//!
//! Rules that worked on a host are persisted so the next visit can hide the
//! same elements before any detection runs. Storage is an external key-value
//! service shared by every tab of the host; updates are unsynchronized
//! read-merge-write, so concurrent tabs can lose each other's appends.
//!
//! # Keys
//!
//! - `{hostname}`: opt-out flag, the string `"i"` means "ignore this site"
//! - `{host}-cache`: a JSON object whose `cssRulesCache` field holds the rule
//!   text; other fields are preserved on write

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::LOG_PREFIX;

/// Opt-out flag value.
pub const IGNORE_FLAG: &str = "i";

// =============================================================================
// Storage Service
// =============================================================================

/// Asynchronous key-value storage.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// In-process store for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Value>>,
    unavailable: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: Value) -> Self {
        self.entries.borrow_mut().insert(key.to_string(), value);
        self
    }

    pub fn entry(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.get() {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check()?;
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// Site Cache
// =============================================================================

/// Persisted payload for one host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCacheRecord {
    #[serde(rename = "cssRulesCache", default)]
    pub css_rules: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a page needs to know before it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bootstrap {
    /// The host opted out; the engine must not run.
    pub ignored: bool,
    /// Non-empty cached rule text to replay.
    pub cached_rules: Option<String>,
}

/// Cache accessor bound to one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCache {
    hostname: String,
    cache_key: String,
}

impl SiteCache {
    /// `hostname` keys the opt-out flag; `host` (hostname plus any port) keys
    /// the rule record.
    pub fn new(hostname: &str, host: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            cache_key: format!("{host}-cache"),
        }
    }

    pub fn for_host(host: &str) -> Self {
        Self::new(host, host)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Read the opt-out flag and, unless opted out, the cached rules.
    pub async fn bootstrap<S: KeyValueStore>(&self, store: &S) -> Result<Bootstrap, StoreError> {
        if self.is_ignored(store).await? {
            return Ok(Bootstrap {
                ignored: true,
                cached_rules: None,
            });
        }

        let cached_rules = self
            .load(store)
            .await?
            .map(|record| record.css_rules)
            .filter(|rules| !rules.trim().is_empty());

        Ok(Bootstrap {
            ignored: false,
            cached_rules,
        })
    }

    pub async fn is_ignored<S: KeyValueStore>(&self, store: &S) -> Result<bool, StoreError> {
        let flag = store.get(&self.hostname).await?;
        Ok(matches!(flag, Some(Value::String(ref value)) if value == IGNORE_FLAG))
    }

    pub async fn set_ignored<S: KeyValueStore>(&self, store: &S, ignored: bool) -> Result<(), StoreError> {
        let value = if ignored {
            Value::String(IGNORE_FLAG.to_string())
        } else {
            Value::Null
        };
        store.set(&self.hostname, value).await
    }

    pub async fn load<S: KeyValueStore>(&self, store: &S) -> Result<Option<SiteCacheRecord>, StoreError> {
        match store.get(&self.cache_key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|err| StoreError::Malformed {
                key: self.cache_key.clone(),
                reason: err.to_string(),
            }),
        }
    }

    /// Append `rules` to the stored record, never replacing what is there.
    ///
    /// A rule equal to a complete rule already stored is not appended again.
    /// Returns the number of rules appended.
    pub async fn merge<S: KeyValueStore>(&self, store: &S, rules: &[String]) -> Result<usize, StoreError> {
        let mut record = self.load(store).await?.unwrap_or_default();
        let mut stored: HashSet<String> = split_rules(&record.css_rules).map(str::to_string).collect();

        let mut appended = 0;
        for rule in rules {
            let rule = rule.trim();
            if rule.is_empty() || !stored.insert(rule.to_string()) {
                continue;
            }
            if !record.css_rules.is_empty() {
                record.css_rules.push(' ');
            }
            record.css_rules.push_str(rule);
            appended += 1;
        }

        if appended == 0 {
            return Ok(0);
        }

        let value = serde_json::to_value(&record).map_err(|err| StoreError::Malformed {
            key: self.cache_key.clone(),
            reason: err.to_string(),
        })?;
        store.set(&self.cache_key, value).await?;

        info!("{LOG_PREFIX} cached {appended} rule(s) for {}", self.hostname);
        Ok(appended)
    }
}

/// Complete `selector { ... }` rules in stored rule text.
pub fn split_rules(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive('}').map(str::trim).filter(|rule| !rule.is_empty())
}
