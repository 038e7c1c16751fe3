//! Error types for the popup blocker engine

/// Failure reading from or writing to the page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Element is detached from the document")]
    Detached,
    #[error("Computed style unavailable: {0}")]
    StyleUnavailable(&'static str),
    #[error("Document head unavailable")]
    HeadUnavailable,
    #[error("Host error: {0}")]
    Host(String),
}

/// Failure talking to the key-value storage service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage rejected request: {0}")]
    Rejected(String),
    #[error("Malformed stored value for '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Invalid static configuration table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Umbrella error for the startup chain and cache flushes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
