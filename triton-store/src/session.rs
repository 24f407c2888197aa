//! Per-session state shared between an upload session and its sink.
//!
//! Both cells are cheap handles over the same value: the session creates
//! them, keeps one copy and hands a clone to the sink it creates.

use std::fmt;
use std::sync::{Arc, RwLock};

use reqwest::Url;
use tracing::warn;

/// Server-issued token, replaced by every response that carries one.
#[derive(Debug, Clone, Default)]
pub struct SessionToken(Arc<RwLock<String>>);

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, empty until the server has issued one.
    pub fn get(&self) -> String {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = token.into();
    }
}

/// Session-specific upload target, assigned by the first redirect and held
/// already resolved against the request that received it.
#[derive(Debug, Clone, Default)]
pub struct UploadUrl(Arc<RwLock<Option<Url>>>);

impl UploadUrl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.0.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Set the upload URL. A session should only ever be assigned one; a
    /// second assignment is logged and replaces the first.
    pub fn set(&self, url: Url) {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.as_ref() {
            warn!(previous = %previous, new = %url, "Upload URL already set, overwriting");
        }
        *slot = Some(url);
    }

    pub fn get(&self) -> Option<Url> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl fmt::Display for UploadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(url) => f.write_str(url.as_str()),
            None => f.write_str("<unset>"),
        }
    }
}
