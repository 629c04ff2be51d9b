//! API credentials for the chat-completion executor.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tracing::debug;

/// Source of the provider API key.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Result<String>;
}

type Lookup = fn(&str) -> Option<String>;

/// Reads the key from an environment variable once and caches it for the
/// lifetime of the provider.
pub struct EnvCredentialProvider {
    var: String,
    lookup: Lookup,
    cache: Mutex<Option<String>>,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self::with_lookup(var, |name| std::env::var(name).ok())
    }

    /// Use `lookup` instead of the process environment.
    pub fn with_lookup(var: impl Into<String>, lookup: Lookup) -> Self {
        Self {
            var: var.into(),
            lookup,
            cache: Mutex::new(None),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self) -> Result<String> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("credential cache lock poisoned"))?;
        if let Some(key) = cache.as_ref() {
            return Ok(key.clone());
        }
        let key = (self.lookup)(&self.var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("API key not set: export {}", self.var))?;
        debug!(var = %self.var, "loaded API key");
        *cache = Some(key.clone());
        Ok(key)
    }
}

/// Fixed key, for callers that already hold one.
pub struct StaticCredentialProvider(pub String);

impl CredentialProvider for StaticCredentialProvider {
    fn api_key(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
