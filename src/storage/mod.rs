pub mod async_store;
pub mod codec;
pub mod error;
pub mod json_store;
pub mod lock;
pub mod null_store;

use std::time::Duration;

use serde_json::Value;

use crate::engine::types::{CounterOp, Group, Mutation, ParameterDocument};
pub use error::{Result, StoreError};

/// Store name used when none is configured: `.step_engine.json` / `.step_engine.lock`.
pub const DEFAULT_STORE_NAME: &str = "step_engine";

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// First sleep between lock attempts; doubles up to 100ms.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Tunables of a file-backed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub store_name: String,
    pub lock_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_name: DEFAULT_STORE_NAME.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StoreConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = name.into();
        self
    }
}

/// The read/update/increment contract every engine process uses.
///
/// `defaults` is the caller's compiled-in schema; it is merged additively
/// into whatever is stored before the operation runs. Each call is one
/// atomic unit: implementations never expose a half-applied change.
pub trait ParameterRepository: Send + Sync {
    /// The whole merged document.
    fn read(&self, defaults: &ParameterDocument) -> Result<ParameterDocument>;

    /// Apply one mutation under the store's exclusion and return the result.
    fn apply(&self, defaults: &ParameterDocument, mutation: Mutation) -> Result<ParameterDocument>;

    /// Persist the defaults if nothing is stored yet, otherwise only add
    /// missing groups/keys. Safe to call at the start of every process.
    fn bootstrap_defaults(&self, defaults: &ParameterDocument) -> Result<ParameterDocument>;

    /// Set `group.key = value`, creating the group if needed.
    fn update(
        &self,
        defaults: &ParameterDocument,
        group: &str,
        key: &str,
        value: Value,
    ) -> Result<ParameterDocument> {
        self.apply(defaults, Mutation::set(group, key, value))
    }

    /// Add or subtract one from `group.key`; an absent value counts as 0.
    fn increment(
        &self,
        defaults: &ParameterDocument,
        group: &str,
        key: &str,
        op: CounterOp,
    ) -> Result<ParameterDocument> {
        self.apply(defaults, Mutation::adjust(group, key, op))
    }

    fn read_group(&self, defaults: &ParameterDocument, group: &str) -> Result<Option<Group>> {
        let mut doc = self.read(defaults)?;
        Ok(doc.take_group(group))
    }

    fn read_key(
        &self,
        defaults: &ParameterDocument,
        group: &str,
        key: &str,
    ) -> Result<Option<Value>> {
        let doc = self.read(defaults)?;
        Ok(doc.get(group, key).cloned())
    }
}
