use std::sync::Arc;

use serde_json::Value;

use crate::engine::types::{CounterOp, Mutation, ParameterDocument};
use crate::storage::{ParameterRepository, Result, StoreError};

/// Async front for step handlers running on tokio.
///
/// Each call runs on the blocking pool, so waiting for the file lock never
/// stalls the runtime's worker threads.
#[derive(Clone)]
pub struct AsyncParameterStore {
    inner: Arc<dyn ParameterRepository>,
    defaults: Arc<ParameterDocument>,
}

impl AsyncParameterStore {
    pub fn new(inner: Arc<dyn ParameterRepository>, defaults: ParameterDocument) -> Self {
        Self {
            inner,
            defaults: Arc::new(defaults),
        }
    }

    pub fn repository(&self) -> Arc<dyn ParameterRepository> {
        self.inner.clone()
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ParameterRepository, &ParameterDocument) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        let defaults = self.defaults.clone();
        match tokio::task::spawn_blocking(move || f(&*inner, &*defaults)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(StoreError::TaskAborted(e.to_string())),
        }
    }

    pub async fn read(&self) -> Result<ParameterDocument> {
        self.run(|store, defaults| store.read(defaults)).await
    }

    pub async fn read_key(&self, group: &str, key: &str) -> Result<Option<Value>> {
        let (group, key) = (group.to_string(), key.to_string());
        self.run(move |store, defaults| store.read_key(defaults, &group, &key))
            .await
    }

    pub async fn apply(&self, mutation: Mutation) -> Result<ParameterDocument> {
        self.run(move |store, defaults| store.apply(defaults, mutation))
            .await
    }

    pub async fn update(&self, group: &str, key: &str, value: Value) -> Result<ParameterDocument> {
        self.apply(Mutation::set(group, key, value)).await
    }

    pub async fn increment(
        &self,
        group: &str,
        key: &str,
        op: CounterOp,
    ) -> Result<ParameterDocument> {
        self.apply(Mutation::adjust(group, key, op)).await
    }

    pub async fn bootstrap_defaults(&self) -> Result<ParameterDocument> {
        self.run(|store, defaults| store.bootstrap_defaults(defaults))
            .await
    }
}
