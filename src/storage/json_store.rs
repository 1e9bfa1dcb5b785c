use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::engine::types::{Mutation, ParameterDocument};
use crate::storage::codec::{self, Loaded};
use crate::storage::lock::{self, LockGuard};
use crate::storage::{ParameterRepository, Result, StoreConfig};

/// File-backed parameter store for one engine instance.
///
/// Holds nothing but the document path, its lock path and the lock tunables;
/// every call re-reads the file under the lock, so any number of processes
/// can share one instance directory.
#[derive(Debug, Clone)]
pub struct JsonParameterStore {
    document_path: PathBuf,
    lock_path: PathBuf,
    config: StoreConfig,
}

impl JsonParameterStore {
    /// Store at `<instance_dir>/.<store_name>.json`.
    pub fn open(instance_dir: impl AsRef<Path>, config: StoreConfig) -> Self {
        let document_path = instance_dir
            .as_ref()
            .join(format!(".{}.json", config.store_name));
        Self::at_path(document_path, config)
    }

    /// Store at an explicit document path; the lock sits next to it.
    pub fn at_path(document_path: impl Into<PathBuf>, config: StoreConfig) -> Self {
        let document_path = document_path.into();
        Self {
            lock_path: lock::lock_path_for(&document_path),
            document_path,
            config,
        }
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<LockGuard> {
        lock::acquire(
            &self.lock_path,
            self.config.lock_timeout,
            self.config.poll_interval,
        )
    }

    fn load(&self, defaults: &ParameterDocument) -> Result<Loaded> {
        codec::load(&self.document_path, defaults)
    }
}

impl ParameterRepository for JsonParameterStore {
    fn read(&self, defaults: &ParameterDocument) -> Result<ParameterDocument> {
        let _lock = self.lock()?;
        let loaded = self.load(defaults)?;
        debug!(path = %self.document_path.display(), existed = loaded.existed, "parameters read");
        Ok(loaded.document)
    }

    fn apply(&self, defaults: &ParameterDocument, mutation: Mutation) -> Result<ParameterDocument> {
        let lock = self.lock()?;
        let Loaded {
            mut document,
            added,
            ..
        } = self.load(defaults)?;

        document.apply(&mutation)?;
        codec::store(&self.document_path, &document)?;
        if added > 0 {
            info!(
                path = %self.document_path.display(),
                added,
                "merged defaults into parameter document"
            );
        }

        debug!(
            path = %self.document_path.display(),
            group = mutation.group(),
            key = mutation.key(),
            held_ms = lock.held_for().as_millis() as u64,
            "parameter updated"
        );
        Ok(document)
    }

    fn bootstrap_defaults(&self, defaults: &ParameterDocument) -> Result<ParameterDocument> {
        let _lock = self.lock()?;
        let loaded = self.load(defaults)?;

        if loaded.needs_write() {
            codec::store(&self.document_path, &loaded.document)?;
            if loaded.existed {
                info!(
                    path = %self.document_path.display(),
                    added = loaded.added,
                    "merged defaults into parameter document"
                );
            } else {
                info!(path = %self.document_path.display(), "bootstrapped parameter document");
            }
        }
        Ok(loaded.document)
    }
}
