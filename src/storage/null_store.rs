use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::types::{Mutation, ParameterDocument};
use crate::storage::{ParameterRepository, Result};

/// In-memory parameter store for exercising step handlers without a filesystem.
/// Same merge and counter semantics as the file store; state lives only as
/// long as the instance.
#[derive(Debug, Default)]
pub struct NullParameterStore {
    document: Mutex<Option<ParameterDocument>>,
}

impl NullParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already populated document.
    pub fn with_document(document: ParameterDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<ParameterDocument>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merged(stored: &Option<ParameterDocument>, defaults: &ParameterDocument) -> ParameterDocument {
    match stored {
        Some(doc) => {
            let mut doc = doc.clone();
            doc.merge_defaults(defaults);
            doc
        }
        None => defaults.clone(),
    }
}

impl ParameterRepository for NullParameterStore {
    fn read(&self, defaults: &ParameterDocument) -> Result<ParameterDocument> {
        Ok(merged(&self.state(), defaults))
    }

    fn apply(&self, defaults: &ParameterDocument, mutation: Mutation) -> Result<ParameterDocument> {
        let mut state = self.state();
        let mut doc = merged(&state, defaults);
        doc.apply(&mutation)?;
        *state = Some(doc.clone());
        Ok(doc)
    }

    fn bootstrap_defaults(&self, defaults: &ParameterDocument) -> Result<ParameterDocument> {
        let mut state = self.state();
        let doc = merged(&state, defaults);
        *state = Some(doc.clone());
        Ok(doc)
    }
}
