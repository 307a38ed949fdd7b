use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use podflow::definition::{DefinitionSource, LoadedDefinition, WorkloadDefinition};
use podflow::errors::{PodflowError, Result};

/// In-memory definition source whose contents tests can swap at will.
#[derive(Debug, Clone, Default)]
pub struct FakeDefinitionSource {
    definitions: Arc<Mutex<Vec<LoadedDefinition>>>,
    stored: Arc<Mutex<Vec<WorkloadDefinition>>>,
}

impl FakeDefinitionSource {
    pub fn new(definitions: Vec<LoadedDefinition>) -> Self {
        Self {
            definitions: Arc::new(Mutex::new(definitions)),
            stored: Arc::default(),
        }
    }

    /// Replace what the next `load()` returns.
    pub fn set(&self, definitions: Vec<LoadedDefinition>) {
        *self.definitions.lock().unwrap() = definitions;
    }

    /// Definitions passed to `store()`.
    pub fn stored(&self) -> Vec<WorkloadDefinition> {
        self.stored.lock().unwrap().clone()
    }
}

impl DefinitionSource for FakeDefinitionSource {
    fn load(&self) -> Result<Vec<LoadedDefinition>> {
        Ok(self.definitions.lock().unwrap().clone())
    }

    fn exists(&self, name: &str) -> bool {
        self.definitions
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.definition.name == name)
            || self.stored.lock().unwrap().iter().any(|d| d.name == name)
    }

    fn store(&self, definition: &WorkloadDefinition) -> Result<PathBuf> {
        if self.exists(&definition.name) {
            return Err(PodflowError::Conflict(definition.name.clone()));
        }
        self.stored.lock().unwrap().push(definition.clone());
        Ok(PathBuf::from(format!("{}.json", definition.name)))
    }
}
