//! Name registries for definitions, services and factories.
//!
//! Registries are plain objects so tests and embedders can inject their own;
//! `Registries::global()` is the process-wide instance.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::definition::ExtensionDefinition;
use crate::factory::ExtensionFactory;
use crate::service::ExtensionService;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} named {name:?} already exists")]
    Duplicate { kind: &'static str, name: String },
    #[error("no {kind} named {name:?}")]
    NotFound { kind: &'static str, name: String },
}

/// Name to object map. Registering the same object twice is a no-op; a different
/// object under a taken name is rejected.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: &str, item: Arc<T>) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(name) {
            if Arc::ptr_eq(existing, &item) {
                return Ok(());
            }
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        debug!(kind = self.kind, name, "registered");
        entries.insert(name.to_string(), item);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .write()
            .remove(name)
            .ok_or_else(|| self.not_found(name))
    }

    pub fn unregister_all(&self) {
        self.entries.write().clear();
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn not_found(&self, name: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: self.kind,
            name: name.to_string(),
        }
    }
}

pub struct Registries {
    pub definitions: Registry<ExtensionDefinition>,
    pub services: Registry<ExtensionService>,
    pub factories: Registry<ExtensionFactory>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            definitions: Registry::new("extension definition"),
            services: Registry::new("extension"),
            factories: Registry::new("factory"),
        }
    }

    pub fn global() -> &'static Registries {
        static GLOBAL: OnceLock<Registries> = OnceLock::new();
        GLOBAL.get_or_init(Registries::new)
    }

    /// Forget every registration.
    pub fn clear(&self) {
        self.definitions.unregister_all();
        self.services.unregister_all();
        self.factories.unregister_all();
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}
