//! In-process storage provider for ledgerkv, registered under `mem://`.
//!
//! Every backend created by one `MemoryProvider` shares the provider's
//! `MemoryStore`, so two sessions on the same address see each other's
//! commits, locks and change events.

mod backend;
mod store;

use std::sync::Arc;

use ledgerkv_core::{Backend, BackendProvider, Location};

pub use backend::{MemoryBackend, CONFIG_LOAD_EAGER, CONFIG_REFERENCE_TYPES};
pub use store::MemoryStore;

pub const ACCESS_METHOD: &str = "mem";

type AddressFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct MemoryProvider {
    name: String,
    store: MemoryStore,
    filter: Option<AddressFilter>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            name: "memory".to_string(),
            store,
            filter: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restricts the provider to addresses `filter` accepts, so several
    /// memory providers can share the `mem` access method.
    pub fn accepting<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("name", &self.name)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl BackendProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn access_method(&self) -> &str {
        ACCESS_METHOD
    }

    fn partial_book_supported(&self) -> bool {
        true
    }

    fn create_backend(&self) -> Box<dyn Backend> {
        Box::new(MemoryBackend::new(self.store.clone()))
    }

    fn check_data_type(&self, location: &Location) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |accepts| accepts(location.address()))
    }
}
