use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use ledgerkv_core::{BackendError, BackendProvider, Location};
use tracing::debug;

use crate::session::Session;

/// Catalog of storage providers, polled in registration order.
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn BackendProvider>>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
        }
    }

    /// The process-wide registry. Starts empty.
    pub fn global() -> &'static ProviderRegistry {
        static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ProviderRegistry::new)
    }

    pub fn register(&self, provider: Arc<dyn BackendProvider>) {
        debug!(name = provider.name(), access_method = provider.access_method(), "Registering provider");
        let mut lock = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        lock.push(provider);
    }

    pub fn clear(&self) {
        let mut lock = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        lock.clear();
    }

    pub fn providers(&self) -> Vec<Arc<dyn BackendProvider>> {
        let lock = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        lock.clone()
    }

    /// Distinct access methods, in registration order.
    pub fn access_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = Vec::new();
        for provider in self.providers() {
            if !methods.iter().any(|m| m == provider.access_method()) {
                methods.push(provider.access_method().to_string());
            }
        }
        methods
    }

    /// First provider registered for the location's access method whose
    /// `check_data_type` accepts it. Providers are polled over a snapshot,
    /// so a predicate may itself register providers.
    pub fn select(&self, location: &str) -> Result<(Location, Arc<dyn BackendProvider>), BackendError> {
        let location = Location::parse(location)?;
        let provider = self
            .providers()
            .into_iter()
            .filter(|p| p.access_method() == location.access_method())
            .find(|p| p.check_data_type(&location))
            .ok_or_else(|| BackendError::NoHandler(location.to_string()))?;
        debug!(%location, provider = provider.name(), "Selected provider");
        Ok((location, provider))
    }

    /// Selects a provider and wraps a fresh backend from it in an
    /// unconnected session.
    pub fn new_session(&self, location: &str) -> Result<Session, BackendError> {
        let (location, provider) = self.select(location)?;
        Ok(Session::new(location, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkv_memory::MemoryProvider;

    #[test]
    fn test_empty_registry_has_no_handler() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.select("mem://x"), Err(BackendError::NoHandler(_))));
    }

    #[test]
    fn test_bad_location() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new()));
        assert!(matches!(registry.select("no-scheme"), Err(BackendError::BadLocation(_))));
        assert!(matches!(registry.select("://x"), Err(BackendError::BadLocation(_))));
    }

    #[test]
    fn test_access_method_is_case_sensitive() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new()));
        assert!(registry.select("mem://x").is_ok());
        assert!(matches!(registry.select("MEM://x"), Err(BackendError::NoHandler(_))));
    }

    #[test]
    fn test_access_methods_are_deduplicated() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new().named("a")));
        registry.register(Arc::new(MemoryProvider::new().named("b")));
        assert_eq!(registry.access_methods(), vec!["mem".to_string()]);
        assert_eq!(registry.providers().len(), 2);

        registry.clear();
        assert!(registry.providers().is_empty());
    }

    #[test]
    fn test_predicate_may_register_providers() {
        let registry = Arc::new(ProviderRegistry::new());
        let weak = Arc::downgrade(&registry);
        registry.register(Arc::new(MemoryProvider::new().named("lazy").accepting(move |_| {
            if let Some(registry) = weak.upgrade() {
                registry.register(Arc::new(MemoryProvider::new().named("late")));
            }
            false
        })));
        registry.register(Arc::new(MemoryProvider::new().named("fallback")));

        let (_, provider) = registry.select("mem://x").unwrap();
        assert_eq!(provider.name(), "fallback");
        assert_eq!(registry.providers().len(), 3);
    }
}
