//! Binding registry from wrapped callables to their cache managers.

use crate::config::CacheConfig;
use crate::manager::CacheManager;
use cellcache_core::{CallableId, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Maps callables to managers and pools managers by configuration, so that
/// wrappers sharing a configuration share one manager.
#[derive(Default)]
pub struct BindingRegistry {
    bindings: DashMap<CallableId, Arc<CacheManager>>,
    managers: DashMap<CacheConfig, Arc<CacheManager>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static BindingRegistry {
        static GLOBAL: OnceLock<BindingRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BindingRegistry::new)
    }

    /// Bind a callable to a manager, replacing any previous binding.
    pub fn bind(&self, id: CallableId, manager: Arc<CacheManager>) {
        debug!(callable = %id, "Binding cache manager");
        self.bindings.insert(id, manager);
    }

    /// Manager bound to a callable.
    pub fn lookup(&self, id: CallableId) -> Option<Arc<CacheManager>> {
        self.bindings.get(&id).map(|m| Arc::clone(m.value()))
    }

    /// Pooled manager for a configuration, constructed on first use.
    ///
    /// A degraded construction still yields a (local-only) manager; the
    /// warning has already been logged by the manager.
    pub fn manager_for(&self, config: &CacheConfig) -> Result<Arc<CacheManager>> {
        match self.managers.entry(config.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let manager = Arc::new(CacheManager::open(config.clone())?.into_manager());
                entry.insert(Arc::clone(&manager));
                Ok(manager)
            }
        }
    }

    /// Number of bound callables.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
