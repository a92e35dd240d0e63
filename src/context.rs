use crate::binding::{BindingConfig, CacheBinding};
use crate::coordinator::{FetchCoordinator, InFlightStats};
use crate::store::{CacheStats, CacheStore};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// The cache context: entry registry plus fetch coordination, owned by the
/// application and injected into every binding.
///
/// One context per value type `T`. Construct it once and share the
/// [`ContextPointer`]; creating several contexts gives several independent
/// caches, which is occasionally what you want (tests) and usually not
/// (production), so keep a single instance per process for the classic
/// global-cache behavior.
#[derive(Getters)]
#[get = "pub"]
pub struct CacheContext<T> {
    store: CacheStore<T>,
    coordinator: FetchCoordinator<T>,
}

impl<T> CacheContext<T> {
    pub fn new() -> ContextPointer<T> {
        Arc::new(Self {
            store: CacheStore::new(),
            coordinator: FetchCoordinator::new(),
        })
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            cache: self.store.stats(),
            in_flight: self.coordinator.stats(),
        }
    }
}

/// Convenience constructor for a binding against this context.
pub fn create_cache_binding<T>(ctx: &ContextPointer<T>, config: BindingConfig<T>) -> CacheBinding<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    CacheBinding::new(Arc::clone(ctx), config)
}

pub type ContextPointer<T> = Arc<CacheContext<T>>;

/// Combined statistics of the registry and the in-flight map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct ContextStats {
    pub cache: CacheStats,
    pub in_flight: InFlightStats,
}
