//! Time-boxed registry cache shared between threads.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::catalog::Registry;
use super::resolver::ResourceResolver;
use crate::error::Result;

/// Default time a loaded catalog stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Produces a freshly loaded registry.
pub trait CatalogLoader: Send + Sync {
    fn load(&self) -> Result<Registry>;
}

/// Loads the catalog index through a resource resolver.
pub struct IndexLoader {
    resolver: Arc<dyn ResourceResolver>,
    index_ref: PathBuf,
}

impl IndexLoader {
    pub fn new(resolver: Arc<dyn ResourceResolver>, index_ref: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            index_ref: index_ref.into(),
        }
    }
}

impl CatalogLoader for IndexLoader {
    fn load(&self) -> Result<Registry> {
        Registry::load(Arc::clone(&self.resolver), &self.index_ref)
    }
}

struct Cached {
    registry: Arc<Registry>,
    loaded_at: Instant,
}

/// Registry cache with a fixed TTL.
///
/// Readers either get the current catalog or block on the write lock while a
/// single reload runs; they never observe a partially loaded catalog.
pub struct RegistryCache {
    loader: Box<dyn CatalogLoader>,
    ttl: Duration,
    state: RwLock<Option<Cached>>,
}

impl std::fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RegistryCache {
    pub fn new(loader: impl CatalogLoader + 'static) -> Self {
        Self::with_ttl(loader, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(loader: impl CatalogLoader + 'static, ttl: Duration) -> Self {
        Self {
            loader: Box::new(loader),
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Return the cached registry, reloading it when missing or expired.
    pub fn get(&self) -> Result<Arc<Registry>> {
        {
            let state = self
                .state
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(fresh) = self.fresh(&state) {
                return Ok(fresh);
            }
        }

        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have reloaded while we waited for the lock.
        if let Some(fresh) = self.fresh(&state) {
            return Ok(fresh);
        }

        tracing::debug!("registry cache expired, reloading catalog");
        // On failure the previous entry is left untouched.
        let registry = Arc::new(self.loader.load()?);
        *state = Some(Cached {
            registry: Arc::clone(&registry),
            loaded_at: Instant::now(),
        });
        Ok(registry)
    }

    /// Drop the cached catalog so the next `get` reloads it.
    pub fn invalidate(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = None;
    }

    fn fresh(&self, state: &Option<Cached>) -> Option<Arc<Registry>> {
        state
            .as_ref()
            .filter(|cached| cached.loaded_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.registry))
    }
}
