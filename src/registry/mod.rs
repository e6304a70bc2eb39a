//! Client registry: logical connection name → initialized client.
//!
//! # Responsibilities
//! - Lazily construct one client (plus pool) per configured name
//! - Probe reachability exactly once, on first use
//! - Serialize concurrent first-use so at most one instance is ever built
//! - Retain clients for the process lifetime; no eviction
//!
//! A failed probe is returned to the caller as a typed error and nothing is
//! cached, so a later call may retry construction; a half-initialized client
//! is never observable.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::cache::{CacheClient, CacheError};
use crate::config::DatabusConfig;
use crate::search::{SearchClient, SearchError};

/// Errors from registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The config file has no section for this logical name.
    #[error("no config for cache connection {0:?}")]
    UnknownCache(String),

    /// The config file has no section for this logical name.
    #[error("no config for search connection {0:?}")]
    UnknownSearch(String),

    /// First-use reachability probe failed.
    #[error("cache probe failed for {name:?}: {source}")]
    CacheProbe {
        name: String,
        #[source]
        source: CacheError,
    },

    /// First-use reachability probe failed.
    #[error("search probe failed for {name:?}: {source}")]
    SearchProbe {
        name: String,
        #[source]
        source: SearchError,
    },
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Process-wide client cache.
pub struct Registry {
    config: DatabusConfig,
    caches: DashMap<String, Slot<CacheClient>>,
    searches: DashMap<String, Slot<SearchClient>>,
}

impl Registry {
    pub fn new(config: DatabusConfig) -> Self {
        Self {
            config,
            caches: DashMap::new(),
            searches: DashMap::new(),
        }
    }

    /// Cache client for a logical name, constructing and probing on first
    /// use.
    pub async fn cache(&self, name: &str) -> Result<Arc<CacheClient>, RegistryError> {
        let Some(config) = self.config.cache.get(name) else {
            return Err(RegistryError::UnknownCache(name.to_string()));
        };

        let cell = self.slot(&self.caches, name);
        cell.get_or_try_init(|| async {
            let client = Arc::new(CacheClient::new(name, config.clone()));
            client
                .probe()
                .await
                .map_err(|source| RegistryError::CacheProbe {
                    name: name.to_string(),
                    source,
                })?;
            tracing::info!(name, backend = %config.address(), "cache connection ready");
            Ok(client)
        })
        .await
        .cloned()
    }

    /// Search client for a logical name, constructing and probing on first
    /// use.
    pub async fn search(&self, name: &str) -> Result<Arc<SearchClient>, RegistryError> {
        let Some(config) = self.config.search.get(name) else {
            return Err(RegistryError::UnknownSearch(name.to_string()));
        };

        let cell = self.slot(&self.searches, name);
        cell.get_or_try_init(|| async {
            let client = SearchClient::new(name, config.clone())
                .map(Arc::new)
                .map_err(|source| RegistryError::SearchProbe {
                    name: name.to_string(),
                    source,
                })?;
            client
                .probe()
                .await
                .map_err(|source| RegistryError::SearchProbe {
                    name: name.to_string(),
                    source,
                })?;
            Ok(client)
        })
        .await
        .cloned()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &DatabusConfig {
        &self.config
    }

    // One once-cell per name; the map guard is dropped before any await.
    fn slot<T>(&self, map: &DashMap<String, Slot<T>>, name: &str) -> Slot<T> {
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("caches", &self.caches.len())
            .field("searches", &self.searches.len())
            .finish()
    }
}
