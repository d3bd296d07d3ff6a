//! Connection registry.
//!
//! [`Connections`] owns the validated configuration and lazily builds, then
//! caches, one backend and one unified index per connection name. Handles are
//! shared: asking twice for the same connection returns the same `Arc`.

use crate::backend::{open_backend, SearchBackend};
use crate::config::{ConnectionConfig, IndexTuning, SheafConfig};
use crate::error::{Result, SheafError};
use crate::index::{IndexDefinition, UnifiedIndex};
use crate::query::SearchQuery;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Decides which connections reads and signal-driven writes go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRouter {
    read: String,
    write: Vec<String>,
}

impl ConnectionRouter {
    pub fn new(read: impl Into<String>, write: Vec<String>) -> Self {
        Self {
            read: read.into(),
            write,
        }
    }

    pub fn from_config(config: &SheafConfig) -> Self {
        Self::new(config.default_connection.clone(), config.write_connections())
    }

    /// Connection queries use when none is named
    pub fn for_read(&self) -> &str {
        &self.read
    }

    /// Connections record changes are propagated to
    pub fn for_write(&self) -> &[String] {
        &self.write
    }
}

/// Registry of configured connections
pub struct Connections {
    config: SheafConfig,
    indexes: Vec<Arc<IndexDefinition>>,
    router: ConnectionRouter,
    backends: RwLock<HashMap<String, Arc<dyn SearchBackend>>>,
    unified: RwLock<HashMap<String, Arc<UnifiedIndex>>>,
}

impl fmt::Debug for Connections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connections")
            .field("default", &self.config.default_connection)
            .field("connections", &self.config.connections.keys().collect::<Vec<_>>())
            .field("router", &self.router)
            .finish()
    }
}

impl Connections {
    /// Validate the configuration and build the registry. No backend is
    /// opened until first use.
    pub fn new(mut config: SheafConfig) -> Result<Arc<Self>> {
        config.normalize();
        config.validate()?;

        let indexes = config.indexes.iter().cloned().map(Arc::new).collect();
        let router = ConnectionRouter::from_config(&config);

        tracing::debug!(
            default = %config.default_connection,
            connections = config.connections.len(),
            indexes = config.indexes.len(),
            "connection registry ready"
        );

        Ok(Arc::new(Self {
            config,
            indexes,
            router,
            backends: RwLock::new(HashMap::new()),
            unified: RwLock::new(HashMap::new()),
        }))
    }

    pub fn config(&self) -> &SheafConfig {
        &self.config
    }

    pub fn tuning(&self) -> &IndexTuning {
        &self.config.tuning
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    pub fn default_name(&self) -> &str {
        &self.config.default_connection
    }

    /// Configured connection names, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.config.connections.keys().map(String::as_str)
    }

    /// Registered index definitions, in registration order
    pub fn registered_indexes(&self) -> &[Arc<IndexDefinition>] {
        &self.indexes
    }

    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.config
            .connections
            .get(name)
            .ok_or_else(|| SheafError::unknown_connection(name))
    }

    /// Resolve an optional connection name to a configured one
    pub fn resolve(&self, using: Option<&str>) -> Result<&str> {
        let name = using.unwrap_or(&self.config.default_connection);
        self.config
            .connections
            .get_key_value(name)
            .map(|(key, _)| key.as_str())
            .ok_or_else(|| SheafError::unknown_connection(name))
    }

    /// Backend for a connection, opened on first request
    pub fn get_backend(&self, name: &str) -> Result<Arc<dyn SearchBackend>> {
        if let Some(backend) = self.read_backends()?.get(name) {
            return Ok(Arc::clone(backend));
        }

        let connection = self.connection(name)?;
        let mut backends = self.write_backends()?;
        // Another thread may have opened it while we waited for the lock
        if let Some(backend) = backends.get(name) {
            return Ok(Arc::clone(backend));
        }

        let backend = open_backend(connection, &self.config.tuning)?;
        tracing::info!(connection = name, engine = %connection.engine, "opened backend");
        backends.insert(name.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Unified index for a connection, built on first request
    pub fn get_unified_index(&self, name: &str) -> Result<Arc<UnifiedIndex>> {
        if let Some(unified) = self.read_unified()?.get(name) {
            return Ok(Arc::clone(unified));
        }

        let connection = self.connection(name)?;
        let mut cache = self.write_unified()?;
        let unified = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(UnifiedIndex::build(connection, &self.indexes)));
        Ok(Arc::clone(unified))
    }

    /// Query object bound to a connection
    pub fn get_query(self: &Arc<Self>, name: &str) -> Result<SearchQuery> {
        SearchQuery::new(Arc::clone(self)).using(name)
    }

    /// Drop cached handles for one connection; the next request rebuilds them.
    /// Stored documents of persistent backends are kept.
    pub fn reset(&self, name: &str) -> Result<()> {
        self.connection(name)?;
        self.write_backends()?.remove(name);
        self.write_unified()?.remove(name);
        tracing::debug!(connection = name, "reset connection handles");
        Ok(())
    }

    /// Drop every cached handle
    pub fn reset_all(&self) -> Result<()> {
        self.write_backends()?.clear();
        self.write_unified()?.clear();
        Ok(())
    }

    fn read_backends(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<dyn SearchBackend>>>> {
        self.backends.read().map_err(|_| poisoned("backends"))
    }

    fn write_backends(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<dyn SearchBackend>>>> {
        self.backends.write().map_err(|_| poisoned("backends"))
    }

    fn read_unified(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<UnifiedIndex>>>> {
        self.unified.read().map_err(|_| poisoned("unified indexes"))
    }

    fn write_unified(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<UnifiedIndex>>>> {
        self.unified.write().map_err(|_| poisoned("unified indexes"))
    }
}

fn poisoned(what: &str) -> SheafError {
    SheafError::Configuration(format!("Connection registry {} lock poisoned", what))
}
