//! Connection configuration.
//!
//! A [`SheafConfig`] maps connection names to backend settings and lists the
//! index definitions known to the process. It is loaded once (file, then
//! environment overrides) and treated as read-only afterwards.
//!
//! ```toml
//! default_connection = "default"
//!
//! [routing]
//! write = ["default"]
//!
//! [connections.default]
//! engine = "memory"
//!
//! [connections.whoosh]
//! engine = "file"
//! path = "/var/lib/sheaf/whoosh"
//! exclude = ["bar"]
//!
//! [[indexes]]
//! record_type = "foo"
//! text = ["body"]
//! stored = ["title"]
//! ```

use crate::backend::BackendKind;
use crate::error::{Result, SheafError};
use crate::index::IndexDefinition;
use crate::record::{value_as_text, Record, RecordType};
use crate::utils::get_config_path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name used when a configuration does not choose its default connection
pub const DEFAULT_CONNECTION: &str = "default";

/// Number of documents sent to a backend per `update` call
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Share of tombstoned slots that triggers compaction of a memory index
pub const DEFAULT_COMPACTION_RATIO: f32 = 0.5;

/// Wildcard accepted in `routing.write`
pub const ALL_CONNECTIONS: &str = "*";

/// Process-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheafConfig {
    /// Connection used when an operation names none
    #[serde(default = "default_connection_name")]
    pub default_connection: String,

    /// Where signal-driven writes go
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Named connections, in declaration order
    #[serde(default)]
    pub connections: IndexMap<String, ConnectionConfig>,

    /// Registered index definitions, in registration order
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,

    #[serde(default)]
    pub tuning: IndexTuning,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION.to_string()
}

impl Default for SheafConfig {
    fn default() -> Self {
        let mut config = Self {
            default_connection: default_connection_name(),
            routing: RoutingConfig::default(),
            connections: IndexMap::new(),
            indexes: Vec::new(),
            tuning: IndexTuning::default(),
        };
        config.normalize();
        config
    }
}

/// Routing section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Connections receiving signal-driven writes; empty means the default connection
    #[serde(default)]
    pub write: Vec<String>,
}

/// Settings for one connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Filled from the table key
    #[serde(skip)]
    pub name: String,

    #[serde(default)]
    pub engine: BackendKind,

    /// Storage location for backends that persist
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Record types admitted; empty admits every registered type
    #[serde(default)]
    pub include: Vec<RecordType>,

    /// Record types refused even if registered
    #[serde(default)]
    pub exclude: Vec<RecordType>,

    /// Write-time filter on individual records
    #[serde(default)]
    pub filter: Option<RecordFilter>,
}

impl ConnectionConfig {
    pub fn new(engine: BackendKind) -> Self {
        Self {
            name: String::new(),
            engine,
            path: None,
            include: Vec::new(),
            exclude: Vec::new(),
            filter: None,
        }
    }

    pub fn memory() -> Self {
        Self::new(BackendKind::Memory)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(BackendKind::File);
        config.path = Some(path.into());
        config
    }

    pub fn include<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        self.include.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        self.exclude.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether this connection indexes the given record type at all
    pub fn admits(&self, record_type: &RecordType) -> bool {
        (self.include.is_empty() || self.include.contains(record_type))
            && !self.exclude.contains(record_type)
    }

    /// Whether an individual record may be written to this connection
    pub fn accepts(&self, record: &Record) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(record))
    }
}

/// Comparison applied by a [`RecordFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[default]
    Equals,
    NotEquals,
    Contains,
    Exists,
}

/// Predicate deciding which records a connection stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Record types the filter applies to; others always pass. Empty means all.
    #[serde(default)]
    pub record_types: Vec<RecordType>,
    pub field: String,
    #[serde(default)]
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

impl RecordFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            record_types: Vec::new(),
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn for_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        self.record_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.record_types.is_empty() && !self.record_types.contains(&record.record_type) {
            return true;
        }

        let field = record.get(&self.field).filter(|v| !v.is_null());
        match self.op {
            FilterOp::Exists => field.is_some(),
            FilterOp::Equals => field.is_some_and(|v| self.equals(v)),
            FilterOp::NotEquals => !field.is_some_and(|v| self.equals(v)),
            FilterOp::Contains => field.is_some_and(|v| self.contains(v)),
        }
    }

    fn equals(&self, field: &Value) -> bool {
        field == &self.value || value_as_text(field) == value_as_text(&self.value)
    }

    fn contains(&self, field: &Value) -> bool {
        let Some(needle) = value_as_text(&self.value) else {
            return false;
        };
        match field {
            Value::Array(items) => items
                .iter()
                .any(|item| value_as_text(item).as_deref() == Some(needle.as_str())),
            other => value_as_text(other).is_some_and(|text| text.contains(&needle)),
        }
    }
}

/// Indexing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexTuning {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_compaction_ratio")]
    pub compaction_ratio: f32,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_compaction_ratio() -> f32 {
    DEFAULT_COMPACTION_RATIO
}

impl Default for IndexTuning {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            compaction_ratio: default_compaction_ratio(),
        }
    }
}

impl SheafConfig {
    /// Start an empty configuration whose default connection is `default_connection`
    pub fn new(default_connection: impl Into<String>) -> Self {
        Self {
            default_connection: default_connection.into(),
            routing: RoutingConfig::default(),
            connections: IndexMap::new(),
            indexes: Vec::new(),
            tuning: IndexTuning::default(),
        }
    }

    pub fn with_connection(mut self, name: impl Into<String>, mut connection: ConnectionConfig) -> Self {
        let name = name.into();
        connection.name = name.clone();
        self.connections.insert(name, connection);
        self
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_write_routing<I, S>(mut self, connections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routing.write = connections.into_iter().map(Into::into).collect();
        self
    }

    /// Load config with priority: explicit path > `SHEAF_CONFIG` > app data dir > defaults.
    /// `SHEAF_DEFAULT_CONNECTION` overrides the default connection afterwards.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os("SHEAF_CONFIG")
                .map(PathBuf::from)
                .or_else(|| get_config_path().ok().filter(|p| p.exists())),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(name) = std::env::var("SHEAF_DEFAULT_CONNECTION") {
            if !name.is_empty() {
                config.default_connection = name;
                config.normalize();
            }
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SheafError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: SheafConfig = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Fill derived fields: connection names, index names, the implicit default connection
    pub fn normalize(&mut self) {
        if self.connections.is_empty() {
            self.connections
                .insert(self.default_connection.clone(), ConnectionConfig::memory());
        }
        for (name, connection) in self.connections.iter_mut() {
            connection.name = name.clone();
        }
        for index in &mut self.indexes {
            index.normalize();
        }
    }

    /// Check every cross reference; called before any connection is built
    pub fn validate(&self) -> Result<()> {
        if self.connections.is_empty() {
            return Err(SheafError::Configuration("No connections configured".to_string()));
        }
        if !self.connections.contains_key(&self.default_connection) {
            return Err(SheafError::Configuration(format!(
                "Default connection '{}' is not configured",
                self.default_connection
            )));
        }

        for name in &self.routing.write {
            if name != ALL_CONNECTIONS && !self.connections.contains_key(name) {
                return Err(SheafError::Configuration(format!(
                    "Write routing names unknown connection '{}'",
                    name
                )));
            }
        }

        let mut registered = HashSet::new();
        for index in &self.indexes {
            index.validate()?;
            if !registered.insert(&index.record_type) {
                return Err(SheafError::Configuration(format!(
                    "Record type '{}' is registered by more than one index",
                    index.record_type
                )));
            }
        }

        for (name, connection) in &self.connections {
            let referenced = connection
                .include
                .iter()
                .chain(&connection.exclude)
                .chain(connection.filter.iter().flat_map(|f| &f.record_types));
            for record_type in referenced {
                if !registered.contains(record_type) {
                    return Err(SheafError::Configuration(format!(
                        "Connection '{}' references unregistered record type '{}'",
                        name, record_type
                    )));
                }
            }
            if let Some(filter) = &connection.filter {
                if filter.field.is_empty() {
                    return Err(SheafError::Configuration(format!(
                        "Connection '{}' has a filter without a field",
                        name
                    )));
                }
            }
        }

        if self.tuning.batch_size == 0 {
            return Err(SheafError::Configuration("tuning.batch_size must be positive".to_string()));
        }
        if !(self.tuning.compaction_ratio > 0.0 && self.tuning.compaction_ratio <= 1.0) {
            return Err(SheafError::Configuration(
                "tuning.compaction_ratio must be in (0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Connections receiving signal-driven writes, wildcard expanded
    pub fn write_connections(&self) -> Vec<String> {
        if self.routing.write.is_empty() {
            return vec![self.default_connection.clone()];
        }
        if self.routing.write.iter().any(|n| n == ALL_CONNECTIONS) {
            return self.connections.keys().cloned().collect();
        }
        let mut seen = HashSet::new();
        self.routing
            .write
            .iter()
            .filter(|n| seen.insert(n.as_str()))
            .cloned()
            .collect()
    }
}
