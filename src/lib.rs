//! # Sheaf - multi-backend search index routing
//!
//! Sheaf keeps several named search connections in sync with an
//! application's records. Each connection binds a backend engine to the set
//! of record types it indexes; index definitions describe how a record
//! becomes a searchable document; signal processors propagate record
//! changes as they happen.
//!
//! ## Architecture
//!
//! - [`config`] - Connection and index configuration (TOML)
//! - [`connections`] - Registry of lazily-built backends and unified indexes
//! - [`index`] - Index definitions and the per-connection unified index
//! - [`backend`] - Engine adapters (in-memory, file snapshot)
//! - [`signals`] - Realtime propagation of record saves and deletes
//! - [`query`] - Query parsing and the query object
//! - [`store`] - In-process record store with lifecycle hooks
//! - [`utils`] - Tokenizer and app-data paths
//!
//! ## Quick Start
//!
//! ```
//! use sheaf::{
//!     fields, ConnectionConfig, Connections, IndexDefinition, RealtimeSignalProcessor,
//!     RecordStore, SearchQuery, SheafConfig,
//! };
//!
//! let connections = Connections::new(
//!     SheafConfig::new("default")
//!         .with_connection("default", ConnectionConfig::memory())
//!         .with_index(IndexDefinition::new("foo").text(["body"])),
//! )
//! .unwrap();
//!
//! let store = RecordStore::new();
//! let _signals = RealtimeSignalProcessor::attach(connections.clone(), store.hooks()).unwrap();
//!
//! store.create("foo", fields([("body", "hello world")])).unwrap();
//! assert_eq!(SearchQuery::new(connections).filter("hello").count().unwrap(), 1);
//! ```

pub mod backend;
pub mod config;
pub mod connections;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod record;
pub mod signals;
pub mod store;
pub mod utils;

pub use backend::{BackendKind, SearchBackend, SearchHit, SearchOptions, SearchResults};
pub use config::{ConnectionConfig, FilterOp, RecordFilter, SheafConfig};
pub use connections::{ConnectionRouter, Connections};
pub use document::{DocumentId, IndexedDocument};
pub use error::{Result, SheafError};
pub use index::{IndexDefinition, UnifiedIndex};
pub use query::SearchQuery;
pub use record::{fields, Record, RecordId, RecordType};
pub use signals::{BaseSignalProcessor, RealtimeSignalProcessor, SignalProcessor};
pub use store::{EventKind, LifecycleHooks, RecordEvent, RecordSource, RecordStore};
