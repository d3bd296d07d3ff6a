use crate::config::ConnectionConfig;
use crate::error::{Result, SheafError};
use crate::index::IndexDefinition;
use crate::record::RecordType;
use indexmap::IndexMap;
use std::sync::Arc;

/// The set of index definitions one connection serves, keyed by record type.
///
/// Built from the registered definitions minus whatever the connection's
/// include/exclude lists rule out. Definitions are shared between the unified
/// indexes of different connections.
#[derive(Debug, Clone)]
pub struct UnifiedIndex {
    connection: String,
    indexes: IndexMap<RecordType, Arc<IndexDefinition>>,
}

impl UnifiedIndex {
    pub fn build(connection: &ConnectionConfig, registered: &[Arc<IndexDefinition>]) -> Self {
        let indexes = registered
            .iter()
            .filter(|index| connection.admits(&index.record_type))
            .map(|index| (index.record_type.clone(), Arc::clone(index)))
            .collect::<IndexMap<_, _>>();

        tracing::debug!(
            connection = %connection.name,
            handled = indexes.len(),
            skipped = registered.len() - indexes.len(),
            "built unified index"
        );

        Self {
            connection: connection.name.clone(),
            indexes,
        }
    }

    /// Connection this unified index belongs to
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Definition for a record type, or `NotHandled` when this connection skips it
    pub fn get_index(&self, record_type: &RecordType) -> Result<Arc<IndexDefinition>> {
        self.indexes
            .get(record_type)
            .cloned()
            .ok_or_else(|| SheafError::NotHandled {
                record_type: record_type.clone(),
                connection: self.connection.clone(),
            })
    }

    /// All handled definitions, in registration order
    pub fn collect_indexes(&self) -> Vec<Arc<IndexDefinition>> {
        self.indexes.values().cloned().collect()
    }

    pub fn handles(&self, record_type: &RecordType) -> bool {
        self.indexes.contains_key(record_type)
    }

    pub fn indexed_types(&self) -> impl Iterator<Item = &RecordType> {
        self.indexes.keys()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
