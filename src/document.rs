use crate::record::{Record, RecordId, RecordType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of an indexed document, unique per connection: `<record_type>.<record_id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(record_type: &RecordType, record_id: RecordId) -> Self {
        Self(format!("{}.{}", record_type, record_id))
    }

    pub fn for_record(record: &Record) -> Self {
        Self::new(&record.record_type, record.id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Projection of a record as stored in one connection's backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub record_type: RecordType,
    pub record_id: RecordId,
    /// Searchable text
    pub text: String,
    /// Stored (returned, sortable) fields
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IndexedDocument {
    pub fn new(record_type: RecordType, record_id: RecordId, text: String) -> Self {
        Self {
            id: DocumentId::new(&record_type, record_id),
            record_type,
            record_id,
            text,
            fields: Map::new(),
        }
    }
}
