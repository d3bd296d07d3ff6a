//! Search backends.
//!
//! A backend is the adapter between one connection and one concrete search
//! engine. The rest of the crate only talks to [`SearchBackend`]; two engines
//! ship with the crate:
//!
//! - [`memory`] - in-process inverted index, lost when the process exits
//! - [`file`] - the same index persisted as a snapshot under the connection's path

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::config::{ConnectionConfig, IndexTuning};
use crate::document::{DocumentId, IndexedDocument};
use crate::error::Result;
use crate::record::{RecordId, RecordType};
use crate::utils::default_connection_dir;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Engines a connection can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => f.pad("memory"),
            BackendKind::File => f.pad("file"),
        }
    }
}

/// Capability set every engine adapter provides, scoped to one connection
pub trait SearchBackend: Send + Sync {
    /// Name of the connection this backend serves
    fn connection_name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Insert or replace documents (keyed by document id)
    fn update(&self, documents: &[IndexedDocument]) -> Result<()>;

    /// Delete one document; deleting an absent document succeeds
    fn remove(&self, id: &DocumentId) -> Result<()>;

    /// Delete every document of the given types, or everything when `None`
    fn clear(&self, models: Option<&[RecordType]>) -> Result<()>;

    /// Run a query string and return the total hit count plus the requested page
    fn search(&self, query_string: &str, options: &SearchOptions) -> Result<SearchResults>;

    /// Number of live documents
    fn document_count(&self) -> Result<usize>;
}

/// Build the backend for a connection
pub fn open_backend(connection: &ConnectionConfig, tuning: &IndexTuning) -> Result<Arc<dyn SearchBackend>> {
    match connection.engine {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(
            &connection.name,
            tuning.compaction_ratio,
        ))),
        BackendKind::File => {
            let dir = match &connection.path {
                Some(path) => path.clone(),
                None => default_connection_dir(&connection.name)?,
            };
            Ok(Arc::new(FileBackend::open(
                &connection.name,
                &dir,
                tuning.compaction_ratio,
            )?))
        }
    }
}

/// Sort key for search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    /// Parse `field` or `-field` (descending)
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: spec.to_string(),
                descending: false,
            },
        }
    }
}

/// Options accompanying a search
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict hits to these record types (empty = all)
    pub models: Vec<RecordType>,
    /// Sort keys, applied in order; relevance when empty
    pub order_by: Vec<OrderBy>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocumentId,
    pub record_type: RecordType,
    pub record_id: RecordId,
    pub text: String,
    pub fields: Map<String, Value>,
    pub score: f32,
}

impl SearchHit {
    pub fn from_document(document: &IndexedDocument, score: f32) -> Self {
        Self {
            id: document.id.clone(),
            record_type: document.record_type.clone(),
            record_id: document.record_id,
            text: document.text.clone(),
            fields: document.fields.clone(),
            score,
        }
    }
}

/// Search outcome: total matches and the returned page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: usize,
    pub results: Vec<SearchHit>,
}

/// Order two documents by one sort key. Missing values sort last.
pub(crate) fn compare_by(a: &IndexedDocument, b: &IndexedDocument, key: &OrderBy) -> Ordering {
    let ordering = match key.field.as_str() {
        "id" | "record_id" => a.record_id.cmp(&b.record_id),
        "text" => a.text.cmp(&b.text),
        "record_type" => a.record_type.cmp(&b.record_type),
        field => compare_values(a.fields.get(field), b.fields.get(field)),
    };
    if key.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: RecordId, rank: Value) -> IndexedDocument {
        let mut doc = IndexedDocument::new(RecordType::from("foo"), id, format!("foo {}", id));
        if !rank.is_null() {
            doc.fields.insert("rank".to_string(), rank);
        }
        doc
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(
            OrderBy::parse("-rank"),
            OrderBy {
                field: "rank".to_string(),
                descending: true
            }
        );
        assert!(!OrderBy::parse("id").descending);
    }

    #[test]
    fn test_compare_by_record_id() {
        let a = doc(1, Value::Null);
        let b = doc(2, Value::Null);
        assert_eq!(compare_by(&a, &b, &OrderBy::parse("id")), Ordering::Less);
        assert_eq!(compare_by(&a, &b, &OrderBy::parse("-id")), Ordering::Greater);
    }

    #[test]
    fn test_compare_by_field_missing_last() {
        let ranked = doc(1, json!(10));
        let lower = doc(2, json!(9.5));
        let unranked = doc(3, Value::Null);
        let key = OrderBy::parse("rank");
        assert_eq!(compare_by(&lower, &ranked, &key), Ordering::Less);
        assert_eq!(compare_by(&ranked, &unranked, &key), Ordering::Less);
    }

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(kind, BackendKind::File);
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }
}
