use crate::backend::SearchBackend;
use crate::config::ConnectionConfig;
use crate::connections::Connections;
use crate::document::{DocumentId, IndexedDocument};
use crate::error::{Result, SheafError};
use crate::record::{Record, RecordType};
use crate::store::RecordSource;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rules for turning records of one type into indexed documents, plus the
/// operations that keep a connection in sync with those records.
///
/// Every operation takes `using`: the connection to act on, or the default
/// connection when `None`. Nothing outside that connection is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Display name; derived from the record type when empty
    #[serde(default)]
    pub name: String,

    pub record_type: RecordType,

    /// Record fields concatenated into the searchable text
    #[serde(default, rename = "text")]
    pub text_fields: Vec<String>,

    /// Record fields copied into the document as-is
    #[serde(default, rename = "stored")]
    pub stored_fields: Vec<String>,
}

/// Connection an operation resolved to
struct Target<'a> {
    name: &'a str,
    config: &'a ConnectionConfig,
    backend: Arc<dyn SearchBackend>,
}

impl IndexDefinition {
    pub fn new(record_type: impl Into<RecordType>) -> Self {
        let mut index = Self {
            name: String::new(),
            record_type: record_type.into(),
            text_fields: Vec::new(),
            stored_fields: Vec::new(),
        };
        index.normalize();
        index
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn text<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn stored<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stored_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Derive the name (`foo` -> `FooIndex`) when none was given
    pub(crate) fn normalize(&mut self) {
        if self.name.is_empty() {
            let mut chars = self.record_type.as_str().chars();
            let head: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
            self.name = format!("{}{}Index", head, chars.as_str());
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.record_type.as_str().is_empty() {
            return Err(SheafError::Configuration(
                "Index definition without a record type".to_string(),
            ));
        }
        if self.text_fields.is_empty() {
            return Err(SheafError::Configuration(format!(
                "Index '{}' declares no text fields",
                self.name
            )));
        }
        Ok(())
    }

    /// Project a record into the document stored by backends
    pub fn prepare(&self, record: &Record) -> Result<IndexedDocument> {
        self.check_type(record)?;

        let text = self
            .text_fields
            .iter()
            .filter_map(|field| record.text(field))
            .collect::<Vec<_>>()
            .join("\n");

        let mut document = IndexedDocument::new(record.record_type.clone(), record.id, text);
        for field in &self.stored_fields {
            if let Some(value) = record.get(field).filter(|v| !v.is_null()) {
                document.fields.insert(field.clone(), value.clone());
            }
        }
        Ok(document)
    }

    /// Records `update` would index for a connection: the source's records of
    /// this type that pass the connection's filter
    pub fn index_queryset(&self, source: &dyn RecordSource, connection: &ConnectionConfig) -> Vec<Record> {
        source
            .records_of(&self.record_type)
            .into_iter()
            .filter(|record| connection.accepts(record))
            .collect()
    }

    /// Upsert the document for one record
    pub fn update_object(&self, connections: &Connections, record: &Record, using: Option<&str>) -> Result<()> {
        let target = self.target(connections, using)?;
        self.check_type(record)?;

        if !target.config.accepts(record) {
            // Filtered out: make sure no stale copy lingers
            tracing::debug!(
                connection = target.name,
                document = %DocumentId::for_record(record),
                "record rejected by connection filter"
            );
            return target.backend.remove(&DocumentId::for_record(record));
        }

        let document = self.prepare(record)?;
        target.backend.update(std::slice::from_ref(&document))?;
        tracing::debug!(connection = target.name, document = %document.id, "updated document");
        Ok(())
    }

    /// Delete the document for one record
    pub fn remove_object(&self, connections: &Connections, record: &Record, using: Option<&str>) -> Result<()> {
        let target = self.target(connections, using)?;
        self.check_type(record)?;

        let id = DocumentId::for_record(record);
        target.backend.remove(&id)?;
        tracing::debug!(connection = target.name, document = %id, "removed document");
        Ok(())
    }

    /// Delete every document of this record type
    pub fn clear(&self, connections: &Connections, using: Option<&str>) -> Result<()> {
        let target = self.target(connections, using)?;
        target
            .backend
            .clear(Some(std::slice::from_ref(&self.record_type)))?;
        tracing::info!(connection = target.name, index = %self.name, "cleared index");
        Ok(())
    }

    /// Index every current record of this type; returns how many were written
    pub fn update(&self, connections: &Connections, source: &dyn RecordSource, using: Option<&str>) -> Result<usize> {
        let target = self.target(connections, using)?;
        let records = self.index_queryset(source, target.config);

        let documents = records
            .par_iter()
            .map(|record| self.prepare(record))
            .collect::<Result<Vec<_>>>()?;

        for batch in documents.chunks(connections.tuning().batch_size) {
            target.backend.update(batch)?;
        }

        tracing::info!(
            connection = target.name,
            index = %self.name,
            indexed = documents.len(),
            "updated index"
        );
        Ok(documents.len())
    }

    /// Clear then update; safe to rerun after a partial failure
    pub fn reindex(&self, connections: &Connections, source: &dyn RecordSource, using: Option<&str>) -> Result<usize> {
        self.clear(connections, using)?;
        self.update(connections, source, using)
    }

    fn target<'a>(&self, connections: &'a Connections, using: Option<&str>) -> Result<Target<'a>> {
        let name = connections.resolve(using)?;
        let unified = connections.get_unified_index(name)?;
        if !unified.handles(&self.record_type) {
            return Err(SheafError::NotHandled {
                record_type: self.record_type.clone(),
                connection: name.to_string(),
            });
        }

        Ok(Target {
            name,
            config: connections.connection(name)?,
            backend: connections.get_backend(name)?,
        })
    }

    fn check_type(&self, record: &Record) -> Result<()> {
        if record.record_type != self.record_type {
            return Err(SheafError::InvalidRecord(format!(
                "{} handles '{}' records, got '{}' #{}",
                self.name, self.record_type, record.record_type, record.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use serde_json::json;

    fn foo_index() -> IndexDefinition {
        IndexDefinition::new("foo").text(["body"]).stored(["title"])
    }

    #[test]
    fn test_derived_name() {
        assert_eq!(IndexDefinition::new("foo").name, "FooIndex");
        assert_eq!(IndexDefinition::new("foo").named("Custom").name, "Custom");
    }

    #[test]
    fn test_prepare_projects_fields() {
        let record = Record::new("foo", 3, fields([("title", "Whee"), ("body", "foo 3")]));
        let document = foo_index().prepare(&record).unwrap();

        assert_eq!(document.id.as_str(), "foo.3");
        assert_eq!(document.text, "foo 3");
        assert_eq!(document.fields.get("title"), Some(&json!("Whee")));
        assert!(document.fields.get("body").is_none());
    }

    #[test]
    fn test_prepare_joins_text_and_skips_missing() {
        let index = IndexDefinition::new("bar").text(["author", "content", "missing"]);
        let record = Record::new("bar", 1, fields([("author", "Haystack test"), ("content", "bar 1")]));
        assert_eq!(index.prepare(&record).unwrap().text, "Haystack test\nbar 1");
    }

    #[test]
    fn test_prepare_rejects_other_type() {
        let record = Record::new("bar", 1, fields([("content", "bar 1")]));
        assert!(matches!(foo_index().prepare(&record), Err(SheafError::InvalidRecord(_))));
    }

    #[test]
    fn test_validate_requires_text() {
        assert!(IndexDefinition::new("foo").validate().is_err());
        assert!(foo_index().validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let index: IndexDefinition = toml::from_str(
            r#"
record_type = "foo"
text = ["body"]
stored = ["title"]
"#,
        )
        .unwrap();
        assert_eq!(index.text_fields, vec!["body"]);
        assert_eq!(index.stored_fields, vec!["title"]);
        assert!(index.name.is_empty());
    }
}
