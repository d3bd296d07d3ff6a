use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable identifier of a record within its type
pub type RecordId = u64;

/// Name of an application record type (e.g. `foo`, `bar`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for RecordType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// An application entity owned by the host data store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: RecordType,
    pub id: RecordId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(record_type: impl Into<RecordType>, id: RecordId, fields: Map<String, Value>) -> Self {
        Self {
            record_type: record_type.into(),
            id,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Render a field as plain text. Null and missing fields yield None.
    pub fn text(&self, field: &str) -> Option<String> {
        value_as_text(self.fields.get(field)?)
    }
}

pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Build a field map from `(name, value)` pairs
pub fn fields<I, K, V>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_text() {
        let mut record = Record::new("foo", 1, fields([("title", "Haystack test"), ("body", "foo 1")]));
        record.set("views", 12);
        record.set("draft", Value::Null);

        assert_eq!(record.text("body").as_deref(), Some("foo 1"));
        assert_eq!(record.text("views").as_deref(), Some("12"));
        assert_eq!(record.text("draft"), None);
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn test_record_type_serializes_as_string() {
        let record = Record::new("bar", 3, Map::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"record_type": "bar", "id": 3, "fields": {}}));
    }
}
