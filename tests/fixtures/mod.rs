#![allow(dead_code)]

use sheaf::{
    fields, ConnectionConfig, Connections, FilterOp, IndexDefinition, Record, RecordFilter, RecordStore,
    RecordType, SearchQuery, SheafConfig,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Three connections over two record types:
/// - `default` (memory) handles foo and bar
/// - `whoosh` (file) handles foo only
/// - `filtered_whoosh` (file) handles foo records whose body contains "1"
pub fn config(dir: &Path) -> SheafConfig {
    SheafConfig::new("default")
        .with_connection("default", ConnectionConfig::memory())
        .with_connection(
            "whoosh",
            ConnectionConfig::file(dir.join("whoosh_index")).exclude(["bar"]),
        )
        .with_connection(
            "filtered_whoosh",
            ConnectionConfig::file(dir.join("filtered_whoosh_index"))
                .exclude(["bar"])
                .with_filter(RecordFilter::new("body", FilterOp::Contains, "1").for_types(["foo"])),
        )
        .with_index(IndexDefinition::new("foo").text(["body"]).stored(["title"]))
        .with_index(IndexDefinition::new("bar").text(["content"]).stored(["author"]))
}

pub struct Fixture {
    pub connections: Arc<Connections>,
    pub store: RecordStore,
    pub foo_index: Arc<IndexDefinition>,
    pub bar_index: Arc<IndexDefinition>,
    // Keeps the file connections' directories alive for the test
    _dir: TempDir,
}

impl Fixture {
    pub fn query(&self) -> SearchQuery {
        SearchQuery::new(Arc::clone(&self.connections))
    }

    /// Hit count of a raw backend search
    pub fn hits(&self, connection: &str, query: &str) -> usize {
        self.connections
            .get_backend(connection)
            .unwrap()
            .search(query, &Default::default())
            .unwrap()
            .hits
    }

    /// Text of the lowest-id foo document on a connection
    pub fn first_foo_text(&self, connection: &str) -> String {
        self.query()
            .using(connection)
            .unwrap()
            .models(["foo"])
            .order_by("id")
            .first()
            .unwrap()
            .unwrap()
            .text
    }

    pub fn foo(&self, id: u64) -> Record {
        self.store.get(&RecordType::from("foo"), id).unwrap()
    }
}

/// Two foo and three bar records, foo indexed on default and whoosh,
/// bar indexed on default
pub fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let connections = Connections::new(config(dir.path())).unwrap();
    let store = RecordStore::new();

    store
        .create("foo", fields([("title", "Haystack test"), ("body", "foo 1")]))
        .unwrap();
    store
        .create("foo", fields([("title", "Another Haystack test"), ("body", "foo 2")]))
        .unwrap();
    store
        .create("bar", fields([("author", "Haystack test"), ("content", "bar 1")]))
        .unwrap();
    store
        .create("bar", fields([("author", "Another Haystack test"), ("content", "bar 2")]))
        .unwrap();
    store
        .create("bar", fields([("author", "Yet another Haystack test"), ("content", "bar 3")]))
        .unwrap();

    let unified = connections.get_unified_index("default").unwrap();
    let foo_index = unified.get_index(&"foo".into()).unwrap();
    let bar_index = unified.get_index(&"bar".into()).unwrap();

    foo_index.reindex(&connections, &store, Some("default")).unwrap();
    foo_index.reindex(&connections, &store, Some("whoosh")).unwrap();
    bar_index.reindex(&connections, &store, Some("default")).unwrap();

    Fixture {
        connections,
        store,
        foo_index,
        bar_index,
        _dir: dir,
    }
}
