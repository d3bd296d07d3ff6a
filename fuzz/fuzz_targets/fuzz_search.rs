#![no_main]

use libfuzzer_sys::fuzz_target;
use sheaf::{fields, ConnectionConfig, Connections, IndexDefinition, Record, SearchQuery, SheafConfig};
use std::sync::{Arc, OnceLock};

static CONNECTIONS: OnceLock<Arc<Connections>> = OnceLock::new();

fn connections() -> &'static Arc<Connections> {
    CONNECTIONS.get_or_init(|| {
        let connections = Connections::new(
            SheafConfig::new("default")
                .with_connection("default", ConnectionConfig::memory())
                .with_index(IndexDefinition::new("foo").text(["body"])),
        )
        .unwrap();
        let records = vec![
            Record::new("foo", 1, fields([("body", "foo 1 haystack")])),
            Record::new("foo", 2, fields([("body", "Another Haystack test, foo 2")])),
        ];
        connections.registered_indexes()[0]
            .update(&connections, &records, None)
            .unwrap();
        connections
    })
}

fuzz_target!(|data: &str| {
    // Evaluating any query string against a live index must not panic
    let query = SearchQuery::new(Arc::clone(connections())).filter(data);
    let _ = query.count();
});
