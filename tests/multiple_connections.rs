//! Index lifecycle operations scoped to one connection at a time.

mod fixtures;

use sheaf::{fields, SheafError};

#[test]
fn test_index_update_object_using() {
    let fx = fixtures::setup();
    assert_eq!(fx.hits("default", "foo"), 2);
    assert_eq!(fx.hits("whoosh", "foo"), 2);

    let foo_3 = fx
        .store
        .create("foo", fields([("title", "Whee another Haystack test"), ("body", "foo 3")]))
        .unwrap();

    fx.foo_index.update_object(&fx.connections, &foo_3, None).unwrap();
    assert_eq!(fx.hits("default", "foo"), 3);
    assert_eq!(fx.hits("whoosh", "foo"), 2);

    fx.foo_index
        .update_object(&fx.connections, &foo_3, Some("whoosh"))
        .unwrap();
    assert_eq!(fx.hits("default", "foo"), 3);
    assert_eq!(fx.hits("whoosh", "foo"), 3);
}

#[test]
fn test_index_remove_object_using() {
    let fx = fixtures::setup();
    let foo_1 = fx.foo(1);

    fx.foo_index.remove_object(&fx.connections, &foo_1, None).unwrap();
    assert_eq!(fx.hits("default", "foo"), 1);
    assert_eq!(fx.hits("whoosh", "foo"), 2);

    fx.foo_index
        .remove_object(&fx.connections, &foo_1, Some("whoosh"))
        .unwrap();
    assert_eq!(fx.hits("default", "foo"), 1);
    assert_eq!(fx.hits("whoosh", "foo"), 1);

    // Removing again is not an error
    fx.foo_index
        .remove_object(&fx.connections, &foo_1, Some("whoosh"))
        .unwrap();
}

#[test]
fn test_index_clear_using() {
    let fx = fixtures::setup();

    fx.foo_index.clear(&fx.connections, None).unwrap();
    assert_eq!(fx.hits("default", "foo"), 0);
    assert_eq!(fx.hits("whoosh", "foo"), 2);
    // Other types on the same connection are untouched
    assert_eq!(fx.query().models(["bar"]).count().unwrap(), 3);

    fx.foo_index.clear(&fx.connections, Some("whoosh")).unwrap();
    assert_eq!(fx.hits("default", "foo"), 0);
    assert_eq!(fx.hits("whoosh", "foo"), 0);
}

#[test]
fn test_index_update_using() {
    let fx = fixtures::setup();
    fx.foo_index.clear(&fx.connections, None).unwrap();
    fx.foo_index.clear(&fx.connections, Some("whoosh")).unwrap();
    fx.bar_index.clear(&fx.connections, None).unwrap();
    assert_eq!(fx.hits("default", "foo"), 0);
    assert_eq!(fx.hits("whoosh", "foo"), 0);

    assert_eq!(fx.foo_index.update(&fx.connections, &fx.store, None).unwrap(), 2);
    assert_eq!(fx.hits("default", "foo"), 2);
    assert_eq!(fx.hits("whoosh", "foo"), 0);

    fx.foo_index
        .update(&fx.connections, &fx.store, Some("whoosh"))
        .unwrap();
    assert_eq!(fx.hits("default", "foo"), 2);
    assert_eq!(fx.hits("whoosh", "foo"), 2);
}

#[test]
fn test_bar_not_handled_by_whoosh() {
    let fx = fixtures::setup();
    let err = fx.bar_index.clear(&fx.connections, Some("whoosh")).unwrap_err();
    assert!(matches!(err, SheafError::NotHandled { ref connection, .. } if connection == "whoosh"));

    let err = fx
        .bar_index
        .update(&fx.connections, &fx.store, Some("whoosh"))
        .unwrap_err();
    assert!(matches!(err, SheafError::NotHandled { .. }));
}

#[test]
fn test_unknown_connection_is_configuration_error() {
    let fx = fixtures::setup();
    let err = fx.foo_index.clear(&fx.connections, Some("solr")).unwrap_err();
    assert!(matches!(err, SheafError::Configuration(_)));
}

#[test]
fn test_searchqueryset_using() {
    let fx = fixtures::setup();
    let sqs = fx.query();
    assert_eq!(sqs.count().unwrap(), 5);
    assert_eq!(sqs.models(["foo"]).count().unwrap(), 2);
    assert_eq!(sqs.models(["bar"]).count().unwrap(), 3);

    let default = sqs.using("default").unwrap();
    assert_eq!(default.count().unwrap(), 5);
    assert_eq!(default.models(["foo"]).count().unwrap(), 2);
    assert_eq!(default.models(["bar"]).count().unwrap(), 3);

    let whoosh = sqs.using("whoosh").unwrap();
    assert_eq!(whoosh.count().unwrap(), 2);
    assert_eq!(whoosh.models(["foo"]).count().unwrap(), 2);
    assert_eq!(whoosh.models(["bar"]).count().unwrap(), 0);
}

#[test]
fn test_searchquery_using() {
    let fx = fixtures::setup();
    let sq = fx.connections.get_query("default").unwrap();
    assert_eq!(sq.get_count().unwrap(), 5);

    let sq = sq.using("default").unwrap();
    assert_eq!(sq.get_count().unwrap(), 5);

    let sq = sq.using("whoosh").unwrap();
    assert_eq!(sq.get_count().unwrap(), 2);
}

#[test]
fn test_excluded_indexes() {
    let fx = fixtures::setup();
    let wui = fx.connections.get_unified_index("whoosh").unwrap();

    let indexes = wui.collect_indexes();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "FooIndex");

    assert!(wui.get_index(&"foo".into()).is_ok());
    assert!(matches!(
        wui.get_index(&"bar".into()),
        Err(SheafError::NotHandled { .. })
    ));
}

#[test]
fn test_filtered_index_update() {
    let fx = fixtures::setup();
    for name in ["whoosh", "filtered_whoosh"] {
        fx.foo_index.clear(&fx.connections, Some(name)).unwrap();
        fx.foo_index.update(&fx.connections, &fx.store, Some(name)).unwrap();
    }

    assert_eq!(fx.hits("whoosh", "foo"), 2);
    assert_eq!(
        fx.hits("filtered_whoosh", "foo"),
        1,
        "Filtered backend should only contain one record"
    );
}

#[test]
fn test_filtered_update_object_drops_stale_document() {
    let fx = fixtures::setup();
    fx.foo_index
        .update(&fx.connections, &fx.store, Some("filtered_whoosh"))
        .unwrap();
    assert_eq!(fx.hits("filtered_whoosh", "foo"), 1);

    let mut foo_1 = fx.foo(1);
    foo_1.set("body", "foo without the digit");
    fx.foo_index
        .update_object(&fx.connections, &foo_1, Some("filtered_whoosh"))
        .unwrap();
    assert_eq!(fx.hits("filtered_whoosh", "foo"), 0);
}

#[test]
fn test_file_connection_survives_reset() {
    let fx = fixtures::setup();
    fx.connections.reset("whoosh").unwrap();
    assert_eq!(fx.hits("whoosh", "foo"), 2);

    fx.connections.reset("default").unwrap();
    assert_eq!(fx.hits("default", "foo"), 0);
}

#[test]
fn test_reindex_is_repeatable() {
    let fx = fixtures::setup();
    for _ in 0..2 {
        assert_eq!(
            fx.foo_index
                .reindex(&fx.connections, &fx.store, Some("whoosh"))
                .unwrap(),
            2
        );
    }
    assert_eq!(fx.hits("whoosh", "foo"), 2);
}

#[test]
fn test_model_clause_in_query_string() {
    let fx = fixtures::setup();
    let sqs = fx.query().using("default").unwrap();
    assert_eq!(sqs.filter("-model:bar").count().unwrap(), 2);
    assert_eq!(sqs.filter("foo | model:bar").count().unwrap(), 5);
    assert_eq!(sqs.models(["bar"]).filter("model:foo").count().unwrap(), 0);
    assert_eq!(sqs.filter("model:foo").filter("model:bar").count().unwrap(), 0);
}

#[test]
fn test_phrase_matches_inside_words() {
    let fx = fixtures::setup();
    assert_eq!(fx.hits("default", "\"oo 1\""), 1);
    assert_eq!(fx.hits("whoosh", "\"oo 1\""), 1);
}
