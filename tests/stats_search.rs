mod support;

use std::collections::BTreeSet;
use support::{edge, store_with_edges, upsert_node};
use tributary::core::search::{search, MAX_PAGE_SIZE};
use tributary::core::stats::collect_stats;
use tributary::core::{GraphStore, InMemoryGraphStore, ObjectType, Origin, SearchRequest};

#[test]
fn stats_count_types_origins_and_cycles() {
    let store = store_with_edges(&[
        ("db.s.a", "db.s.b"),
        ("db.s.b", "db.s.a"),
        ("db.s.b", "db.s.c"),
        ("db.s.c.x", "db.s.d.x"),
    ]);

    let stats = collect_stats(store.as_ref()).unwrap();

    assert_eq!(stats.total_nodes, 5);
    assert_eq!(stats.total_edges, 4);
    assert_eq!(stats.node_types["TABLE"], 3);
    assert_eq!(stats.node_types["COLUMN"], 2);
    assert_eq!(stats.transformation_types["UNKNOWN"], 4);
    assert_eq!(stats.origins["SQL_PARSE"], 4);
    assert_eq!(stats.confidence_distribution["0.9-1.0"], 4);
    assert_eq!(stats.cycles, 1);
    assert!(stats.last_updated.is_some());
}

#[test]
fn confidence_buckets_and_self_loops() {
    let store = InMemoryGraphStore::new();
    for reference in ["db.s.a", "db.s.b", "db.s.c"] {
        upsert_node(&store, reference, None);
    }
    store
        .upsert_edge(edge("DB.S.A", "DB.S.A", Origin::SqlParse, 1.0))
        .unwrap();
    store
        .upsert_edge(edge("DB.S.A", "DB.S.B", Origin::QueryHistory, 0.75))
        .unwrap();
    store
        .upsert_edge(edge("DB.S.B", "DB.S.C", Origin::Manifest, 0.2))
        .unwrap();

    let stats = collect_stats(&store).unwrap();

    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.confidence_distribution["0.9-1.0"], 1);
    assert_eq!(stats.confidence_distribution["0.7-0.9"], 1);
    assert_eq!(stats.confidence_distribution["0.0-0.5"], 1);
    assert_eq!(stats.origins.len(), 3);
}

#[test]
fn search_matches_case_insensitively_and_pages() {
    let pairs: Vec<(String, String)> = (0..7)
        .map(|i| ("db.sales.orders".to_string(), format!("db.sales.orders_{i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(source, target)| (source.as_str(), target.as_str()))
        .collect();
    let store = store_with_edges(&borrowed);

    let mut request = SearchRequest::new("Orders_");
    request.page_size = 3;
    request.page = 3;
    let results = search(store.as_ref(), &request).unwrap();

    assert_eq!(results.total_count, 7);
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].object_id, "DB.SALES.ORDERS_6");

    let mut oversized = SearchRequest::new("sales");
    oversized.page_size = 10_000;
    oversized.page = 0;
    let results = search(store.as_ref(), &oversized).unwrap();
    assert_eq!(results.page_size, MAX_PAGE_SIZE);
    assert_eq!(results.page, 1);
    assert_eq!(results.total_count, 8);
}

#[test]
fn search_filters_by_type_and_confidence() {
    let store = InMemoryGraphStore::new();
    upsert_node(&store, "db.s.view_a", Some(ObjectType::View));
    upsert_node(&store, "db.s.table_b", None);
    upsert_node(&store, "db.s.table_b.col", None);
    store
        .upsert_edge(edge("DB.S.VIEW_A", "DB.S.TABLE_B", Origin::QueryHistory, 0.3))
        .unwrap();

    let mut views = SearchRequest::new("db.s");
    views.object_types = Some(BTreeSet::from([ObjectType::View]));
    let results = search(&store, &views).unwrap();
    assert_eq!(results.total_count, 1);
    assert_eq!(results.results[0].object_id, "DB.S.VIEW_A");

    let mut confident = SearchRequest::new("db.s");
    confident.min_confidence = 0.5;
    assert_eq!(search(&store, &confident).unwrap().total_count, 0);

    confident.min_confidence = 0.3;
    assert_eq!(search(&store, &confident).unwrap().total_count, 2);
}
