mod support;

use std::collections::BTreeSet;
use support::{at, edge, upsert_node};
use tributary::core::{
    GraphReader, GraphStore, InMemoryGraphStore, ObjectType, Origin, TransformKind, UpsertOutcome,
};
use tributary::LineageError;

const A: &str = "DB.S.A";
const B: &str = "DB.S.B";

fn two_nodes() -> InMemoryGraphStore {
    let store = InMemoryGraphStore::new();
    upsert_node(&store, "db.s.a", None);
    upsert_node(&store, "db.s.b", None);
    store
}

#[test]
fn confidence_only_increases() {
    let store = two_nodes();

    assert_eq!(
        store.upsert_edge(edge(A, B, Origin::SqlParse, 0.6)).unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        store.upsert_edge(edge(A, B, Origin::SqlParse, 0.4)).unwrap(),
        UpsertOutcome::Merged
    );
    assert_eq!(store.outgoing(A).unwrap()[0].confidence, 0.6);

    store.upsert_edge(edge(A, B, Origin::SqlParse, 0.9)).unwrap();
    assert_eq!(store.outgoing(A).unwrap()[0].confidence, 0.9);
    assert_eq!(store.edge_count().unwrap(), 1);
}

#[test]
fn sql_parse_outranks_query_history_on_one_edge() {
    let store = two_nodes();
    store
        .upsert_edge(edge(A, B, Origin::QueryHistory, 0.5))
        .unwrap();
    store.upsert_edge(edge(A, B, Origin::SqlParse, 1.0)).unwrap();

    let edges = store.edges().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].origin, Origin::SqlParse);
    assert_eq!(
        edges[0].origins,
        BTreeSet::from([Origin::SqlParse, Origin::QueryHistory])
    );
    assert_eq!(edges[0].confidence, 1.0);
}

#[test]
fn merge_does_not_depend_on_arrival_order() {
    let forward = two_nodes();
    let backward = two_nodes();

    let mut from_history = edge(A, B, Origin::QueryHistory, 0.7);
    from_history.evidence = Some("insert into b select * from a".to_string());
    from_history.observed_at = at(5);
    let mut from_parser = edge(A, B, Origin::SqlParse, 0.9);
    from_parser.evidence = Some("create table b as select * from a".to_string());

    forward.upsert_edge(from_history.clone()).unwrap();
    forward.upsert_edge(from_parser.clone()).unwrap();
    backward.upsert_edge(from_parser).unwrap();
    backward.upsert_edge(from_history).unwrap();

    let forward_edges = forward.edges().unwrap();
    assert_eq!(forward_edges, backward.edges().unwrap());
    assert_eq!(forward_edges[0].observed_at, at(5));
    assert_eq!(
        forward_edges[0].evidence.as_deref(),
        Some("create table b as select * from a")
    );
}

#[test]
fn distinct_transform_kinds_are_distinct_edges() {
    let store = two_nodes();
    store.upsert_edge(edge(A, B, Origin::SqlParse, 1.0)).unwrap();
    let mut aggregate = edge(A, B, Origin::SqlParse, 1.0);
    aggregate.transform_kind = TransformKind::Aggregate;
    store.upsert_edge(aggregate).unwrap();

    let edges = store.outgoing(A).unwrap();
    assert_eq!(edges.len(), 2);
    assert_ne!(edges[0].edge_id, edges[1].edge_id);
    assert_eq!(store.incoming(B).unwrap().len(), 2);
}

#[test]
fn edges_require_existing_endpoints() {
    let store = two_nodes();
    let err = store
        .upsert_edge(edge(A, "DB.S.MISSING", Origin::SqlParse, 1.0))
        .unwrap_err();
    assert!(matches!(err, LineageError::UnknownObject(id) if id == "DB.S.MISSING"));
    assert_eq!(store.edge_count().unwrap(), 0);
}

#[test]
fn out_of_range_confidence_is_clamped_and_nan_rejected() {
    let store = two_nodes();
    store.upsert_edge(edge(A, B, Origin::SqlParse, 1.7)).unwrap();
    assert_eq!(store.outgoing(A).unwrap()[0].confidence, 1.0);

    let err = store
        .upsert_edge(edge(B, A, Origin::SqlParse, f64::NAN))
        .unwrap_err();
    assert!(matches!(err, LineageError::EvidenceParse(_)));
}

#[test]
fn column_nodes_link_to_their_table() {
    let store = InMemoryGraphStore::new();
    upsert_node(&store, "db.s.orders.amount", Some(ObjectType::View));
    upsert_node(&store, "db.s.orders.id", None);

    let column = store.node("DB.S.ORDERS.AMOUNT").unwrap().unwrap();
    assert_eq!(column.object_type, ObjectType::Column);
    assert_eq!(column.parent_object_id.as_deref(), Some("DB.S.ORDERS"));
    assert_eq!(
        store.columns_of("DB.S.ORDERS").unwrap(),
        vec!["DB.S.ORDERS.AMOUNT".to_string(), "DB.S.ORDERS.ID".to_string()]
    );
}

#[test]
fn relation_type_hints_only_upgrade() {
    let store = InMemoryGraphStore::new();
    upsert_node(&store, "db.s.v", Some(ObjectType::View));
    upsert_node(&store, "db.s.v", None);
    assert_eq!(
        store.node("DB.S.V").unwrap().unwrap().object_type,
        ObjectType::View
    );
}

#[test]
fn closed_store_fails_with_storage_error() {
    let store = two_nodes();
    store.close();
    assert!(store.is_closed());

    assert!(matches!(store.node(A), Err(LineageError::Storage(_))));
    assert!(matches!(
        store.upsert_edge(edge(A, B, Origin::SqlParse, 1.0)),
        Err(LineageError::Storage(_))
    ));
    assert!(store.node(A).unwrap_err().is_fatal());
}

#[test]
fn quoted_dotted_table_and_column_stay_separate_nodes() {
    let store = InMemoryGraphStore::new();
    upsert_node(&store, r#""a.b".c.d"#, None);
    upsert_node(&store, "a.b.c.d", None);

    assert_eq!(store.node_count().unwrap(), 2);

    let table = store.node(r#""A.B".C.D"#).unwrap().unwrap();
    assert_eq!(table.object_type, ObjectType::Table);
    assert_eq!(table.database, "A.B");
    assert!(table.parent_object_id.is_none());

    let column = store.node("A.B.C.D").unwrap().unwrap();
    assert_eq!(column.object_type, ObjectType::Column);
    assert_eq!(column.column.as_deref(), Some("D"));
    assert_eq!(column.parent_object_id.as_deref(), Some("A.B.C"));
}
