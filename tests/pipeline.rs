mod support;

use std::sync::Arc;
use support::{at, pipeline, sql_record, FixedParser};
use tributary::config::IngestConfig;
use tributary::core::{
    GraphReader, InMemoryGraphStore, IngestErrorKind, IngestionPipeline, ObjectType, Origin,
    TransformKind,
};
use tributary::evidence::{
    reduce_dbt_manifest, EvidenceBatch, ManifestNode, ParsedRelationship, QueryHistoryRecord,
    SqlParseResult,
};

fn history(query_id: &str, text: &str, parsed: Option<SqlParseResult>) -> QueryHistoryRecord {
    QueryHistoryRecord {
        query_id: Some(query_id.to_string()),
        query_text: text.to_string(),
        executed_at: at(4),
        user: Some("ETL_USER".to_string()),
        database: Some("ANALYTICS".to_string()),
        schema: Some("PUBLIC".to_string()),
        parsed,
    }
}

#[test]
fn sql_evidence_creates_nodes_and_edges() {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::SqlParse(vec![sql_record(
        &[("raw.s.orders", "analytics.s.orders"), ("raw.s.customers", "analytics.s.orders")],
        at(2),
    )]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert!(result.is_clean());
    assert_eq!(result.origin, Origin::SqlParse);
    assert_eq!(result.records, 1);
    assert_eq!(result.nodes_touched, 3);
    assert_eq!(result.edges_touched, 2);
    assert_eq!(result.skipped, 0);

    let incoming = store.incoming("ANALYTICS.S.ORDERS").unwrap();
    assert_eq!(incoming.len(), 2);
    assert!(incoming.iter().all(|edge| edge.origin == Origin::SqlParse
        && edge.confidence == 1.0
        && edge.transform_kind == TransformKind::Unknown
        && edge.observed_at == at(2)));

    let node = store.node("RAW.S.ORDERS").unwrap().unwrap();
    assert_eq!(node.metadata["extraction_method"], "SQL_PARSE");
}

#[test]
fn reingesting_a_batch_changes_only_last_seen() {
    let store = Arc::new(InMemoryGraphStore::new());
    let ingest = pipeline(&store);
    let mut record = sql_record(&[("db.s.a", "db.s.b"), ("db.s.b.x", "db.s.c.y")], at(2));
    record.relationships[1].transform_kind = Some("cast".to_string());
    let batch = EvidenceBatch::SqlParse(vec![record]);

    ingest.ingest(&batch).unwrap();
    let nodes_before = store.nodes().unwrap();
    let edges_before = store.edges().unwrap();

    ingest.ingest(&batch).unwrap();
    let mut nodes_after = store.nodes().unwrap();
    let mut edges_after = store.edges().unwrap();

    assert_eq!(nodes_before.len(), nodes_after.len());
    assert_eq!(edges_before.len(), edges_after.len());
    for (before, after) in nodes_before.iter().zip(nodes_after.iter_mut()) {
        assert!(after.last_seen_at >= before.last_seen_at);
        after.last_seen_at = before.last_seen_at;
    }
    for (before, after) in edges_before.iter().zip(edges_after.iter_mut()) {
        assert!(after.last_seen_at >= before.last_seen_at);
        after.last_seen_at = before.last_seen_at;
    }
    assert_eq!(nodes_before, nodes_after);
    assert_eq!(edges_before, edges_after);
}

#[test]
fn bad_records_are_reported_and_the_batch_continues() {
    let store = Arc::new(InMemoryGraphStore::new());
    let mut unknown_kind = sql_record(&[("db.s.a", "db.s.b")], at(1));
    unknown_kind.relationships[0].transform_kind = Some("TELEPORT".to_string());

    let batch = EvidenceBatch::SqlParse(vec![
        sql_record(&[("db.s.a", "db.s.b")], at(1)),
        SqlParseResult::failed("syntax error at line 3"),
        sql_record(&[("orders", "db.s.c"), ("db.s.b", "db.s.c")], at(1)),
        unknown_kind,
    ]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert_eq!(result.records, 4);
    assert_eq!(result.errors.len(), 3);
    assert_eq!(result.failed_records(), 3);
    assert_eq!(result.errors[0].record_index, 1);
    assert_eq!(result.errors[0].kind, IngestErrorKind::EvidenceParse);
    assert_eq!(result.errors[1].record_index, 2);
    assert_eq!(result.errors[1].kind, IngestErrorKind::Identity);
    assert!(result.errors[1].context.contains("orders"));
    assert_eq!(result.errors[2].record_index, 3);

    // Valid relationships in a partly bad record still land
    assert_eq!(store.edge_count().unwrap(), 2);
    assert!(store.node("DB.S.C").unwrap().is_some());
}

#[test]
fn empty_parse_results_are_skipped() {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::SqlParse(vec![SqlParseResult::default()]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert_eq!(result.skipped, 1);
    assert!(result.is_clean());
    assert_eq!(store.node_count().unwrap(), 0);
}

#[test]
fn trivial_queries_are_skipped() {
    let store = Arc::new(InMemoryGraphStore::new());
    let parsed = SqlParseResult::from_relationships(vec![ParsedRelationship::new(
        "db.s.a", "db.s.b",
    )]);
    let batch = EvidenceBatch::QueryHistory(vec![
        history("q1", "SELECT 1", Some(parsed.clone())),
        history("q2", "INSERT INTO db.s.b SELECT * FROM db.s.a", Some(parsed)),
    ]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.edges_touched, 1);

    let edge = &store.outgoing("DB.S.A").unwrap()[0];
    assert_eq!(edge.origin, Origin::QueryHistory);
    assert_eq!(edge.observed_at, at(4));
    assert!(edge.evidence.as_deref().unwrap().starts_with("[q2] INSERT"));

    let node = store.node("DB.S.B").unwrap().unwrap();
    assert_eq!(node.metadata["query_id"], "q2");
    assert_eq!(node.metadata["user_name"], "ETL_USER");
}

#[test]
fn history_confidence_never_exceeds_sql_parse() {
    let store = Arc::new(InMemoryGraphStore::new());
    let config = IngestConfig {
        sql_parse_confidence: 0.7,
        query_history_confidence: 0.95,
        ..IngestConfig::default()
    };
    assert_eq!(config.effective_query_history_confidence(), 0.7);

    let parsed = SqlParseResult::from_relationships(vec![ParsedRelationship::new(
        "db.s.a", "db.s.b",
    )]);
    let batch = EvidenceBatch::QueryHistory(vec![history(
        "q1",
        "INSERT INTO db.s.b SELECT * FROM db.s.a",
        Some(parsed),
    )]);

    IngestionPipeline::new(Arc::clone(&store), config)
        .ingest(&batch)
        .unwrap();

    let edge = &store.outgoing("DB.S.A").unwrap()[0];
    assert_eq!(edge.origin, Origin::QueryHistory);
    assert_eq!(edge.confidence, 0.7);
}

#[test]
fn history_without_parse_result_uses_the_parser() {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::QueryHistory(vec![
        history("q1", "INSERT INTO db.s.t SELECT * FROM db.s.src", None),
        history("q2", "DELETE FROM db.s.other WHERE id = 3", None),
    ]);

    let without_parser = pipeline(&store).ingest(&batch).unwrap();
    assert_eq!(without_parser.errors.len(), 2);
    assert_eq!(store.edge_count().unwrap(), 0);

    let with_parser = IngestionPipeline::new(Arc::clone(&store), IngestConfig::default())
        .with_sql_parser(Arc::new(FixedParser {
            source: "db.s.src".to_string(),
            target: "db.s.t".to_string(),
        }));
    let result = with_parser.ingest(&batch).unwrap();

    assert_eq!(result.edges_touched, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].record_index, 1);
}

#[test]
fn ingest_sql_runs_the_parser_and_keeps_the_text() {
    let store = Arc::new(InMemoryGraphStore::new());
    let ingest = pipeline(&store).with_sql_parser(Arc::new(FixedParser {
        source: "db.s.src".to_string(),
        target: "db.s.t".to_string(),
    }));

    let result = ingest
        .ingest_sql("CREATE TABLE db.s.t AS SELECT * FROM db.s.src", None)
        .unwrap();

    assert_eq!(result.edges_touched, 1);
    let edge = &store.outgoing("DB.S.SRC").unwrap()[0];
    assert_eq!(
        edge.evidence.as_deref(),
        Some("CREATE TABLE db.s.t AS SELECT * FROM db.s.src")
    );
}

#[test]
fn evidence_text_is_truncated() {
    let store = Arc::new(InMemoryGraphStore::new());
    let config = IngestConfig {
        evidence_max_chars: 12,
        ..IngestConfig::default()
    };
    let mut record = sql_record(&[("db.s.a", "db.s.b")], at(1));
    record.sql_text = Some("INSERT INTO db.s.b SELECT * FROM db.s.a".to_string());

    IngestionPipeline::new(Arc::clone(&store), config)
        .ingest(&EvidenceBatch::SqlParse(vec![record]))
        .unwrap();

    let edge = &store.outgoing("DB.S.A").unwrap()[0];
    assert_eq!(edge.evidence.as_deref(), Some("INSERT INTO "));
}

#[test]
fn manifest_dependencies_become_dependency_edges() {
    let store = Arc::new(InMemoryGraphStore::new());
    let mut orders = ManifestNode::new("model.shop.orders", "orders")
        .located("analytics", "marts")
        .depends_on(["source.shop.raw_orders", "source.shop.raw_orders"]);
    orders.materialized = Some("view".to_string());
    let batch = EvidenceBatch::Manifest(vec![
        ManifestNode::new("source.shop.raw_orders", "raw_orders").located("raw", "shop"),
        orders,
    ]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert!(result.is_clean());
    assert_eq!(result.skipped, 1);
    assert_eq!(result.edges_touched, 1);

    let edge = &store.outgoing("RAW.SHOP.RAW_ORDERS").unwrap()[0];
    assert_eq!(edge.target_id, "ANALYTICS.MARTS.ORDERS");
    assert_eq!(edge.transform_kind, TransformKind::Dependency);
    assert_eq!(edge.origin, Origin::Manifest);

    let view = store.node("ANALYTICS.MARTS.ORDERS").unwrap().unwrap();
    assert_eq!(view.object_type, ObjectType::View);
    assert_eq!(view.metadata["manifest_node_id"], "model.shop.orders");
}

#[test]
fn manifest_node_ids_are_never_used_as_references() {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::Manifest(vec![
        ManifestNode::new("model.jaffle.orders", "orders")
            .depends_on(["source.jaffle.raw.customers"]),
        ManifestNode::new("model.jaffle.items", "items")
            .located("analytics", "marts")
            .depends_on(["source.jaffle.raw.customers", "model.jaffle.stock"]),
        ManifestNode::new("model.jaffle.stock", "stock").located("analytics", "marts"),
    ]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    // unlocated target fails the record; the unknown dependency fails one relationship
    assert_eq!(result.errors.len(), 2);
    assert!(result
        .errors
        .iter()
        .all(|error| error.kind == IngestErrorKind::Identity));
    assert_eq!(result.errors[0].record_index, 0);
    assert_eq!(result.errors[1].record_index, 1);
    assert!(result.errors[1].message.contains("source.jaffle.raw.customers"));

    assert_eq!(result.edges_touched, 1);
    assert!(store.node("MODEL.JAFFLE.ORDERS").unwrap().is_none());
    assert!(store.node("SOURCE.JAFFLE.RAW.CUSTOMERS").unwrap().is_none());
    assert_eq!(
        store.outgoing("ANALYTICS.MARTS.STOCK").unwrap()[0].target_id,
        "ANALYTICS.MARTS.ITEMS"
    );
}

#[test]
fn explicit_manifest_reference_wins_over_location() {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::Manifest(vec![
        ManifestNode::new("source.jaffle.raw.customers", "customers")
            .with_reference("raw.jaffle.customers"),
        ManifestNode::new("model.jaffle.orders", "orders")
            .located("analytics", "marts")
            .with_reference("analytics.marts.fct_orders")
            .depends_on(["source.jaffle.raw.customers"]),
    ]);

    let result = pipeline(&store).ingest(&batch).unwrap();

    assert!(result.is_clean());
    assert_eq!(
        store.outgoing("RAW.JAFFLE.CUSTOMERS").unwrap()[0].target_id,
        "ANALYTICS.MARTS.FCT_ORDERS"
    );
}

#[test]
fn dbt_manifest_reduces_to_relations() {
    let manifest = r#"{
        "nodes": {
            "model.shop.orders": {
                "resource_type": "model",
                "name": "orders",
                "database": "analytics",
                "schema": "marts",
                "alias": "fct_orders",
                "config": {"materialized": "table"},
                "depends_on": {"nodes": ["source.shop.raw_orders", "macro.shop.cents"]}
            },
            "test.shop.not_null_orders_id": {
                "resource_type": "test",
                "name": "not_null_orders_id",
                "depends_on": {"nodes": ["model.shop.orders"]}
            }
        },
        "sources": {
            "source.shop.raw_orders": {
                "resource_type": "source",
                "name": "raw_orders",
                "database": "raw",
                "schema": "shop"
            }
        }
    }"#;

    let records = reduce_dbt_manifest(manifest).unwrap();

    assert_eq!(records.len(), 2);
    let orders = records
        .iter()
        .find(|record| record.node_id == "model.shop.orders")
        .unwrap();
    assert_eq!(orders.depends_on, vec!["source.shop.raw_orders".to_string()]);
    assert_eq!(
        orders.qualified_name().as_deref(),
        Some("analytics.marts.fct_orders")
    );

    let store = Arc::new(InMemoryGraphStore::new());
    pipeline(&store)
        .ingest(&EvidenceBatch::Manifest(records))
        .unwrap();
    assert!(store.node("ANALYTICS.MARTS.FCT_ORDERS").unwrap().is_some());
    assert_eq!(store.edge_count().unwrap(), 1);
}

#[test]
fn closed_store_aborts_the_batch() {
    let store = Arc::new(InMemoryGraphStore::new());
    store.close();
    let batch = EvidenceBatch::SqlParse(vec![sql_record(&[("db.s.a", "db.s.b")], at(1))]);

    let err = pipeline(&store).ingest(&batch).unwrap_err();
    assert!(err.is_fatal());
}
