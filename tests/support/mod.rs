#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use tributary::config::IngestConfig;
use tributary::core::{
    EdgeUpsert, GraphStore, InMemoryGraphStore, IngestionPipeline, Metadata, NodeUpsert,
    ObjectType, Origin, TransformKind,
};
use tributary::core::identity::resolve;
use tributary::evidence::{EvidenceBatch, ParsedRelationship, SqlParseResult, SqlParser};
use tributary::logging::init_test_logging;

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// One parse result carrying every `(source, target)` pair.
pub fn sql_record(pairs: &[(&str, &str)], observed_at: DateTime<Utc>) -> SqlParseResult {
    let mut record = SqlParseResult::from_relationships(
        pairs
            .iter()
            .map(|(source, target)| ParsedRelationship::new(*source, *target))
            .collect(),
    );
    record.observed_at = Some(observed_at);
    record.sql_text = Some(format!("-- {} relationships", pairs.len()));
    record
}

pub fn pipeline(store: &Arc<InMemoryGraphStore>) -> IngestionPipeline<InMemoryGraphStore> {
    init_test_logging();
    IngestionPipeline::new(Arc::clone(store), IngestConfig::default())
}

/// Store holding one SQL_PARSE edge per pair.
pub fn store_with_edges(pairs: &[(&str, &str)]) -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    let batch = EvidenceBatch::SqlParse(
        pairs
            .iter()
            .map(|pair| sql_record(&[*pair], at(1)))
            .collect(),
    );
    let result = pipeline(&store).ingest(&batch).expect("ingest");
    assert!(result.is_clean(), "fixture ingest failed: {:?}", result.errors);
    store
}

pub fn upsert_node(store: &InMemoryGraphStore, reference: &str, object_type: Option<ObjectType>) {
    store
        .upsert_node(NodeUpsert {
            object_ref: resolve(reference).expect("qualified reference"),
            object_type,
            metadata: Metadata::new(),
            seen_at: at(1),
        })
        .expect("upsert node");
}

pub fn edge(source: &str, target: &str, origin: Origin, confidence: f64) -> EdgeUpsert {
    EdgeUpsert {
        source_id: source.to_string(),
        target_id: target.to_string(),
        transform_kind: TransformKind::Identity,
        confidence,
        origin,
        observed_at: at(2),
        evidence: None,
        seen_at: at(3),
    }
}

/// Parser stub that reports a fixed relationship for any statement
/// mentioning the source table.
pub struct FixedParser {
    pub source: String,
    pub target: String,
}

impl SqlParser for FixedParser {
    fn parse(&self, sql_text: &str, _dialect: &str) -> SqlParseResult {
        if sql_text.to_uppercase().contains(&self.source.to_uppercase()) {
            SqlParseResult::from_relationships(vec![ParsedRelationship::new(
                self.source.as_str(),
                self.target.as_str(),
            )])
        } else {
            SqlParseResult::failed("no recognizable lineage")
        }
    }
}
