use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::graph::{EdgeKey, Origin};
use super::identity::IdentityResolver;
use super::store::{EdgeUpsert, GraphStore, NodeUpsert};
use crate::config::IngestConfig;
use crate::error::{LineageError, Result};
use crate::evidence::{
    EvidenceBatch, EvidenceNormalizer, ManifestNormalizer, NormalizedEvidence,
    QueryHistoryNormalizer, SqlEvidenceNormalizer, SqlParser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestErrorKind {
    Identity,
    EvidenceParse,
    UnknownObject,
}

/// A record (or one relationship of a record) that could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestError {
    pub record_index: usize,
    pub context: String,
    pub kind: IngestErrorKind,
    pub message: String,
}

impl IngestError {
    fn new(record_index: usize, context: String, err: &LineageError) -> Self {
        let kind = match err {
            LineageError::Identity { .. } => IngestErrorKind::Identity,
            LineageError::UnknownObject(_) => IngestErrorKind::UnknownObject,
            _ => IngestErrorKind::EvidenceParse,
        };
        Self {
            record_index,
            context,
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of one ingestion batch. Partial success is the normal case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    pub origin: Origin,
    pub records: usize,
    /// Distinct nodes created or refreshed.
    pub nodes_touched: usize,
    /// Distinct edges created or reinforced.
    pub edges_touched: usize,
    /// Records that carried no lineage.
    pub skipped: usize,
    pub errors: Vec<IngestError>,
}

impl IngestResult {
    fn empty(origin: Origin, records: usize) -> Self {
        Self {
            origin,
            records,
            nodes_touched: 0,
            edges_touched: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of distinct records with at least one error.
    pub fn failed_records(&self) -> usize {
        self.errors
            .iter()
            .map(|error| error.record_index)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Normalize -> resolve identity -> upsert nodes -> upsert edge, for every
/// record of a batch. Only a storage failure aborts the batch.
pub struct IngestionPipeline<S: GraphStore + ?Sized> {
    store: Arc<S>,
    resolver: IdentityResolver,
    config: IngestConfig,
    sql_parser: Option<Arc<dyn SqlParser>>,
}

impl<S: GraphStore + ?Sized> IngestionPipeline<S> {
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        if config.query_history_confidence > config.sql_parse_confidence {
            warn!(
                query_history = config.query_history_confidence,
                sql_parse = config.sql_parse_confidence,
                "Query-history confidence capped at the SQL_PARSE confidence"
            );
        }
        Self {
            store,
            resolver: IdentityResolver::new(),
            config,
            sql_parser: None,
        }
    }

    /// Attach the SQL parser used for query-history records that arrive
    /// without a parse result.
    pub fn with_sql_parser(mut self, parser: Arc<dyn SqlParser>) -> Self {
        self.sql_parser = Some(parser);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ingest(&self, batch: &EvidenceBatch) -> Result<IngestResult> {
        let origin = batch.origin();
        let received_at = Utc::now();
        info!(origin = %origin, records = batch.len(), "Ingesting evidence batch");

        let normalized = match batch {
            EvidenceBatch::SqlParse(records) => {
                let normalizer = SqlEvidenceNormalizer::new(
                    self.config.sql_parse_confidence,
                    self.config.evidence_max_chars,
                    received_at,
                );
                normalize_all(&normalizer, records)
            }
            EvidenceBatch::QueryHistory(records) => {
                let normalizer = QueryHistoryNormalizer::new(
                    self.sql_parser.clone(),
                    self.config.default_dialect.clone(),
                    self.config.effective_query_history_confidence(),
                    self.config.min_query_length,
                    self.config.evidence_max_chars,
                );
                normalize_all(&normalizer, records)
            }
            EvidenceBatch::Manifest(records) => {
                let normalizer =
                    ManifestNormalizer::new(records, self.config.manifest_confidence, received_at);
                normalize_all(&normalizer, records)
            }
        };

        let mut result = IngestResult::empty(origin, batch.len());
        let mut touched_nodes: BTreeSet<String> = BTreeSet::new();
        let mut touched_edges: BTreeSet<EdgeKey> = BTreeSet::new();

        for (index, outcome) in normalized.into_iter().enumerate() {
            let tuples = match outcome {
                Ok(tuples) => tuples,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(record = index, error = %err, "Skipping malformed evidence record");
                    result
                        .errors
                        .push(IngestError::new(index, batch.describe_record(index), &err));
                    continue;
                }
            };

            if tuples.is_empty() {
                debug!(record = index, "Evidence record carried no lineage");
                result.skipped += 1;
                continue;
            }

            for tuple in tuples {
                let context = format!(
                    "{}: {} -> {}",
                    batch.describe_record(index),
                    tuple.source.reference,
                    tuple.target.reference
                );
                match self.apply(tuple, received_at, &mut touched_nodes, &mut touched_edges) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(record = index, error = %err, "Skipping relationship");
                        result.errors.push(IngestError::new(index, context, &err));
                    }
                }
            }
        }

        result.nodes_touched = touched_nodes.len();
        result.edges_touched = touched_edges.len();

        info!(
            origin = %origin,
            nodes = result.nodes_touched,
            edges = result.edges_touched,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Evidence batch ingested"
        );
        Ok(result)
    }

    /// Run the configured SQL parser over one statement and ingest the
    /// relationships as SQL_PARSE evidence.
    pub fn ingest_sql(&self, sql_text: &str, dialect: Option<&str>) -> Result<IngestResult> {
        let parser = self.sql_parser.as_ref().ok_or_else(|| {
            LineageError::EvidenceParse("no SQL parser is configured".to_string())
        })?;
        let dialect = dialect.unwrap_or(&self.config.default_dialect);
        let mut parsed = parser.parse(sql_text, dialect);
        if parsed.sql_text.is_none() {
            parsed.sql_text = Some(sql_text.to_string());
        }
        self.ingest(&EvidenceBatch::SqlParse(vec![parsed]))
    }

    fn apply(
        &self,
        tuple: NormalizedEvidence,
        received_at: DateTime<Utc>,
        touched_nodes: &mut BTreeSet<String>,
        touched_edges: &mut BTreeSet<EdgeKey>,
    ) -> Result<()> {
        let source_ref = self.resolver.resolve(tuple.source.resolvable()?)?;
        let target_ref = self.resolver.resolve(tuple.target.resolvable()?)?;
        let source_id = source_ref.object_id();
        let target_id = target_ref.object_id();

        self.store.upsert_node(NodeUpsert {
            object_ref: source_ref,
            object_type: tuple.source.object_type,
            metadata: tuple.source.metadata,
            seen_at: received_at,
        })?;
        touched_nodes.insert(source_id.clone());

        self.store.upsert_node(NodeUpsert {
            object_ref: target_ref,
            object_type: tuple.target.object_type,
            metadata: tuple.target.metadata,
            seen_at: received_at,
        })?;
        touched_nodes.insert(target_id.clone());

        let edge = EdgeUpsert {
            source_id,
            target_id,
            transform_kind: tuple.transform_kind,
            confidence: tuple.confidence,
            origin: tuple.origin,
            observed_at: tuple.observed_at,
            evidence: tuple.evidence,
            seen_at: received_at,
        };
        let key = edge.key();
        self.store.upsert_edge(edge)?;
        touched_edges.insert(key);
        Ok(())
    }
}

fn normalize_all<N>(normalizer: &N, records: &[N::Record]) -> Vec<Result<Vec<NormalizedEvidence>>>
where
    N: EvidenceNormalizer + Sync,
    N::Record: Sync,
{
    records
        .par_iter()
        .map(|record| normalizer.normalize(record))
        .collect()
}
