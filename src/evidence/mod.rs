pub mod manifest;
pub mod query_history;
pub mod sql;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Metadata, ObjectType, Origin, TransformKind};
use crate::error::{LineageError, Result};

pub use manifest::{reduce_dbt_manifest, ManifestNode, ManifestNormalizer};
pub use query_history::{QueryHistoryNormalizer, QueryHistoryRecord};
pub use sql::{ParsedRelationship, SqlEvidenceNormalizer, SqlParseResult, SqlParser};

/// One side of a normalized relationship, before identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoNode {
    pub reference: String,
    pub object_type: Option<ObjectType>,
    pub metadata: Metadata,
    /// Set when the source could not name a warehouse object for this side.
    pub unresolved: Option<String>,
}

impl ProtoNode {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            object_type: None,
            metadata: Metadata::new(),
            unresolved: None,
        }
    }

    /// A side whose reference is only a source-local label.
    pub fn unresolved(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            unresolved: Some(reason.into()),
            ..Self::new(reference)
        }
    }

    /// The reference to hand to identity resolution.
    pub fn resolvable(&self) -> Result<&str> {
        match &self.unresolved {
            Some(reason) => Err(LineageError::identity(&self.reference, reason.clone())),
            None => Ok(&self.reference),
        }
    }

    pub fn with_object_type(mut self, object_type: Option<ObjectType>) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Uniform record every evidence source is reduced to.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvidence {
    pub source: ProtoNode,
    pub target: ProtoNode,
    pub transform_kind: TransformKind,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
    pub origin: Origin,
    pub evidence: Option<String>,
}

/// Converts one raw evidence record into zero or more normalized tuples.
///
/// An empty vector means the record carried no lineage and is skipped; an
/// error means the record was malformed.
pub trait EvidenceNormalizer {
    type Record;

    fn normalize(&self, record: &Self::Record) -> Result<Vec<NormalizedEvidence>>;
    fn origin(&self) -> Origin;
}

/// A batch of raw evidence from a single origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "origin", content = "records", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceBatch {
    SqlParse(Vec<SqlParseResult>),
    QueryHistory(Vec<QueryHistoryRecord>),
    Manifest(Vec<ManifestNode>),
}

impl EvidenceBatch {
    pub fn origin(&self) -> Origin {
        match self {
            EvidenceBatch::SqlParse(_) => Origin::SqlParse,
            EvidenceBatch::QueryHistory(_) => Origin::QueryHistory,
            EvidenceBatch::Manifest(_) => Origin::Manifest,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EvidenceBatch::SqlParse(records) => records.len(),
            EvidenceBatch::QueryHistory(records) => records.len(),
            EvidenceBatch::Manifest(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short description of one record for error reports.
    pub fn describe_record(&self, index: usize) -> String {
        match self {
            EvidenceBatch::SqlParse(records) => records
                .get(index)
                .map(|record| {
                    let first = record.relationships.first().map(|rel| {
                        format!("{} -> {}", rel.source_ref, rel.target_ref)
                    });
                    format!(
                        "sql_parse[{index}] ({} relationships{})",
                        record.relationships.len(),
                        first.map(|f| format!(", first {f}")).unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| format!("sql_parse[{index}]")),
            EvidenceBatch::QueryHistory(records) => records
                .get(index)
                .map(|record| {
                    format!(
                        "query_history[{index}] (query_id {})",
                        record.query_id.as_deref().unwrap_or("<none>")
                    )
                })
                .unwrap_or_else(|| format!("query_history[{index}]")),
            EvidenceBatch::Manifest(records) => records
                .get(index)
                .map(|record| format!("manifest[{index}] ({})", record.node_id))
                .unwrap_or_else(|| format!("manifest[{index}]")),
        }
    }
}

/// Parse an optional classifier label, defaulting to `UNKNOWN`.
pub(crate) fn parse_transform_kind(label: Option<&str>) -> Result<TransformKind> {
    match label {
        Some(label) => label.parse(),
        None => Ok(TransformKind::Unknown),
    }
}

pub(crate) fn parse_object_type(label: Option<&str>) -> Result<Option<ObjectType>> {
    label.map(str::parse).transpose()
}

pub(crate) fn validate_confidence(confidence: f64) -> Result<f64> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(LineageError::EvidenceParse(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }
    Ok(confidence)
}

/// Truncate evidence text on a character boundary.
pub(crate) fn truncate_evidence(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || max_chars == 0 {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}
