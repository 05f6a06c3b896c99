use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    parse_object_type, parse_transform_kind, truncate_evidence, validate_confidence,
    EvidenceNormalizer, NormalizedEvidence, ProtoNode,
};
use crate::core::{Metadata, Origin};
use crate::error::{LineageError, Result};

/// A source -> target pair reported by the SQL parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelationship {
    pub source_ref: String,
    pub target_ref: String,
    #[serde(default)]
    pub transform_kind: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
}

impl ParsedRelationship {
    pub fn new(source_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform_kind: impl Into<String>) -> Self {
        self.transform_kind = Some(transform_kind.into());
        self
    }

    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }
}

/// Output of the external SQL parser for one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlParseResult {
    #[serde(default)]
    pub relationships: Vec<ParsedRelationship>,
    #[serde(default)]
    pub parse_error: Option<String>,
    #[serde(default)]
    pub sql_text: Option<String>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl SqlParseResult {
    pub fn from_relationships(relationships: Vec<ParsedRelationship>) -> Self {
        Self {
            relationships,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            parse_error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Boundary to the external SQL dialect parser.
pub trait SqlParser: Send + Sync {
    fn parse(&self, sql_text: &str, dialect: &str) -> SqlParseResult;
}

/// Shared reduction of a parse result into normalized tuples.
pub(crate) struct RelationshipContext<'a> {
    pub origin: Origin,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
    pub evidence: Option<String>,
    pub metadata: &'a Metadata,
}

pub(crate) fn normalize_parse_result(
    result: &SqlParseResult,
    context: RelationshipContext<'_>,
) -> Result<Vec<NormalizedEvidence>> {
    if let Some(error) = &result.parse_error {
        return Err(LineageError::EvidenceParse(format!(
            "SQL parser reported an error: {error}"
        )));
    }

    let confidence = validate_confidence(context.confidence)?;
    let mut tuples = Vec::with_capacity(result.relationships.len());

    for relationship in &result.relationships {
        if relationship.source_ref.trim().is_empty() || relationship.target_ref.trim().is_empty()
        {
            return Err(LineageError::EvidenceParse(
                "relationship is missing a source or target reference".to_string(),
            ));
        }

        let transform_kind = parse_transform_kind(relationship.transform_kind.as_deref())?;
        let source_type = parse_object_type(relationship.source_type.as_deref())?;
        let target_type = parse_object_type(relationship.target_type.as_deref())?;

        tuples.push(NormalizedEvidence {
            source: ProtoNode::new(relationship.source_ref.trim())
                .with_object_type(source_type)
                .with_metadata(context.metadata.clone()),
            target: ProtoNode::new(relationship.target_ref.trim())
                .with_object_type(target_type)
                .with_metadata(context.metadata.clone()),
            transform_kind,
            confidence,
            observed_at: context.observed_at,
            origin: context.origin,
            evidence: context.evidence.clone(),
        });
    }

    Ok(tuples)
}

/// Normalizer for parsed SQL statements.
pub struct SqlEvidenceNormalizer {
    confidence: f64,
    max_evidence_chars: usize,
    received_at: DateTime<Utc>,
}

impl SqlEvidenceNormalizer {
    pub fn new(confidence: f64, max_evidence_chars: usize, received_at: DateTime<Utc>) -> Self {
        Self {
            confidence,
            max_evidence_chars,
            received_at,
        }
    }
}

impl EvidenceNormalizer for SqlEvidenceNormalizer {
    type Record = SqlParseResult;

    fn normalize(&self, record: &SqlParseResult) -> Result<Vec<NormalizedEvidence>> {
        let mut metadata = Metadata::new();
        metadata.insert(
            "extraction_method".to_string(),
            serde_json::Value::from(self.origin().as_str()),
        );

        normalize_parse_result(
            record,
            RelationshipContext {
                origin: self.origin(),
                confidence: self.confidence,
                observed_at: record.observed_at.unwrap_or(self.received_at),
                evidence: record
                    .sql_text
                    .as_deref()
                    .and_then(|sql| truncate_evidence(sql, self.max_evidence_chars)),
                metadata: &metadata,
            },
        )
    }

    fn origin(&self) -> Origin {
        Origin::SqlParse
    }
}
