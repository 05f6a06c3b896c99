use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::sql::{normalize_parse_result, RelationshipContext, SqlParseResult, SqlParser};
use super::{truncate_evidence, EvidenceNormalizer, NormalizedEvidence};
use crate::core::{Metadata, Origin};
use crate::error::{LineageError, Result};

/// One executed statement from the warehouse query history feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistoryRecord {
    #[serde(default)]
    pub query_id: Option<String>,
    pub query_text: String,
    pub executed_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Parser output attached upstream. When absent the configured
    /// [`SqlParser`] is run over `query_text`.
    #[serde(default)]
    pub parsed: Option<SqlParseResult>,
}

/// Normalizer for query-history records. Supplementary to parsed SQL, so
/// its confidence is capped by configuration at the SQL_PARSE level.
pub struct QueryHistoryNormalizer {
    parser: Option<Arc<dyn SqlParser>>,
    dialect: String,
    confidence: f64,
    min_query_length: usize,
    max_evidence_chars: usize,
}

impl QueryHistoryNormalizer {
    pub fn new(
        parser: Option<Arc<dyn SqlParser>>,
        dialect: impl Into<String>,
        confidence: f64,
        min_query_length: usize,
        max_evidence_chars: usize,
    ) -> Self {
        Self {
            parser,
            dialect: dialect.into(),
            confidence,
            min_query_length,
            max_evidence_chars,
        }
    }

    fn record_metadata(record: &QueryHistoryRecord) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(
            "extraction_method".to_string(),
            serde_json::Value::from(Origin::QueryHistory.as_str()),
        );
        if let Some(query_id) = &record.query_id {
            metadata.insert("query_id".to_string(), serde_json::Value::from(query_id.as_str()));
        }
        if let Some(user) = &record.user {
            metadata.insert("user_name".to_string(), serde_json::Value::from(user.as_str()));
        }
        metadata.insert(
            "observed_at".to_string(),
            serde_json::Value::from(record.executed_at.to_rfc3339()),
        );
        metadata
    }
}

impl EvidenceNormalizer for QueryHistoryNormalizer {
    type Record = QueryHistoryRecord;

    fn normalize(&self, record: &QueryHistoryRecord) -> Result<Vec<NormalizedEvidence>> {
        // Trivial statements never carry lineage
        if record.query_text.trim().chars().count() <= self.min_query_length {
            return Ok(Vec::new());
        }

        let parsed = match (&record.parsed, &self.parser) {
            (Some(parsed), _) => parsed.clone(),
            (None, Some(parser)) => parser.parse(&record.query_text, &self.dialect),
            (None, None) => {
                return Err(LineageError::EvidenceParse(
                    "record has no parse result and no SQL parser is configured".to_string(),
                ))
            }
        };

        let metadata = Self::record_metadata(record);
        let evidence = truncate_evidence(&record.query_text, self.max_evidence_chars).map(|sql| {
            match &record.query_id {
                Some(query_id) => format!("[{query_id}] {sql}"),
                None => sql,
            }
        });

        normalize_parse_result(
            &parsed,
            RelationshipContext {
                origin: self.origin(),
                confidence: self.confidence,
                observed_at: record.executed_at,
                evidence,
                metadata: &metadata,
            },
        )
    }

    fn origin(&self) -> Origin {
        Origin::QueryHistory
    }
}
