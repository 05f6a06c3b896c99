//! Configuration for the lineage engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LineageError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub traversal: TraversalConfig,
    pub impact: ImpactConfig,
    pub paths: PathConfig,
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl LineageConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LineageError::InvalidConfig {
            field: path.display().to_string(),
            reason: format!("failed to read config file: {e}"),
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            LineageError::InvalidConfig {
                field: path.display().to_string(),
                reason: format!("failed to parse config: {e}"),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let t = &self.traversal;
        if t.default_depth == 0 {
            return Err(invalid("traversal.default_depth", "must be at least 1"));
        }
        if t.max_depth < t.default_depth {
            return Err(invalid(
                "traversal.max_depth",
                "must not be below traversal.default_depth",
            ));
        }
        if t.max_nodes == 0 || t.max_edges == 0 {
            return Err(invalid(
                "traversal.max_nodes",
                "circuit breaker bounds must be non-zero",
            ));
        }
        check_unit_interval("traversal.min_confidence", t.min_confidence)?;

        let i = &self.impact;
        if i.default_depth == 0 {
            return Err(invalid("impact.default_depth", "must be at least 1"));
        }
        if !(i.medium_threshold <= i.high_threshold && i.high_threshold <= i.critical_threshold) {
            return Err(invalid(
                "impact.high_threshold",
                "thresholds must satisfy medium <= high <= critical",
            ));
        }

        if self.paths.default_max_hops == 0 {
            return Err(invalid("paths.default_max_hops", "must be at least 1"));
        }
        if self.paths.max_paths == 0 {
            return Err(invalid("paths.max_paths", "must be at least 1"));
        }

        let g = &self.ingest;
        check_unit_interval("ingest.sql_parse_confidence", g.sql_parse_confidence)?;
        check_unit_interval("ingest.query_history_confidence", g.query_history_confidence)?;
        check_unit_interval("ingest.manifest_confidence", g.manifest_confidence)?;
        if g.query_history_confidence > g.sql_parse_confidence {
            return Err(invalid(
                "ingest.query_history_confidence",
                "must not exceed ingest.sql_parse_confidence",
            ));
        }
        if g.default_dialect.trim().is_empty() {
            return Err(invalid("ingest.default_dialect", "must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> LineageError {
    LineageError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, "must be within [0, 1]"));
    }
    Ok(())
}

/// Interactive traversal bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub default_depth: usize,
    /// Requested depths are clamped to this value.
    pub max_depth: usize,
    /// Circuit breaker on reached nodes.
    pub max_nodes: usize,
    /// Circuit breaker on collected edges.
    pub max_edges: usize,
    /// Edges below this confidence are not followed.
    pub min_confidence: f64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_depth: 20,
            max_nodes: 10_000,
            max_edges: 50_000,
            min_confidence: 0.0,
        }
    }
}

/// Impact analysis depth and risk classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub default_depth: usize,
    /// More downstream objects than this is MEDIUM.
    pub medium_threshold: usize,
    /// More downstream objects than this is HIGH.
    pub high_threshold: usize,
    /// More downstream objects than this is CRITICAL.
    pub critical_threshold: usize,
    /// Any downstream object in another database is at least HIGH.
    pub cross_database_is_high: bool,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            default_depth: 10,
            medium_threshold: 3,
            high_threshold: 10,
            critical_threshold: 50,
            cross_database_is_high: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub default_max_hops: usize,
    /// Upper bound on the number of shortest paths returned.
    pub max_paths: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            default_max_hops: 10,
            max_paths: 50,
        }
    }
}

/// Evidence weighting and filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub sql_parse_confidence: f64,
    pub query_history_confidence: f64,
    pub manifest_confidence: f64,
    /// Query-history statements at or below this many characters are skipped.
    pub min_query_length: usize,
    /// Evidence text stored on edges is truncated to this many characters.
    pub evidence_max_chars: usize,
    pub default_dialect: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sql_parse_confidence: 1.0,
            query_history_confidence: 1.0,
            manifest_confidence: 1.0,
            min_query_length: 10,
            evidence_max_chars: 1000,
            default_dialect: "snowflake".to_string(),
        }
    }
}

impl IngestConfig {
    /// Confidence applied to query-history evidence, never above the
    /// SQL_PARSE confidence even when the config was built without
    /// [`LineageConfig::validate`].
    pub fn effective_query_history_confidence(&self) -> f64 {
        self.query_history_confidence.min(self.sql_parse_confidence)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot the graph is loaded from and saved to.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
