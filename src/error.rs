//! Error types for lineage ingestion and graph queries.
//!
//! Only [`LineageError::Storage`] is fatal. Identity and evidence errors are
//! recorded per record by the ingestion pipeline, and query-shaped operations
//! turn unknown objects and tripped circuit breakers into well-formed results.

use thiserror::Error;

/// Main error type for lineage operations.
#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Invalid object reference '{reference}': {reason}")]
    Identity { reference: String, reason: String },

    #[error("Evidence record could not be normalized: {0}")]
    EvidenceParse(String),

    #[error("No lineage node matches '{0}'")]
    UnknownObject(String),

    #[error("Traversal bound exceeded: {nodes} nodes, {edges} edges")]
    TraversalBoundExceeded { nodes: usize, edges: usize },

    #[error("Graph store unavailable: {0}")]
    Storage(String),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] bincode::Error),
}

impl LineageError {
    pub(crate) fn identity(reference: &str, reason: impl Into<String>) -> Self {
        LineageError::Identity {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error must surface to the caller instead of being
    /// recorded against a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LineageError::Storage(_))
    }
}

/// Result type alias for lineage operations.
pub type Result<T> = std::result::Result<T, LineageError>;
