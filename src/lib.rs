//! # TRIBUTARY
//!
//! Lineage evidence ingestion and graph traversal for data warehouses.
//!
//! TRIBUTARY merges noisy lineage evidence (parsed SQL, query history and
//! build-tool manifests) into a single graph of tables, views and columns,
//! then answers lineage, impact and path questions over it.
//!
//! ## Evidence Origins
//!
//! - **SQL_PARSE**: relationships extracted from SQL text by an external parser
//! - **MANIFEST**: declared model dependencies (dbt `manifest.json`)
//! - **QUERY_HISTORY**: relationships derived from executed warehouse queries
//!
//! ## Output Formats
//!
//! - **JSON**: compact or full graph export, query responses
//! - **Markdown**: readable lineage, impact and path reports

pub mod config;
pub mod core;
pub mod error;
pub mod evidence;
pub mod formatters;
pub mod logging;
pub mod service;

pub use config::LineageConfig;
pub use error::{LineageError, Result};
pub use service::{
    ImpactResponse, LineageResponse, LineageService, PathResponse, SchemasResponse,
};
