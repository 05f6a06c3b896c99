//! Query and ingestion surface consumed by the CLI and other presentation
//! layers. Every query returns pure data; malformed or unknown references
//! produce an empty, well-formed answer instead of an error. Only storage
//! failures surface as `Err`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LineageConfig;
use crate::core::catalog::{self, ExportFilter, SchemaSummary, Scope};
use crate::core::identity::IdentityResolver;
use crate::core::impact::{ImpactAnalyzer, ImpactReport};
use crate::core::paths::{LineagePath, PathFinder};
use crate::core::pipeline::{IngestResult, IngestionPipeline};
use crate::core::search::{self, SearchRequest, SearchResults};
use crate::core::snapshot::{self, SnapshotStats};
use crate::core::stats::{self, LineageStats};
use crate::core::store::{GraphReader, GraphStore, InMemoryGraphStore};
use crate::core::traversal::{Direction, Subgraph, TraversalEngine, TraversalLimits};
use crate::core::{build_graph, LineageGraph};
use crate::error::{LineageError, Result};
use crate::evidence::{EvidenceBatch, SqlParser};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageResponse {
    pub reference: String,
    pub direction: Direction,
    pub depth: usize,
    /// Canonical id the reference resolved to.
    pub object_id: Option<String>,
    /// Why the reference was not accepted, if it was not.
    pub rejected: Option<String>,
    #[serde(flatten)]
    pub subgraph: Subgraph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResponse {
    pub reference: String,
    pub depth: usize,
    pub object_id: Option<String>,
    pub rejected: Option<String>,
    #[serde(flatten)]
    pub report: ImpactReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResponse {
    pub source: String,
    pub target: String,
    pub max_hops: usize,
    pub rejected: Option<String>,
    pub paths: Vec<LineagePath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemasResponse {
    pub database: String,
    pub rejected: Option<String>,
    pub schemas: Vec<SchemaSummary>,
}

pub struct LineageService<S: GraphStore + GraphReader> {
    store: Arc<S>,
    config: LineageConfig,
    pipeline: IngestionPipeline<S>,
    resolver: IdentityResolver,
}

impl<S: GraphStore + GraphReader> LineageService<S> {
    pub fn new(store: Arc<S>, config: LineageConfig) -> Self {
        let pipeline = IngestionPipeline::new(Arc::clone(&store), config.ingest.clone());
        Self {
            store,
            config,
            pipeline,
            resolver: IdentityResolver::new(),
        }
    }

    pub fn with_sql_parser(mut self, parser: Arc<dyn SqlParser>) -> Self {
        self.pipeline = self.pipeline.with_sql_parser(parser);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    pub fn ingest_evidence(&self, batch: &EvidenceBatch) -> Result<IngestResult> {
        self.pipeline.ingest(batch)
    }

    pub fn ingest_sql(&self, sql_text: &str, dialect: Option<&str>) -> Result<IngestResult> {
        self.pipeline.ingest_sql(sql_text, dialect)
    }

    /// Lineage around one object. `include_columns` widens a table seed to
    /// the table plus its column nodes.
    pub fn get_object_lineage(
        &self,
        object_ref: &str,
        direction: Direction,
        depth: Option<usize>,
        include_columns: bool,
    ) -> Result<LineageResponse> {
        let depth = self.clamp_depth(depth.unwrap_or(self.config.traversal.default_depth));
        let mut response = LineageResponse {
            reference: object_ref.to_string(),
            direction,
            depth,
            object_id: None,
            rejected: None,
            subgraph: Subgraph::unmatched(),
        };

        let object_id = match self.resolve(object_ref) {
            Ok(object_id) => object_id,
            Err(reason) => {
                response.rejected = Some(reason);
                return Ok(response);
            }
        };

        let seeds = self.seeds(&object_id, include_columns)?;
        response.subgraph = TraversalEngine::new(self.store.as_ref())
            .with_limits(self.limits())
            .traverse(&seeds, direction, depth)?;
        response.object_id = Some(object_id);
        Ok(response)
    }

    /// Downstream impact of changing one object. Table references always
    /// include their columns.
    pub fn get_impact(&self, object_ref: &str, depth: Option<usize>) -> Result<ImpactResponse> {
        let depth = depth
            .unwrap_or(self.config.impact.default_depth)
            .clamp(1, self.impact_depth_ceiling());
        let analyzer = ImpactAnalyzer::new(self.store.as_ref(), self.config.impact.clone())
            .with_limits(self.limits());

        let (object_id, rejected, seeds) = match self.resolve(object_ref) {
            Ok(object_id) => {
                let seeds = self.seeds(&object_id, true)?;
                (Some(object_id), None, seeds)
            }
            Err(reason) => (None, Some(reason), BTreeSet::new()),
        };

        let report = analyzer.impact(&seeds, Some(depth))?;
        Ok(ImpactResponse {
            reference: object_ref.to_string(),
            depth,
            object_id,
            rejected,
            report,
        })
    }

    pub fn get_path(
        &self,
        source_ref: &str,
        target_ref: &str,
        max_hops: Option<usize>,
    ) -> Result<PathResponse> {
        let max_hops = max_hops
            .unwrap_or(self.config.paths.default_max_hops)
            .clamp(1, self.config.traversal.max_depth.max(self.config.paths.default_max_hops));
        let mut response = PathResponse {
            source: source_ref.to_string(),
            target: target_ref.to_string(),
            max_hops,
            rejected: None,
            paths: Vec::new(),
        };

        let (source_id, target_id) = match (self.resolve(source_ref), self.resolve(target_ref)) {
            (Ok(source_id), Ok(target_id)) => (source_id, target_id),
            (Err(reason), _) | (_, Err(reason)) => {
                response.rejected = Some(reason);
                return Ok(response);
            }
        };

        response.paths = PathFinder::new(self.store.as_ref())
            .with_min_confidence(self.config.traversal.min_confidence)
            .with_max_paths(self.config.paths.max_paths)
            .find_paths(&source_id, &target_id, max_hops)?;
        Ok(response)
    }

    pub fn stats(&self) -> Result<LineageStats> {
        stats::collect_stats(self.store.as_ref())
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        search::search(self.store.as_ref(), request)
    }

    /// Schemas of one database that hold lineage, with their counts.
    pub fn database_schemas(&self, database: &str) -> Result<SchemasResponse> {
        let mut response = SchemasResponse {
            database: database.to_string(),
            rejected: None,
            schemas: Vec::new(),
        };
        match Scope::parse(database) {
            Ok(Scope {
                database: resolved,
                schema: None,
            }) => {
                response.schemas = catalog::database_schemas(self.store.as_ref(), &resolved)?;
            }
            Ok(_) => response.rejected = Some(format!("'{database}' names a schema, not a database")),
            Err(err) => {
                warn!(database, error = %err, "Rejected database name");
                response.rejected = Some(err.to_string());
            }
        }
        Ok(response)
    }

    /// Graph selected by `filter` as a petgraph snapshot, for export.
    pub fn export_graph(&self, filter: &ExportFilter) -> Result<LineageGraph> {
        let (nodes, edges) = catalog::select_for_export(self.store.as_ref(), filter)?;
        info!(
            nodes = nodes.len(),
            edges = edges.len(),
            min_confidence = filter.min_confidence,
            "Selected graph for export"
        );
        Ok(build_graph(nodes, edges))
    }

    fn resolve(&self, object_ref: &str) -> std::result::Result<String, String> {
        match self.resolver.resolve(object_ref) {
            Ok(object_ref) => Ok(object_ref.object_id()),
            Err(err @ LineageError::Identity { .. }) => {
                warn!(reference = object_ref, error = %err, "Rejected object reference");
                Err(err.to_string())
            }
            Err(err) => Err(err.to_string()),
        }
    }

    fn seeds(&self, object_id: &str, include_columns: bool) -> Result<BTreeSet<String>> {
        let mut seeds = BTreeSet::from([object_id.to_string()]);
        if include_columns {
            seeds.extend(self.store.columns_of(object_id)?);
        }
        Ok(seeds)
    }

    fn limits(&self) -> TraversalLimits {
        TraversalLimits::from(&self.config.traversal)
    }

    fn clamp_depth(&self, depth: usize) -> usize {
        depth.clamp(1, self.config.traversal.max_depth.max(1))
    }

    fn impact_depth_ceiling(&self) -> usize {
        self.config
            .traversal
            .max_depth
            .max(self.config.impact.default_depth)
    }
}

impl LineageService<InMemoryGraphStore> {
    /// Open a service over the snapshot at `path`, or over an empty store if
    /// the file does not exist yet.
    pub fn open(path: &Path, config: LineageConfig) -> Result<Self> {
        let store = snapshot::load_or_default(path)?;
        info!(path = %path.display(), "Opened lineage store");
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn in_memory(config: LineageConfig) -> Self {
        Self::new(Arc::new(InMemoryGraphStore::new()), config)
    }

    pub fn save(&self, path: &Path) -> Result<SnapshotStats> {
        snapshot::save_snapshot(self.store.as_ref(), path)
    }

    /// Close the underlying store. Every later call fails with
    /// [`LineageError::Storage`].
    pub fn close(&self) {
        self.store.close();
        info!("Closed lineage store");
    }
}
