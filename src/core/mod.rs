pub mod catalog;
pub mod graph;
pub mod identity;
pub mod impact;
pub mod paths;
pub mod pipeline;
pub mod scanner;
pub mod search;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod traversal;

pub use catalog::{ExportFilter, SchemaSummary, Scope};
pub use graph::{
    build_graph, EdgeKey, GraphBuilder, LineageGraph, LineageObject, LineageRelationship,
    Metadata, ObjectType, Origin, TransformKind,
};
pub use identity::{IdentityResolver, ObjectRef};
pub use impact::{ImpactAnalyzer, ImpactReport, RiskLevel, RiskSummary};
pub use paths::{LineagePath, PathFinder};
pub use pipeline::{IngestError, IngestErrorKind, IngestResult, IngestionPipeline};
pub use scanner::{EvidenceFile, EvidenceScanner};
pub use search::{SearchRequest, SearchResults};
pub use stats::LineageStats;
pub use store::{
    EdgeUpsert, GraphReader, GraphStore, InMemoryGraphStore, NodeUpsert, UpsertOutcome,
};
pub use traversal::{Direction, Subgraph, TraversalEngine, TraversalLimits};
