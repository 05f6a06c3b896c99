use chrono::{DateTime, Utc};
use petgraph::{graph::NodeIndex, Directed, Graph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::LineageError;

/// Open key/value metadata attached to a node. Last writer wins per key.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    #[default]
    Table,
    View,
    MaterializedView,
    Column,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
            ObjectType::MaterializedView => "MATERIALIZED_VIEW",
            ObjectType::Column => "COLUMN",
        }
    }

    /// Tables, views and materialized views all count as relations.
    pub fn is_relation(self) -> bool {
        !matches!(self, ObjectType::Column)
    }
}

impl FromStr for ObjectType {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "TABLE" | "BASE_TABLE" => Ok(ObjectType::Table),
            "VIEW" => Ok(ObjectType::View),
            "MATERIALIZED_VIEW" => Ok(ObjectType::MaterializedView),
            "COLUMN" => Ok(ObjectType::Column),
            other => Err(LineageError::EvidenceParse(format!(
                "unknown object type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformKind {
    Identity,
    Cast,
    Aggregate,
    Filter,
    Join,
    Union,
    Window,
    Case,
    Udf,
    Unknown,
    Dependency,
}

impl TransformKind {
    pub const ALL: [TransformKind; 11] = [
        TransformKind::Identity,
        TransformKind::Cast,
        TransformKind::Aggregate,
        TransformKind::Filter,
        TransformKind::Join,
        TransformKind::Union,
        TransformKind::Window,
        TransformKind::Case,
        TransformKind::Udf,
        TransformKind::Unknown,
        TransformKind::Dependency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransformKind::Identity => "IDENTITY",
            TransformKind::Cast => "CAST",
            TransformKind::Aggregate => "AGGREGATE",
            TransformKind::Filter => "FILTER",
            TransformKind::Join => "JOIN",
            TransformKind::Union => "UNION",
            TransformKind::Window => "WINDOW",
            TransformKind::Case => "CASE",
            TransformKind::Udf => "UDF",
            TransformKind::Unknown => "UNKNOWN",
            TransformKind::Dependency => "DEPENDENCY",
        }
    }
}

impl FromStr for TransformKind {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if let Some(kind) = TransformKind::ALL
            .iter()
            .find(|kind| kind.as_str() == normalized)
        {
            return Ok(*kind);
        }
        // Labels emitted by older extractors
        match normalized.as_str() {
            "" | "LINEAGE" | "COLUMN_LINEAGE" => Ok(TransformKind::Unknown),
            "DBT_DEPENDENCY" => Ok(TransformKind::Dependency),
            other => Err(LineageError::EvidenceParse(format!(
                "unknown transform kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an observation. Declaration order is display priority:
/// parsed SQL outranks manifests, which outrank query history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    SqlParse,
    Manifest,
    QueryHistory,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::SqlParse => "SQL_PARSE",
            Origin::Manifest => "MANIFEST",
            Origin::QueryHistory => "QUERY_HISTORY",
        }
    }

    /// Highest-priority origin of a set, if any.
    pub fn highest(origins: &BTreeSet<Origin>) -> Option<Origin> {
        origins.iter().next().copied()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical warehouse object: a relation or one of its columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageObject {
    pub object_id: String,
    pub object_name: String,
    pub object_type: ObjectType,
    pub database: String,
    pub schema: String,
    pub column: Option<String>,
    /// Owning table of a column node. Lookup only.
    pub parent_object_id: Option<String>,
    pub metadata: Metadata,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl LineageObject {
    pub fn is_column(&self) -> bool {
        self.column.is_some()
    }
}

/// Deduplication key of an edge. Origin is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source_id: String,
    pub target_id: String,
    pub transform_kind: TransformKind,
}

/// A derivation relationship between two objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageRelationship {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub transform_kind: TransformKind,
    pub confidence: f64,
    /// Display origin: the highest-priority entry of `origins`.
    pub origin: Origin,
    /// Every origin that has reported this relationship.
    pub origins: BTreeSet<Origin>,
    pub observed_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub evidence: Option<String>,
    /// Origin that contributed `evidence`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_origin: Option<Origin>,
}

impl LineageRelationship {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            transform_kind: self.transform_kind,
        }
    }
}

pub type LineageGraph = Graph<LineageObject, LineageRelationship, Directed>;

/// Builds a petgraph view over a set of nodes and edges for formatting and
/// structural analysis.
pub struct GraphBuilder {
    graph: LineageGraph,
    node_map: HashMap<String, NodeIndex>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: Graph::with_capacity(nodes, edges),
            node_map: HashMap::with_capacity(nodes),
        }
    }

    pub fn add_node(&mut self, node: LineageObject) -> NodeIndex {
        if let Some(index) = self.node_map.get(&node.object_id) {
            return *index;
        }
        let id = node.object_id.clone();
        let index = self.graph.add_node(node);
        self.node_map.insert(id, index);
        index
    }

    /// Returns `None` when either endpoint has not been added.
    pub fn add_edge(
        &mut self,
        edge: LineageRelationship,
    ) -> Option<petgraph::graph::EdgeIndex> {
        let source_idx = self.node_map.get(&edge.source_id)?;
        let target_idx = self.node_map.get(&edge.target_id)?;
        Some(self.graph.add_edge(*source_idx, *target_idx, edge))
    }

    pub fn build(self) -> LineageGraph {
        self.graph
    }

    pub fn get_node_index(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a petgraph graph from owned nodes and edges. Edges whose
/// endpoints are not among `nodes` are dropped.
pub fn build_graph(nodes: Vec<LineageObject>, edges: Vec<LineageRelationship>) -> LineageGraph {
    let mut builder = GraphBuilder::with_capacity(nodes.len(), edges.len());
    for node in nodes {
        builder.add_node(node);
    }
    for edge in edges {
        builder.add_edge(edge);
    }
    builder.build()
}
