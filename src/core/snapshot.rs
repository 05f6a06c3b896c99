use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

use super::graph::{LineageObject, LineageRelationship, Metadata, ObjectType, Origin, TransformKind};
use super::store::{GraphReader, InMemoryGraphStore};
use crate::error::{LineageError, Result};

const SNAPSHOT_VERSION: u32 = 1;

/// Persisted node row. Metadata travels as JSON text because bincode cannot
/// encode self-describing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotNode {
    object_id: String,
    object_name: String,
    object_type: ObjectType,
    database: String,
    schema: String,
    column: Option<String>,
    parent_object_id: Option<String>,
    metadata_json: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEdge {
    edge_id: String,
    source_id: String,
    target_id: String,
    transform_kind: TransformKind,
    confidence: f64,
    origin: Origin,
    origins: BTreeSet<Origin>,
    observed_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    evidence: Option<String>,
    evidence_origin: Option<Origin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    written_at: DateTime<Utc>,
    nodes: Vec<SnapshotNode>,
    edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    pub nodes: usize,
    pub edges: usize,
}

impl SnapshotNode {
    fn from_object(node: LineageObject) -> Result<Self> {
        Ok(Self {
            metadata_json: serde_json::to_string(&node.metadata)?,
            object_id: node.object_id,
            object_name: node.object_name,
            object_type: node.object_type,
            database: node.database,
            schema: node.schema,
            column: node.column,
            parent_object_id: node.parent_object_id,
            first_seen_at: node.first_seen_at,
            last_seen_at: node.last_seen_at,
        })
    }

    fn into_object(self) -> Result<LineageObject> {
        let metadata: Metadata = serde_json::from_str(&self.metadata_json)?;
        Ok(LineageObject {
            object_id: self.object_id,
            object_name: self.object_name,
            object_type: self.object_type,
            database: self.database,
            schema: self.schema,
            column: self.column,
            parent_object_id: self.parent_object_id,
            metadata,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        })
    }
}

impl From<LineageRelationship> for SnapshotEdge {
    fn from(edge: LineageRelationship) -> Self {
        Self {
            edge_id: edge.edge_id,
            source_id: edge.source_id,
            target_id: edge.target_id,
            transform_kind: edge.transform_kind,
            confidence: edge.confidence,
            origin: edge.origin,
            origins: edge.origins,
            observed_at: edge.observed_at,
            last_seen_at: edge.last_seen_at,
            evidence: edge.evidence,
            evidence_origin: edge.evidence_origin,
        }
    }
}

impl From<SnapshotEdge> for LineageRelationship {
    fn from(edge: SnapshotEdge) -> Self {
        Self {
            edge_id: edge.edge_id,
            source_id: edge.source_id,
            target_id: edge.target_id,
            transform_kind: edge.transform_kind,
            confidence: edge.confidence,
            origin: edge.origin,
            origins: edge.origins,
            observed_at: edge.observed_at,
            last_seen_at: edge.last_seen_at,
            evidence: edge.evidence,
            evidence_origin: edge.evidence_origin,
        }
    }
}

/// Write every node and edge of `reader` to `path`.
pub fn save_snapshot<R: GraphReader + ?Sized>(reader: &R, path: &Path) -> Result<SnapshotStats> {
    let nodes = reader
        .nodes()?
        .into_iter()
        .map(SnapshotNode::from_object)
        .collect::<Result<Vec<_>>>()?;
    let edges: Vec<SnapshotEdge> = reader.edges()?.into_iter().map(SnapshotEdge::from).collect();

    let stats = SnapshotStats {
        nodes: nodes.len(),
        edges: edges.len(),
    };
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        written_at: Utc::now(),
        nodes,
        edges,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = bincode::serialize(&file)?;
    let staging = path.with_extension("partial");
    fs::write(&staging, data)?;
    fs::rename(&staging, path)?;

    info!(path = %path.display(), nodes = stats.nodes, edges = stats.edges, "Lineage snapshot written");
    Ok(stats)
}

/// Rehydrate a store from a snapshot written by [`save_snapshot`].
pub fn load_snapshot(path: &Path) -> Result<InMemoryGraphStore> {
    let data = fs::read(path)?;
    let file: SnapshotFile = bincode::deserialize(&data)?;
    if file.version != SNAPSHOT_VERSION {
        return Err(LineageError::Storage(format!(
            "unsupported snapshot version {} in {}",
            file.version,
            path.display()
        )));
    }

    let store = InMemoryGraphStore::new();
    let node_count = file.nodes.len();
    let edge_count = file.edges.len();
    for node in file.nodes {
        store.restore_node(node.into_object()?)?;
    }
    for edge in file.edges {
        store.restore_edge(edge.into())?;
    }

    info!(path = %path.display(), nodes = node_count, edges = edge_count, "Lineage snapshot loaded");
    Ok(store)
}

/// Load `path` if it exists, otherwise start from an empty store.
pub fn load_or_default(path: &Path) -> Result<InMemoryGraphStore> {
    if path.exists() {
        load_snapshot(path)
    } else {
        Ok(InMemoryGraphStore::new())
    }
}
