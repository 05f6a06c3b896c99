//! Node and edge storage with idempotent, order-independent merge.
//!
//! Every upsert is atomic per row (one DashMap entry) and the merge rules are
//! commutative, so concurrent ingestion of different batches converges on the
//! same graph without a store-wide lock. Readers may observe a graph that is
//! partway through a batch.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use super::graph::{
    EdgeKey, LineageObject, LineageRelationship, Metadata, ObjectType, Origin, TransformKind,
};
use super::identity::ObjectRef;
use crate::error::{LineageError, Result};

/// Incoming observation of an object.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub object_ref: ObjectRef,
    /// Relation kind hint. Ignored for column references.
    pub object_type: Option<ObjectType>,
    pub metadata: Metadata,
    pub seen_at: DateTime<Utc>,
}

/// Incoming observation of a relationship between two resolved objects.
#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub source_id: String,
    pub target_id: String,
    pub transform_kind: TransformKind,
    pub confidence: f64,
    pub origin: Origin,
    pub observed_at: DateTime<Utc>,
    pub evidence: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl EdgeUpsert {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            transform_kind: self.transform_kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

/// Write side of the graph. The only two mutations the rest of the crate
/// performs.
pub trait GraphStore: Send + Sync {
    fn upsert_node(&self, node: NodeUpsert) -> Result<UpsertOutcome>;
    fn upsert_edge(&self, edge: EdgeUpsert) -> Result<UpsertOutcome>;
}

/// Read side of the graph used by traversal, impact and path queries.
pub trait GraphReader: Send + Sync {
    fn node(&self, object_id: &str) -> Result<Option<LineageObject>>;
    /// Edges whose `source_id` is `object_id`, in key order.
    fn outgoing(&self, object_id: &str) -> Result<Vec<LineageRelationship>>;
    /// Edges whose `target_id` is `object_id`, in key order.
    fn incoming(&self, object_id: &str) -> Result<Vec<LineageRelationship>>;
    /// Column node ids owned by a relation, sorted.
    fn columns_of(&self, table_id: &str) -> Result<Vec<String>>;
    fn nodes(&self) -> Result<Vec<LineageObject>>;
    fn edges(&self) -> Result<Vec<LineageRelationship>>;
    fn node_count(&self) -> Result<usize>;
    fn edge_count(&self) -> Result<usize>;

    fn contains_node(&self, object_id: &str) -> Result<bool> {
        Ok(self.node(object_id)?.is_some())
    }
}

/// Deterministic opaque id for an edge key.
pub fn edge_id_for(key: &EdgeKey) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("edge_{:016x}", hasher.finish())
}

/// Concurrent in-memory graph store.
pub struct InMemoryGraphStore {
    nodes: DashMap<String, LineageObject>,
    edges: DashMap<EdgeKey, LineageRelationship>,
    outgoing: DashMap<String, BTreeSet<EdgeKey>>,
    incoming: DashMap<String, BTreeSet<EdgeKey>>,
    children: DashMap<String, BTreeSet<String>>,
    closed: AtomicBool,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            outgoing: DashMap::new(),
            incoming: DashMap::new(),
            children: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Mark the store closed. Every later operation fails with
    /// [`LineageError::Storage`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LineageError::Storage("graph store is closed".to_string()));
        }
        Ok(())
    }

    /// Merge a fully materialized node, e.g. from a snapshot.
    pub fn restore_node(&self, node: LineageObject) -> Result<()> {
        self.ensure_open()?;
        if let Some(parent) = &node.parent_object_id {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(node.object_id.clone());
        }
        self.nodes
            .entry(node.object_id.clone())
            .and_modify(|existing| {
                existing.first_seen_at = existing.first_seen_at.min(node.first_seen_at);
                existing.last_seen_at = existing.last_seen_at.max(node.last_seen_at);
                existing.object_type = existing.object_type.max(node.object_type);
                for (key, value) in &node.metadata {
                    existing.metadata.insert(key.clone(), value.clone());
                }
            })
            .or_insert(node);
        Ok(())
    }

    /// Merge a fully materialized edge, e.g. from a snapshot.
    pub fn restore_edge(&self, edge: LineageRelationship) -> Result<()> {
        self.ensure_open()?;
        self.ensure_endpoints(&edge.source_id, &edge.target_id)?;
        let key = edge.key();
        self.edges
            .entry(key.clone())
            .and_modify(|existing| {
                existing.confidence = existing.confidence.max(edge.confidence);
                existing.observed_at = existing.observed_at.max(edge.observed_at);
                existing.last_seen_at = existing.last_seen_at.max(edge.last_seen_at);
                existing.origins.extend(edge.origins.iter().copied());
                existing.origins.insert(edge.origin);
                if let Some(origin) = Origin::highest(&existing.origins) {
                    existing.origin = origin;
                }
                if let (Some(text), Some(origin)) = (&edge.evidence, edge.evidence_origin) {
                    merge_evidence(existing, origin, text);
                }
            })
            .or_insert_with(|| edge.clone());
        self.index_edge(key);
        Ok(())
    }

    fn ensure_endpoints(&self, source_id: &str, target_id: &str) -> Result<()> {
        for id in [source_id, target_id] {
            if !self.nodes.contains_key(id) {
                return Err(LineageError::UnknownObject(id.to_string()));
            }
        }
        Ok(())
    }

    fn index_edge(&self, key: EdgeKey) {
        self.outgoing
            .entry(key.source_id.clone())
            .or_default()
            .insert(key.clone());
        self.incoming
            .entry(key.target_id.clone())
            .or_default()
            .insert(key);
    }

    fn collect_edges(&self, keys: Vec<EdgeKey>) -> Vec<LineageRelationship> {
        keys.iter()
            .filter_map(|key| self.edges.get(key).map(|edge| edge.clone()))
            .collect()
    }

    /// Most recent `last_seen_at` across all nodes.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.nodes.iter().map(|node| node.last_seen_at).max()
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Evidence text converges on the lowest `(origin, text)` pair seen, so the
/// result does not depend on arrival order.
fn merge_evidence(existing: &mut LineageRelationship, origin: Origin, text: &str) {
    let replace = match (&existing.evidence, existing.evidence_origin) {
        (Some(current), Some(current_origin)) => {
            (origin, text) < (current_origin, current.as_str())
        }
        _ => true,
    };
    if replace {
        existing.evidence = Some(text.to_string());
        existing.evidence_origin = Some(origin);
    }
}

impl GraphStore for InMemoryGraphStore {
    fn upsert_node(&self, node: NodeUpsert) -> Result<UpsertOutcome> {
        self.ensure_open()?;

        let NodeUpsert {
            object_ref,
            object_type,
            metadata,
            seen_at,
        } = node;

        let object_id = object_ref.object_id();
        let object_type = if object_ref.is_column() {
            ObjectType::Column
        } else {
            object_type
                .filter(|kind| kind.is_relation())
                .unwrap_or(ObjectType::Table)
        };
        let parent_object_id = object_ref.is_column().then(|| object_ref.table_id());

        if let Some(parent) = &parent_object_id {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(object_id.clone());
        }

        let mut outcome = UpsertOutcome::Merged;
        self.nodes
            .entry(object_id.clone())
            .and_modify(|existing| {
                existing.last_seen_at = existing.last_seen_at.max(seen_at);
                existing.object_type = existing.object_type.max(object_type);
                for (key, value) in &metadata {
                    existing.metadata.insert(key.clone(), value.clone());
                }
            })
            .or_insert_with(|| {
                outcome = UpsertOutcome::Inserted;
                LineageObject {
                    object_id: object_id.clone(),
                    object_name: object_ref.object_name().to_string(),
                    object_type,
                    database: object_ref.database.clone(),
                    schema: object_ref.schema.clone(),
                    column: object_ref.column.clone(),
                    parent_object_id,
                    metadata: metadata.clone(),
                    first_seen_at: seen_at,
                    last_seen_at: seen_at,
                }
            });

        Ok(outcome)
    }

    fn upsert_edge(&self, edge: EdgeUpsert) -> Result<UpsertOutcome> {
        self.ensure_open()?;

        if !edge.confidence.is_finite() {
            return Err(LineageError::EvidenceParse(format!(
                "confidence {} is not a finite number",
                edge.confidence
            )));
        }
        self.ensure_endpoints(&edge.source_id, &edge.target_id)?;

        let confidence = edge.confidence.clamp(0.0, 1.0);
        let key = edge.key();

        let mut outcome = UpsertOutcome::Merged;
        self.edges
            .entry(key.clone())
            .and_modify(|existing| {
                existing.confidence = existing.confidence.max(confidence);
                existing.observed_at = existing.observed_at.max(edge.observed_at);
                existing.last_seen_at = existing.last_seen_at.max(edge.seen_at);
                existing.origins.insert(edge.origin);
                if let Some(origin) = Origin::highest(&existing.origins) {
                    existing.origin = origin;
                }
                if let Some(text) = &edge.evidence {
                    merge_evidence(existing, edge.origin, text);
                }
            })
            .or_insert_with(|| {
                outcome = UpsertOutcome::Inserted;
                LineageRelationship {
                    edge_id: edge_id_for(&key),
                    source_id: edge.source_id.clone(),
                    target_id: edge.target_id.clone(),
                    transform_kind: edge.transform_kind,
                    confidence,
                    origin: edge.origin,
                    origins: BTreeSet::from([edge.origin]),
                    observed_at: edge.observed_at,
                    last_seen_at: edge.seen_at,
                    evidence: edge.evidence.clone(),
                    evidence_origin: edge.evidence.as_ref().map(|_| edge.origin),
                }
            });

        self.index_edge(key);
        Ok(outcome)
    }
}

impl GraphReader for InMemoryGraphStore {
    fn node(&self, object_id: &str) -> Result<Option<LineageObject>> {
        self.ensure_open()?;
        Ok(self.nodes.get(object_id).map(|node| node.clone()))
    }

    fn outgoing(&self, object_id: &str) -> Result<Vec<LineageRelationship>> {
        self.ensure_open()?;
        let keys: Vec<EdgeKey> = self
            .outgoing
            .get(object_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        Ok(self.collect_edges(keys))
    }

    fn incoming(&self, object_id: &str) -> Result<Vec<LineageRelationship>> {
        self.ensure_open()?;
        let keys: Vec<EdgeKey> = self
            .incoming
            .get(object_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        Ok(self.collect_edges(keys))
    }

    fn columns_of(&self, table_id: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .children
            .get(table_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn nodes(&self) -> Result<Vec<LineageObject>> {
        self.ensure_open()?;
        let mut nodes: Vec<LineageObject> =
            self.nodes.iter().map(|node| node.value().clone()).collect();
        nodes.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        Ok(nodes)
    }

    fn edges(&self) -> Result<Vec<LineageRelationship>> {
        self.ensure_open()?;
        let mut edges: Vec<LineageRelationship> =
            self.edges.iter().map(|edge| edge.value().clone()).collect();
        edges.sort_by_key(|edge| edge.key());
        Ok(edges)
    }

    fn node_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.edges.len())
    }
}
