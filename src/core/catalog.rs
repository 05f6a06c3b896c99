use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::graph::{EdgeKey, LineageObject, LineageRelationship};
use super::identity::resolve_scope;
use super::store::GraphReader;
use crate::error::{LineageError, Result};

/// A database, or one schema of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub database: String,
    pub schema: Option<String>,
}

impl Scope {
    pub fn parse(raw: &str) -> Result<Self> {
        let (database, schema) = resolve_scope(raw)?;
        Ok(Self { database, schema })
    }

    pub fn contains(&self, node: &LineageObject) -> bool {
        node.database == self.database
            && self
                .schema
                .as_ref()
                .map_or(true, |schema| &node.schema == schema)
    }
}

/// Which part of the graph an export carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportFilter {
    /// Edges below this confidence are left out.
    pub min_confidence: f64,
    pub scope: Option<Scope>,
}

impl ExportFilter {
    pub fn new(min_confidence: f64, scope: Option<&str>) -> Result<Self> {
        if !min_confidence.is_finite() || !(0.0..=1.0).contains(&min_confidence) {
            return Err(LineageError::InvalidConfig {
                field: "export.min_confidence".to_string(),
                reason: format!("{min_confidence} is outside [0, 1]"),
            });
        }
        Ok(Self {
            min_confidence,
            scope: scope.map(Scope::parse).transpose()?,
        })
    }

    pub fn is_unfiltered(&self) -> bool {
        self.min_confidence <= 0.0 && self.scope.is_none()
    }
}

/// Nodes and edges selected by `filter`.
///
/// An edge is kept when it clears the confidence floor and at least one
/// endpoint is in scope. Out-of-scope endpoints of kept edges come along, so
/// every exported edge has both of its nodes.
pub fn select_for_export<R: GraphReader + ?Sized>(
    reader: &R,
    filter: &ExportFilter,
) -> Result<(Vec<LineageObject>, Vec<LineageRelationship>)> {
    let nodes = reader.nodes()?;
    let edges = reader.edges()?;
    if filter.is_unfiltered() {
        return Ok((nodes, edges));
    }

    let in_scope: BTreeSet<&str> = nodes
        .iter()
        .filter(|node| filter.scope.as_ref().map_or(true, |scope| scope.contains(node)))
        .map(|node| node.object_id.as_str())
        .collect();

    let kept_edges: Vec<LineageRelationship> = edges
        .into_iter()
        .filter(|edge| edge.confidence >= filter.min_confidence)
        .filter(|edge| {
            in_scope.contains(edge.source_id.as_str()) || in_scope.contains(edge.target_id.as_str())
        })
        .collect();

    let mut kept_ids: BTreeSet<String> = in_scope.iter().map(|id| id.to_string()).collect();
    for edge in &kept_edges {
        kept_ids.insert(edge.source_id.clone());
        kept_ids.insert(edge.target_id.clone());
    }

    let kept_nodes = nodes
        .into_iter()
        .filter(|node| kept_ids.contains(&node.object_id))
        .collect();
    Ok((kept_nodes, kept_edges))
}

/// Lineage held for one schema of a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub schema: String,
    pub relations: usize,
    pub columns: usize,
    /// Edges with at least one endpoint in the schema.
    pub edges: usize,
}

/// Schemas of `database` that hold lineage nodes, ordered by name.
pub fn database_schemas<R: GraphReader + ?Sized>(
    reader: &R,
    database: &str,
) -> Result<Vec<SchemaSummary>> {
    let mut summaries: BTreeMap<String, SchemaSummary> = BTreeMap::new();
    let mut edges: BTreeMap<String, BTreeSet<EdgeKey>> = BTreeMap::new();

    for node in reader.nodes()? {
        if node.database != database {
            continue;
        }
        let summary = summaries
            .entry(node.schema.clone())
            .or_insert_with(|| SchemaSummary {
                schema: node.schema.clone(),
                ..SchemaSummary::default()
            });
        if node.is_column() {
            summary.columns += 1;
        } else {
            summary.relations += 1;
        }

        let touching = edges.entry(node.schema.clone()).or_default();
        for edge in reader
            .outgoing(&node.object_id)?
            .into_iter()
            .chain(reader.incoming(&node.object_id)?)
        {
            touching.insert(edge.key());
        }
    }

    Ok(summaries
        .into_values()
        .map(|mut summary| {
            summary.edges = edges.get(&summary.schema).map_or(0, BTreeSet::len);
            summary
        })
        .collect())
}
