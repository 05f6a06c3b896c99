use chrono::{DateTime, Utc};
use petgraph::algo::tarjan_scc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::graph::{build_graph, LineageRelationship};
use super::store::GraphReader;
use crate::error::Result;

/// Confidence histogram buckets as `(label, lower bound)`, highest first.
const CONFIDENCE_BUCKETS: [(&str, f64); 4] = [
    ("0.9-1.0", 0.9),
    ("0.7-0.9", 0.7),
    ("0.5-0.7", 0.5),
    ("0.0-0.5", 0.0),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: BTreeMap<String, usize>,
    pub transformation_types: BTreeMap<String, usize>,
    pub origins: BTreeMap<String, usize>,
    pub confidence_distribution: BTreeMap<String, usize>,
    /// Strongly connected components with more than one node, or a self-loop.
    pub cycles: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

fn confidence_bucket(edge: &LineageRelationship) -> &'static str {
    CONFIDENCE_BUCKETS
        .iter()
        .find(|(_, lower)| edge.confidence >= *lower)
        .map(|(label, _)| *label)
        .unwrap_or("0.0-0.5")
}

pub fn collect_stats<R: GraphReader + ?Sized>(reader: &R) -> Result<LineageStats> {
    let nodes = reader.nodes()?;
    let edges = reader.edges()?;

    let mut stats = LineageStats {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        last_updated: nodes.iter().map(|node| node.last_seen_at).max(),
        ..Default::default()
    };

    for node in &nodes {
        *stats
            .node_types
            .entry(node.object_type.as_str().to_string())
            .or_default() += 1;
    }

    for edge in &edges {
        *stats
            .transformation_types
            .entry(edge.transform_kind.as_str().to_string())
            .or_default() += 1;
        for origin in &edge.origins {
            *stats.origins.entry(origin.as_str().to_string()).or_default() += 1;
        }
        *stats
            .confidence_distribution
            .entry(confidence_bucket(edge).to_string())
            .or_default() += 1;
    }

    let self_loops = edges
        .iter()
        .filter(|edge| edge.source_id == edge.target_id)
        .map(|edge| edge.source_id.clone())
        .collect::<std::collections::BTreeSet<_>>();

    let graph = build_graph(nodes, edges);
    stats.cycles = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .and_then(|index| graph.node_weight(*index))
                    .map(|node| self_loops.contains(&node.object_id))
                    .unwrap_or(false)
        })
        .count();

    Ok(stats)
}
