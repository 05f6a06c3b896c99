//! Bounded, cycle-safe breadth-first expansion over the lineage graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::graph::{EdgeKey, LineageObject, LineageRelationship};
use super::store::GraphReader;
use crate::config::TraversalConfig;
use crate::error::{LineageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
    Both,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
            Direction::Both => "both",
        }
    }

    fn follows_outgoing(self) -> bool {
        matches!(self, Direction::Downstream | Direction::Both)
    }

    fn follows_incoming(self) -> bool {
        matches!(self, Direction::Upstream | Direction::Both)
    }
}

impl FromStr for Direction {
    type Err = LineageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstream" | "up" => Ok(Direction::Upstream),
            "downstream" | "down" => Ok(Direction::Downstream),
            "both" => Ok(Direction::Both),
            other => Err(LineageError::InvalidConfig {
                field: "direction".to_string(),
                reason: format!("unknown direction '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker and edge filter applied during expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversalLimits {
    pub max_nodes: usize,
    pub max_edges: usize,
    pub min_confidence: f64,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self::from(&TraversalConfig::default())
    }
}

impl From<&TraversalConfig> for TraversalLimits {
    fn from(config: &TraversalConfig) -> Self {
        Self {
            max_nodes: config.max_nodes,
            max_edges: config.max_edges,
            min_confidence: config.min_confidence,
        }
    }
}

/// Reachable subgraph within a hop budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Every node reached, seeds included, ordered by object id.
    pub nodes: Vec<LineageObject>,
    /// Every edge crossed, ordered by (source, target, transform).
    pub edges: Vec<LineageRelationship>,
    /// Number of expansion levels actually performed.
    pub depth_reached: usize,
    /// The circuit breaker stopped expansion early.
    pub truncated: bool,
    /// None of the requested seeds exist in the graph.
    pub no_matching_nodes: bool,
}

impl Subgraph {
    pub fn unmatched() -> Self {
        Self {
            no_matching_nodes: true,
            ..Default::default()
        }
    }

    pub fn contains_node(&self, object_id: &str) -> bool {
        self.nodes.iter().any(|node| node.object_id == object_id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.object_id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct TraversalEngine<'a, R: GraphReader + ?Sized> {
    reader: &'a R,
    limits: TraversalLimits,
}

impl<'a, R: GraphReader + ?Sized> TraversalEngine<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self {
            reader,
            limits: TraversalLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Expand level by level from `seeds`.
    ///
    /// Each id is expanded at most once, so the walk terminates on cyclic
    /// graphs. Expansion stops when the next frontier is empty, `max_depth`
    /// levels have been performed, or the circuit breaker trips. A
    /// `max_depth` of 0 is treated as 1.
    pub fn traverse(
        &self,
        seeds: &BTreeSet<String>,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Subgraph> {
        let max_depth = max_depth.max(1);

        let mut visited: BTreeSet<String> = BTreeSet::new();
        for seed in seeds {
            if self.reader.contains_node(seed)? {
                visited.insert(seed.clone());
            }
        }
        if visited.is_empty() {
            debug!(seeds = seeds.len(), "No traversal seed matches a lineage node");
            return Ok(Subgraph::unmatched());
        }

        let mut edges: BTreeMap<EdgeKey, LineageRelationship> = BTreeMap::new();
        let mut frontier: BTreeSet<String> = visited.clone();
        let mut depth = 0usize;
        let mut truncated = false;

        'levels: while depth < max_depth && !frontier.is_empty() {
            let mut next: BTreeSet<String> = BTreeSet::new();

            for current in &frontier {
                for edge in self.adjacent(current, direction)? {
                    if edge.confidence < self.limits.min_confidence {
                        continue;
                    }
                    let key = edge.key();
                    if edges.contains_key(&key) {
                        continue;
                    }

                    let neighbours = [&edge.source_id, &edge.target_id];
                    let unseen: Vec<&String> = neighbours
                        .into_iter()
                        .filter(|id| !visited.contains(*id) && !next.contains(*id))
                        .collect();

                    if visited.len() + next.len() + unseen.len() > self.limits.max_nodes
                        || edges.len() >= self.limits.max_edges
                    {
                        // Keep the partial level so every returned edge has both endpoints
                        truncated = true;
                        depth += 1;
                        visited.extend(next);
                        break 'levels;
                    }

                    for id in unseen {
                        next.insert(id.clone());
                    }
                    edges.insert(key, edge);
                }
            }

            depth += 1;
            visited.extend(next.iter().cloned());
            frontier = next;
        }

        if truncated {
            warn!(
                nodes = visited.len(),
                edges = edges.len(),
                depth,
                "Traversal circuit breaker tripped; returning partial lineage"
            );
        }

        let mut nodes = Vec::with_capacity(visited.len());
        for id in &visited {
            if let Some(node) = self.reader.node(id)? {
                nodes.push(node);
            }
        }

        debug!(
            direction = %direction,
            nodes = nodes.len(),
            edges = edges.len(),
            depth,
            "Traversal complete"
        );

        Ok(Subgraph {
            nodes,
            edges: edges.into_values().collect(),
            depth_reached: depth,
            truncated,
            no_matching_nodes: false,
        })
    }

    fn adjacent(&self, object_id: &str, direction: Direction) -> Result<Vec<LineageRelationship>> {
        let mut adjacent = Vec::new();
        if direction.follows_outgoing() {
            adjacent.extend(self.reader.outgoing(object_id)?);
        }
        if direction.follows_incoming() {
            adjacent.extend(self.reader.incoming(object_id)?);
        }
        Ok(adjacent)
    }
}

/// Returns [`LineageError::TraversalBoundExceeded`] for a truncated result,
/// for callers that prefer to treat truncation as a failure.
pub fn require_complete(subgraph: Subgraph) -> Result<Subgraph> {
    if subgraph.truncated {
        return Err(LineageError::TraversalBoundExceeded {
            nodes: subgraph.nodes.len(),
            edges: subgraph.edges.len(),
        });
    }
    Ok(subgraph)
}
