use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::graph::TransformKind;
use super::store::GraphReader;
use crate::error::Result;

/// A shortest downstream route between two objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineagePath {
    pub nodes_in_order: Vec<String>,
    pub hop_count: usize,
    /// Weakest hop along the path.
    pub confidence: f64,
    /// Kind of the strongest edge of each hop.
    pub transformations: Vec<TransformKind>,
    /// Every kind linking each hop, sorted.
    #[serde(default)]
    pub hop_transformations: Vec<BTreeSet<TransformKind>>,
}

struct Hop {
    confidence: f64,
    strongest: TransformKind,
    kinds: BTreeSet<TransformKind>,
}

pub struct PathFinder<'a, R: GraphReader + ?Sized> {
    reader: &'a R,
    min_confidence: f64,
    max_paths: usize,
}

impl<'a, R: GraphReader + ?Sized> PathFinder<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self {
            reader,
            min_confidence: 0.0,
            max_paths: 50,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths.max(1);
        self
    }

    /// All shortest paths from `source_id` to `target_id` following
    /// downstream edges, within `max_hops`.
    ///
    /// Breadth-first levels assign each node its parents only at the level
    /// where it is first discovered, so no path revisits a node and every
    /// path returned has the minimal hop count.
    pub fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_hops: usize,
    ) -> Result<Vec<LineagePath>> {
        if !self.reader.contains_node(source_id)? || !self.reader.contains_node(target_id)? {
            return Ok(Vec::new());
        }
        if source_id == target_id {
            return Ok(vec![LineagePath {
                nodes_in_order: vec![source_id.to_string()],
                hop_count: 0,
                confidence: 1.0,
                transformations: Vec::new(),
                hop_transformations: Vec::new(),
            }]);
        }

        let mut parents: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut hops: HashMap<(String, String), Hop> = HashMap::new();
        let mut visited: BTreeSet<String> = BTreeSet::from([source_id.to_string()]);
        let mut frontier: BTreeSet<String> = visited.clone();
        let mut found = false;

        for _level in 0..max_hops {
            let mut next: BTreeSet<String> = BTreeSet::new();

            for current in &frontier {
                for edge in self.reader.outgoing(current)? {
                    if edge.confidence < self.min_confidence || visited.contains(&edge.target_id) {
                        continue;
                    }
                    next.insert(edge.target_id.clone());
                    parents
                        .entry(edge.target_id.clone())
                        .or_default()
                        .insert(current.clone());

                    let hop = hops
                        .entry((current.clone(), edge.target_id.clone()))
                        .or_insert_with(|| Hop {
                            confidence: edge.confidence,
                            strongest: edge.transform_kind,
                            kinds: BTreeSet::new(),
                        });
                    if edge.confidence > hop.confidence {
                        hop.confidence = edge.confidence;
                        hop.strongest = edge.transform_kind;
                    }
                    hop.kinds.insert(edge.transform_kind);
                }
            }

            if next.contains(target_id) {
                found = true;
                break;
            }
            if next.is_empty() {
                break;
            }
            visited.extend(next.iter().cloned());
            frontier = next;
        }

        if !found {
            debug!(source = source_id, target = target_id, max_hops, "No lineage path found");
            return Ok(Vec::new());
        }

        let mut reversed: Vec<Vec<String>> = Vec::new();
        let mut trail = vec![target_id.to_string()];
        self.collect_routes(source_id, &parents, &mut trail, &mut reversed);

        let mut paths: BTreeMap<Vec<String>, LineagePath> = BTreeMap::new();
        for mut route in reversed {
            route.reverse();
            let mut confidence: f64 = 1.0;
            let mut transformations = Vec::with_capacity(route.len().saturating_sub(1));
            let mut hop_transformations = Vec::with_capacity(route.len().saturating_sub(1));
            for pair in route.windows(2) {
                if let Some(hop) = hops.get(&(pair[0].clone(), pair[1].clone())) {
                    confidence = confidence.min(hop.confidence);
                    transformations.push(hop.strongest);
                    hop_transformations.push(hop.kinds.clone());
                }
            }
            let hop_count = route.len() - 1;
            paths.insert(
                route.clone(),
                LineagePath {
                    nodes_in_order: route,
                    hop_count,
                    confidence,
                    transformations,
                    hop_transformations,
                },
            );
        }

        Ok(paths.into_values().collect())
    }

    fn collect_routes(
        &self,
        source_id: &str,
        parents: &HashMap<String, BTreeSet<String>>,
        trail: &mut Vec<String>,
        routes: &mut Vec<Vec<String>>,
    ) {
        if routes.len() >= self.max_paths {
            return;
        }
        let Some(current) = trail.last().cloned() else {
            return;
        };
        if current == source_id {
            routes.push(trail.clone());
            return;
        }
        if let Some(candidates) = parents.get(&current) {
            for parent in candidates {
                trail.push(parent.clone());
                self.collect_routes(source_id, parents, trail, routes);
                trail.pop();
                if routes.len() >= self.max_paths {
                    return;
                }
            }
        }
    }
}
