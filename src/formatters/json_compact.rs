use anyhow::Result;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::{build_graph, LineageGraph, ObjectType, Origin, Subgraph, TransformKind};

/// JSON formatter for lineage graphs, compact by default
pub struct JsonCompactFormatter {
    /// Include full node/edge detail or just the essentials
    minimal: bool,
}

impl JsonCompactFormatter {
    pub fn new() -> Self {
        Self { minimal: true }
    }

    pub fn full() -> Self {
        Self { minimal: false }
    }

    pub fn format_to_file(&self, graph: &LineageGraph, output_path: &Path) -> Result<()> {
        let json_content = self.format_graph(graph)?;
        fs::write(output_path, json_content)?;
        Ok(())
    }

    pub fn format_subgraph(&self, subgraph: &Subgraph) -> Result<String> {
        let graph = build_graph(subgraph.nodes.clone(), subgraph.edges.clone());
        let mut value: serde_json::Value = serde_json::from_str(&self.format_graph(&graph)?)?;
        value["meta"]["truncated"] = json!(subgraph.truncated);
        value["meta"]["no_matching_nodes"] = json!(subgraph.no_matching_nodes);
        value["meta"]["depth_reached"] = json!(subgraph.depth_reached);
        Ok(serde_json::to_string(&value)?)
    }

    pub fn format_graph(&self, graph: &LineageGraph) -> Result<String> {
        let node_indices: Vec<NodeIndex> = graph.node_indices().collect();

        let mut nodes = Vec::with_capacity(node_indices.len());
        let mut node_id_map = HashMap::with_capacity(node_indices.len());
        let mut database_map: HashMap<String, u16> = HashMap::new();

        // First pass: database dictionary
        for &idx in &node_indices {
            if let Some(node) = graph.node_weight(idx) {
                let next_id = database_map.len() as u16;
                database_map.entry(node.database.clone()).or_insert(next_id);
            }
        }

        for (position, &idx) in node_indices.iter().enumerate() {
            if let Some(node) = graph.node_weight(idx) {
                node_id_map.insert(idx, position);
                let database_id = database_map[&node.database];

                let node_json = if self.minimal {
                    json!({
                        "id": node.object_id,
                        "t": self.type_code(node.object_type),
                        "d": database_id
                    })
                } else {
                    json!({
                        "id": node.object_id,
                        "name": node.object_name,
                        "type": node.object_type,
                        "database": node.database,
                        "schema": node.schema,
                        "column": node.column,
                        "parent": node.parent_object_id,
                        "metadata": node.metadata,
                        "first_seen": node.first_seen_at,
                        "last_seen": node.last_seen_at
                    })
                };
                nodes.push(node_json);
            }
        }

        let mut edges = Vec::with_capacity(graph.edge_count());
        for edge_ref in graph.edge_references() {
            let (Some(&src), Some(&tgt)) = (
                node_id_map.get(&edge_ref.source()),
                node_id_map.get(&edge_ref.target()),
            ) else {
                continue;
            };
            let edge = edge_ref.weight();

            let edge_json = if self.minimal {
                json!([
                    src,
                    tgt,
                    self.transform_code(edge.transform_kind),
                    self.origin_code(edge.origin),
                    edge.confidence
                ])
            } else {
                json!({
                    "id": edge.edge_id,
                    "src": src,
                    "tgt": tgt,
                    "transform": edge.transform_kind,
                    "origin": edge.origin,
                    "origins": edge.origins,
                    "confidence": edge.confidence,
                    "observed_at": edge.observed_at,
                    "evidence": edge.evidence
                })
            };
            edges.push(edge_json);
        }

        let databases: Vec<String> = {
            let mut database_vec = vec![String::new(); database_map.len()];
            for (name, id) in database_map {
                database_vec[id as usize] = name;
            }
            database_vec
        };

        let output = json!({
            "meta": {
                "nodes": graph.node_count(),
                "edges": graph.edge_count(),
                "format": if self.minimal { "compact" } else { "full" }
            },
            "databases": databases,
            "nodes": nodes,
            "edges": edges
        });

        Ok(serde_json::to_string(&output)?)
    }

    fn type_code(&self, object_type: ObjectType) -> u8 {
        match object_type {
            ObjectType::Table => 0,
            ObjectType::View => 1,
            ObjectType::MaterializedView => 2,
            ObjectType::Column => 3,
        }
    }

    fn transform_code(&self, kind: TransformKind) -> u8 {
        match kind {
            TransformKind::Identity => 0,
            TransformKind::Cast => 1,
            TransformKind::Aggregate => 2,
            TransformKind::Filter => 3,
            TransformKind::Join => 4,
            TransformKind::Union => 5,
            TransformKind::Window => 6,
            TransformKind::Case => 7,
            TransformKind::Udf => 8,
            TransformKind::Unknown => 9,
            TransformKind::Dependency => 10,
        }
    }

    fn origin_code(&self, origin: Origin) -> u8 {
        match origin {
            Origin::SqlParse => 0,
            Origin::Manifest => 1,
            Origin::QueryHistory => 2,
        }
    }
}

impl Default for JsonCompactFormatter {
    fn default() -> Self {
        Self::new()
    }
}
