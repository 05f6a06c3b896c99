use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::graph::{LineageObject, ObjectType};
use super::store::GraphReader;
use crate::error::Result;

pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub object_types: Option<BTreeSet<ObjectType>>,
    /// Only objects with an incident edge at or above this confidence.
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            object_types: None,
            min_confidence: 0.0,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<LineageObject>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Case-insensitive substring search over object ids, ordered by id.
pub fn search<R: GraphReader + ?Sized>(reader: &R, request: &SearchRequest) -> Result<SearchResults> {
    let needle = request.query.trim().to_uppercase();
    let page = request.page.max(1);
    let page_size = request.page_size.clamp(1, MAX_PAGE_SIZE);

    let mut matches = Vec::new();
    for node in reader.nodes()? {
        if !node.object_id.contains(&needle) {
            continue;
        }
        if let Some(types) = &request.object_types {
            if !types.contains(&node.object_type) {
                continue;
            }
        }
        if request.min_confidence > 0.0 && !has_confident_edge(reader, &node, request.min_confidence)? {
            continue;
        }
        matches.push(node);
    }

    let total_count = matches.len();
    let results = matches
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    Ok(SearchResults {
        query: request.query.clone(),
        results,
        total_count,
        page,
        page_size,
    })
}

fn has_confident_edge<R: GraphReader + ?Sized>(
    reader: &R,
    node: &LineageObject,
    min_confidence: f64,
) -> Result<bool> {
    let outgoing = reader.outgoing(&node.object_id)?;
    let incoming = reader.incoming(&node.object_id)?;
    Ok(outgoing
        .iter()
        .chain(incoming.iter())
        .any(|edge| edge.confidence >= min_confidence))
}
