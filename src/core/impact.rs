use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::store::GraphReader;
use super::traversal::{Direction, Subgraph, TraversalEngine, TraversalLimits};
use crate::config::ImpactConfig;
use crate::error::Result;

/// Risk level for impact analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Aggregate view of what sits downstream of the seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub downstream_objects: usize,
    pub downstream_tables: usize,
    pub downstream_columns: usize,
    pub affected_databases: Vec<String>,
    pub cross_database: bool,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub seeds: Vec<String>,
    pub affected_objects: Vec<String>,
    pub subgraph: Subgraph,
    pub risk_summary: RiskSummary,
}

/// Downstream-only traversal with risk classification.
pub struct ImpactAnalyzer<'a, R: GraphReader + ?Sized> {
    reader: &'a R,
    limits: TraversalLimits,
    config: ImpactConfig,
}

impl<'a, R: GraphReader + ?Sized> ImpactAnalyzer<'a, R> {
    pub fn new(reader: &'a R, config: ImpactConfig) -> Self {
        Self {
            reader,
            limits: TraversalLimits::default(),
            config,
        }
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Walk downstream from `seeds`. `max_depth` defaults to the configured
    /// impact depth, which reaches further than interactive traversal.
    pub fn impact(&self, seeds: &BTreeSet<String>, max_depth: Option<usize>) -> Result<ImpactReport> {
        let depth = max_depth.unwrap_or(self.config.default_depth);
        let subgraph = TraversalEngine::new(self.reader)
            .with_limits(self.limits)
            .traverse(seeds, Direction::Downstream, depth)?;

        let risk_summary = self.summarize(seeds, &subgraph);
        let affected_objects = subgraph
            .nodes
            .iter()
            .filter(|node| !seeds.contains(&node.object_id))
            .map(|node| node.object_id.clone())
            .collect();

        Ok(ImpactReport {
            seeds: seeds.iter().cloned().collect(),
            affected_objects,
            subgraph,
            risk_summary,
        })
    }

    fn summarize(&self, seeds: &BTreeSet<String>, subgraph: &Subgraph) -> RiskSummary {
        let seed_databases: BTreeSet<&str> = subgraph
            .nodes
            .iter()
            .filter(|node| seeds.contains(&node.object_id))
            .map(|node| node.database.as_str())
            .collect();

        let downstream: Vec<_> = subgraph
            .nodes
            .iter()
            .filter(|node| !seeds.contains(&node.object_id))
            .collect();

        let downstream_columns = downstream.iter().filter(|node| node.is_column()).count();
        let downstream_tables = downstream.len() - downstream_columns;

        let affected_databases: BTreeSet<&str> =
            downstream.iter().map(|node| node.database.as_str()).collect();
        let cross_database = affected_databases
            .iter()
            .any(|database| !seed_databases.contains(database));

        let count = downstream.len();
        let by_count = if count > self.config.critical_threshold {
            RiskLevel::Critical
        } else if count > self.config.high_threshold {
            RiskLevel::High
        } else if count > self.config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        let risk_level = if count > 0 && cross_database && self.config.cross_database_is_high {
            by_count.max(RiskLevel::High)
        } else {
            by_count
        };

        let mut risk_score = if self.config.critical_threshold == 0 {
            if count > 0 { 1.0 } else { 0.0 }
        } else {
            (count as f64 / self.config.critical_threshold as f64).min(1.0)
        };
        if cross_database {
            risk_score = (risk_score + 0.25).min(1.0);
        }

        let mut recommendations = Vec::new();
        if count == 0 {
            recommendations.push("No downstream consumers found; change is isolated".to_string());
        } else {
            recommendations.push(format!(
                "Review {count} downstream objects ({downstream_tables} relations, {downstream_columns} columns) before applying the change"
            ));
        }
        if cross_database {
            recommendations.push(format!(
                "Coordinate with owners of databases: {}",
                affected_databases
                    .iter()
                    .filter(|database| !seed_databases.contains(*database))
                    .copied()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if risk_level >= RiskLevel::High {
            recommendations.push("Stage the change and validate downstream outputs".to_string());
        }
        if subgraph.truncated {
            recommendations.push(
                "Impact traversal hit its size bound; the affected set is incomplete".to_string(),
            );
        }

        RiskSummary {
            downstream_objects: count,
            downstream_tables,
            downstream_columns,
            affected_databases: affected_databases.into_iter().map(str::to_string).collect(),
            cross_database,
            risk_level,
            risk_score,
            recommendations,
        }
    }
}
