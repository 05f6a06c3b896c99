//! Human-readable Markdown reports for the CLI.

use std::fmt::Write;

use crate::core::{
    ImpactReport, IngestResult, LineagePath, LineageStats, SchemaSummary, Subgraph,
};

pub struct MarkdownFormatter {
    /// Show evidence snippets next to edges
    include_evidence: bool,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            include_evidence: false,
        }
    }

    pub fn with_evidence(mut self, include: bool) -> Self {
        self.include_evidence = include;
        self
    }

    pub fn lineage(&self, title: &str, subgraph: &Subgraph) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# LINEAGE: {title}\n");
        if subgraph.no_matching_nodes {
            let _ = writeln!(out, "No lineage recorded for this object.");
            return out;
        }
        let _ = writeln!(
            out,
            "Nodes: {} | Edges: {} | Depth: {}{}\n",
            subgraph.nodes.len(),
            subgraph.edges.len(),
            subgraph.depth_reached,
            if subgraph.truncated { " | TRUNCATED" } else { "" }
        );

        let _ = writeln!(out, "## NODES");
        for node in &subgraph.nodes {
            let _ = writeln!(out, "- `{}` ({})", node.object_id, node.object_type);
        }

        let _ = writeln!(out, "\n## EDGES");
        for edge in &subgraph.edges {
            let _ = write!(
                out,
                "- `{}` -> `{}` [{} | {} | {:.2}]",
                edge.source_id, edge.target_id, edge.transform_kind, edge.origin, edge.confidence
            );
            if self.include_evidence {
                if let Some(evidence) = &edge.evidence {
                    let snippet: String = evidence.chars().take(80).collect();
                    let _ = write!(out, " `{}`", snippet.replace('\n', " "));
                }
            }
            let _ = writeln!(out);
        }
        out
    }

    pub fn impact(&self, title: &str, report: &ImpactReport) -> String {
        let summary = &report.risk_summary;
        let mut out = String::new();
        let _ = writeln!(out, "# IMPACT: {title}\n");
        let _ = writeln!(
            out,
            "Risk: {} (score {:.2})",
            summary.risk_level.as_str(),
            summary.risk_score
        );
        let _ = writeln!(
            out,
            "Downstream: {} objects ({} relations, {} columns)",
            summary.downstream_objects, summary.downstream_tables, summary.downstream_columns
        );
        let _ = writeln!(
            out,
            "Databases: {}{}\n",
            summary.affected_databases.join(", "),
            if summary.cross_database {
                " (cross-database)"
            } else {
                ""
            }
        );

        let _ = writeln!(out, "## AFFECTED");
        for object_id in &report.affected_objects {
            let _ = writeln!(out, "- `{object_id}`");
        }
        let _ = writeln!(out, "\n## RECOMMENDATIONS");
        for recommendation in &summary.recommendations {
            let _ = writeln!(out, "- {recommendation}");
        }
        out
    }

    pub fn paths(&self, source: &str, target: &str, paths: &[LineagePath]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# PATHS: {source} -> {target}\n");
        if paths.is_empty() {
            let _ = writeln!(out, "No path found.");
            return out;
        }
        for (index, path) in paths.iter().enumerate() {
            let kinds: Vec<String> = path
                .hop_transformations
                .iter()
                .map(|hop| hop.iter().map(|k| k.as_str()).collect::<Vec<_>>().join("/"))
                .collect();
            let _ = writeln!(
                out,
                "{}. {} ({} hops, confidence {:.2}, via {})",
                index + 1,
                path.nodes_in_order.join(" -> "),
                path.hop_count,
                path.confidence,
                if kinds.is_empty() {
                    "-".to_string()
                } else {
                    kinds.join(", ")
                }
            );
        }
        out
    }

    pub fn stats(&self, stats: &LineageStats) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# LINEAGE STATS\n");
        let _ = writeln!(out, "Nodes: {} | Edges: {} | Cycles: {}", stats.total_nodes, stats.total_edges, stats.cycles);
        if let Some(last_updated) = stats.last_updated {
            let _ = writeln!(out, "Last updated: {}", last_updated.to_rfc3339());
        }
        for (heading, counts) in [
            ("NODE TYPES", &stats.node_types),
            ("TRANSFORMATIONS", &stats.transformation_types),
            ("ORIGINS", &stats.origins),
            ("CONFIDENCE", &stats.confidence_distribution),
        ] {
            let _ = writeln!(out, "\n## {heading}");
            for (label, count) in counts {
                let _ = writeln!(out, "- {label}: {count}");
            }
        }
        out
    }

    pub fn schemas(&self, database: &str, schemas: &[SchemaSummary]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# SCHEMAS: {database}\n");
        if schemas.is_empty() {
            let _ = writeln!(out, "No lineage recorded in this database.");
            return out;
        }
        for summary in schemas {
            let _ = writeln!(
                out,
                "- {}: {} relations, {} columns, {} edges",
                summary.schema, summary.relations, summary.columns, summary.edges
            );
        }
        out
    }

    pub fn ingest(&self, label: &str, result: &IngestResult) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{label} [{}]: {} records, {} nodes, {} edges, {} skipped, {} errors",
            result.origin,
            result.records,
            result.nodes_touched,
            result.edges_touched,
            result.skipped,
            result.errors.len()
        );
        for error in &result.errors {
            let _ = writeln!(out, "  - #{} {}: {}", error.record_index, error.context, error.message);
        }
        out
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}
