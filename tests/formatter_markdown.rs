mod support;

use support::{at, sql_record};
use tributary::core::Direction;
use tributary::evidence::{EvidenceBatch, SqlParseResult};
use tributary::formatters::MarkdownFormatter;
use tributary::{LineageConfig, LineageService};

fn service() -> LineageService<tributary::core::InMemoryGraphStore> {
    let service = LineageService::in_memory(LineageConfig::default());
    service
        .ingest_evidence(&EvidenceBatch::SqlParse(vec![
            sql_record(&[("sales.raw.orders", "finance.marts.revenue")], at(1)),
            sql_record(&[("finance.marts.revenue", "finance.marts.forecast")], at(1)),
        ]))
        .unwrap();
    service
}

#[test]
fn lineage_report_lists_nodes_and_edges() {
    let response = service()
        .get_object_lineage("finance.marts.revenue", Direction::Both, None, false)
        .unwrap();

    let report = MarkdownFormatter::new()
        .with_evidence(true)
        .lineage("finance.marts.revenue", &response.subgraph);

    assert!(report.starts_with("# LINEAGE: finance.marts.revenue"));
    assert!(report.contains("Nodes: 3 | Edges: 2"));
    assert!(report.contains("- `SALES.RAW.ORDERS` -> `FINANCE.MARTS.REVENUE` [UNKNOWN | SQL_PARSE | 1.00]"));
    assert!(report.contains("`-- 1 relationships`"));
}

#[test]
fn empty_lineage_says_so() {
    let response = service()
        .get_object_lineage("db.s.none", Direction::Both, None, false)
        .unwrap();
    let report = MarkdownFormatter::new().lineage("db.s.none", &response.subgraph);
    assert!(report.contains("No lineage recorded"));
}

#[test]
fn impact_report_shows_risk_and_recommendations() {
    let response = service().get_impact("sales.raw.orders", None).unwrap();
    let report = MarkdownFormatter::new().impact("sales.raw.orders", &response.report);

    assert!(report.contains("Risk: HIGH"));
    assert!(report.contains("(cross-database)"));
    assert!(report.contains("- `FINANCE.MARTS.FORECAST`"));
    assert!(report.contains("## RECOMMENDATIONS"));
}

#[test]
fn path_and_stats_reports() {
    let service = service();
    let paths = service
        .get_path("sales.raw.orders", "finance.marts.forecast", None)
        .unwrap();
    let report = MarkdownFormatter::new().paths("a", "b", &paths.paths);
    assert!(report.contains(
        "1. SALES.RAW.ORDERS -> FINANCE.MARTS.REVENUE -> FINANCE.MARTS.FORECAST (2 hops, confidence 1.00, via UNKNOWN, UNKNOWN)"
    ));

    let stats = MarkdownFormatter::new().stats(&service.stats().unwrap());
    assert!(stats.contains("Nodes: 3 | Edges: 2 | Cycles: 0"));
    assert!(stats.contains("- TABLE: 3"));
}

#[test]
fn ingest_summary_lists_errors() {
    let service = LineageService::in_memory(LineageConfig::default());
    let result = service
        .ingest_evidence(&EvidenceBatch::SqlParse(vec![SqlParseResult::failed("boom")]))
        .unwrap();

    let summary = MarkdownFormatter::new().ingest("batch.sql.json", &result);
    assert!(summary.starts_with("batch.sql.json [SQL_PARSE]: 1 records"));
    assert!(summary.contains("1 errors"));
    assert!(summary.contains("boom"));
}

#[test]
fn schemas_report_lists_counts() {
    let service = service();
    let response = service.database_schemas("finance").unwrap();

    let report = MarkdownFormatter::new().schemas(&response.database, &response.schemas);
    assert!(report.starts_with("# SCHEMAS: finance"));
    assert!(report.contains("- MARTS: 2 relations, 0 columns, 2 edges"));

    let empty = service.database_schemas("nowhere").unwrap();
    assert!(MarkdownFormatter::new()
        .schemas(&empty.database, &empty.schemas)
        .contains("No lineage recorded in this database."));
}
