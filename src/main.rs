use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use tributary::core::scanner::{load_evidence_file, EvidenceScanner};
use tributary::core::{
    Direction, ExportFilter, InMemoryGraphStore, ObjectType, Origin, SearchRequest,
};
use tributary::evidence::EvidenceBatch;
use tributary::formatters::{JsonCompactFormatter, MarkdownFormatter};
use tributary::logging::init_logging;
use tributary::{LineageConfig, LineageService};

const DEFAULT_STORE: &str = "tributary.snapshot";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tributary",
    version = "0.1.0",
    author = "tributary developers",
    about = "Lineage evidence ingestion and graph traversal"
)]
struct Cli {
    /// Snapshot file holding the lineage graph
    #[arg(short, long, value_name = "FILE", global = true)]
    store: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format: json, markdown
    #[arg(short, long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Ingest evidence files into the store
    Ingest {
        /// Parsed SQL evidence (JSON list of parse results)
        #[arg(long, value_name = "FILE")]
        sql: Vec<PathBuf>,

        /// Query history evidence (JSON list of history records)
        #[arg(long, value_name = "FILE")]
        history: Vec<PathBuf>,

        /// dbt manifest.json or reduced manifest records
        #[arg(long, value_name = "FILE")]
        manifest: Vec<PathBuf>,

        /// Directory scanned for *.sql.json, *.history.json and manifests
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Upstream and/or downstream lineage of one object
    Lineage {
        reference: String,

        #[arg(long, default_value = "both")]
        direction: Direction,

        #[arg(long)]
        depth: Option<usize>,

        /// Seed a table together with its columns
        #[arg(long)]
        include_columns: bool,
    },
    /// Downstream impact of changing one object
    Impact {
        reference: String,

        #[arg(long)]
        depth: Option<usize>,
    },
    /// Shortest lineage paths between two objects
    Path {
        source: String,
        target: String,

        #[arg(long)]
        max_hops: Option<usize>,
    },
    /// Graph statistics
    Stats,
    /// Search objects by id substring
    Search {
        query: String,

        /// Restrict to object types (TABLE, VIEW, MATERIALIZED_VIEW, COLUMN)
        #[arg(long = "type", value_name = "TYPE", value_delimiter = ',')]
        types: Vec<String>,

        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 50)]
        page_size: usize,
    },
    /// Schemas of a database that hold lineage
    Schemas { database: String },
    /// Export the graph, or part of it, as JSON
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Full node and edge detail instead of the compact form
        #[arg(long)]
        full: bool,

        /// Leave out edges below this confidence
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,

        /// Only lineage touching DATABASE or DATABASE.SCHEMA
        #[arg(long, value_name = "SCOPE")]
        scope: Option<String>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum OutputFormat {
    Json,
    Markdown,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        store,
        config,
        format,
        command,
    } = cli;

    let config = match config {
        Some(path) => LineageConfig::from_file(&path)?,
        None => LineageConfig::default(),
    };
    init_logging(&config.logging);

    let store_path = store
        .or_else(|| config.storage.snapshot_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE));

    let start_time = Instant::now();
    let service = LineageService::open(&store_path, config)?;

    match command {
        Command::Ingest {
            sql,
            history,
            manifest,
            dir,
        } => {
            let mut files: Vec<(PathBuf, Origin)> = Vec::new();
            files.extend(sql.into_iter().map(|path| (path, Origin::SqlParse)));
            files.extend(history.into_iter().map(|path| (path, Origin::QueryHistory)));
            files.extend(manifest.into_iter().map(|path| (path, Origin::Manifest)));

            let mut batches: Vec<(PathBuf, EvidenceBatch)> = Vec::new();
            for (path, origin) in files {
                batches.push((path.clone(), load_evidence_file(&path, origin)?));
            }

            if let Some(dir) = dir {
                let scanner = EvidenceScanner::new();
                let found = scanner.scan_directory(&dir)?;
                info!(dir = %dir.display(), files = found.len(), "Scanned evidence directory");
                for (file, loaded) in scanner.load_all(&found) {
                    match loaded {
                        Ok(batch) => batches.push((file.path, batch)),
                        Err(err) => warn!(path = %file.path.display(), error = %err, "Skipping evidence file"),
                    }
                }
            }

            let formatter = MarkdownFormatter::new();
            let mut results = Vec::with_capacity(batches.len());
            for (path, batch) in &batches {
                let result = service.ingest_evidence(batch)?;
                if format == OutputFormat::Markdown {
                    print!("{}", formatter.ingest(&path.display().to_string(), &result));
                }
                results.push(serde_json::json!({
                    "file": path.display().to_string(),
                    "result": result,
                }));
            }
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }

            let saved = service.save(&store_path)?;
            info!(
                path = %store_path.display(),
                nodes = saved.nodes,
                edges = saved.edges,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Ingestion complete"
            );
        }
        Command::Lineage {
            reference,
            direction,
            depth,
            include_columns,
        } => {
            let response =
                service.get_object_lineage(&reference, direction, depth, include_columns)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Markdown => print!(
                    "{}",
                    MarkdownFormatter::new()
                        .with_evidence(true)
                        .lineage(&reference, &response.subgraph)
                ),
            }
        }
        Command::Impact { reference, depth } => {
            let response = service.get_impact(&reference, depth)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Markdown => {
                    print!("{}", MarkdownFormatter::new().impact(&reference, &response.report))
                }
            }
        }
        Command::Path {
            source,
            target,
            max_hops,
        } => {
            let response = service.get_path(&source, &target, max_hops)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Markdown => print!(
                    "{}",
                    MarkdownFormatter::new().paths(&source, &target, &response.paths)
                ),
            }
        }
        Command::Stats => {
            let stats = service.stats()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Markdown => print!("{}", MarkdownFormatter::new().stats(&stats)),
            }
        }
        Command::Search {
            query,
            types,
            min_confidence,
            page,
            page_size,
        } => {
            let mut request = SearchRequest::new(query);
            request.min_confidence = min_confidence;
            request.page = page;
            request.page_size = page_size;
            if !types.is_empty() {
                let mut object_types = BTreeSet::new();
                for label in &types {
                    object_types.insert(label.parse::<ObjectType>()?);
                }
                request.object_types = Some(object_types);
            }

            let results = service.search(&request)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Markdown => {
                    println!(
                        "# SEARCH: {} ({} matches, page {})\n",
                        results.query, results.total_count, results.page
                    );
                    for object in &results.results {
                        println!("- `{}` ({})", object.object_id, object.object_type);
                    }
                }
            }
        }
        Command::Schemas { database } => {
            let response = service.database_schemas(&database)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Markdown => print!(
                    "{}",
                    MarkdownFormatter::new().schemas(&response.database, &response.schemas)
                ),
            }
        }
        Command::Export {
            output,
            full,
            min_confidence,
            scope,
        } => {
            let filter = ExportFilter::new(min_confidence, scope.as_deref())?;
            export(&service, &output, full, &filter)?;
            println!("Exported lineage graph to {}", output.display());
        }
    }

    service.close();
    Ok(())
}

fn export(
    service: &LineageService<InMemoryGraphStore>,
    output: &Path,
    full: bool,
    filter: &ExportFilter,
) -> Result<()> {
    let graph = service.export_graph(filter)?;
    let formatter = if full {
        JsonCompactFormatter::full()
    } else {
        JsonCompactFormatter::new()
    };
    formatter.format_to_file(&graph, output)
}
