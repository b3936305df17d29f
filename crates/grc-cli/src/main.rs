//! CLI binary for the GRC knowledge graph: validate, merge, query and publish.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grc_core::config::GrcConfig;
use grc_core::graph::{GraphStore, Plane};
use grc_core::revision::{PublishOutcome, RevisionManager, content_hash};
use grc_core::schema::SchemaRegistry;
use grc_core::snapshot::CandidateBatch;
use grc_core::storage;
use grc_core::validate::{ValidationReport, validate};
use grc_nav::export::{ExportFormat, export_dot, export_payload};
use grc_nav::pathrag::{PathResult, RetrieveOptions, retrieve};
use grc_nav::stats::GraphStats;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "grc-graph", about = "GRC compliance knowledge graph")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Graph directory, overriding `[storage] graph_dir`
    #[arg(long, global = true)]
    graph_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show graph statistics and the current revision
    Info,

    /// Validate the graph against its schema
    Validate,

    /// Merge a candidate batch into the graph
    Merge {
        /// Candidate batch JSON file ({"nodes": [...], "edges": [...]})
        batch: PathBuf,

        /// Write the merged snapshot back (only if it validates)
        #[arg(long)]
        write: bool,
    },

    /// Retrieve ranked paths from an anchor node along a template
    Retrieve {
        /// Anchor node id
        anchor: String,

        /// Template name (see `templates`)
        template: String,

        /// Maximum number of paths (defaults to `[retrieval] max_results`)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only traverse edges in this plane
        #[arg(long)]
        plane: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the content hashes of the graph
    Hash,

    /// Publish the graph as a new revision if it passes the publish gate
    Publish {
        /// Free-text summary recorded with the revision
        #[arg(short, long)]
        summary: Option<String>,
    },

    /// Export the graph as the viewer JSON payload or Graphviz DOT
    Export {
        /// Output format: json, dot
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Restrict DOT output to one plane
        #[arg(long)]
        plane: Option<String>,
    },

    /// List retrieval templates
    Templates,
}

struct Workspace {
    config: GrcConfig,
    graph_dir: PathBuf,
}

impl Workspace {
    fn open(cli: &Cli) -> Result<Self> {
        let project_root = match &cli.project {
            Some(p) => p.clone(),
            None => std::env::current_dir().context("failed to get current directory")?,
        };
        let config = GrcConfig::load(&project_root)?;
        let graph_dir = match &cli.graph_dir {
            Some(dir) => dir.clone(),
            None => config.graph_dir(&project_root),
        };
        Ok(Self { config, graph_dir })
    }

    fn require_graph(&self) -> Result<()> {
        if !storage::graph_exists(&self.graph_dir) {
            anyhow::bail!("No graph found in {}", self.graph_dir.display());
        }
        Ok(())
    }

    fn load(&self) -> Result<(GraphStore, SchemaRegistry)> {
        self.require_graph()?;
        storage::load_graph(&self.graph_dir)
    }
}

fn parse_plane(raw: Option<&str>) -> Result<Option<Plane>> {
    raw.map(|p| p.parse::<Plane>().map_err(anyhow::Error::msg))
        .transpose()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ws = Workspace::open(&cli)?;

    match cli.command {
        Commands::Info => cmd_info(&ws),
        Commands::Validate => cmd_validate(&ws),
        Commands::Merge { batch, write } => cmd_merge(&ws, &batch, write),
        Commands::Retrieve {
            anchor,
            template,
            limit,
            plane,
            json,
        } => cmd_retrieve(&ws, &anchor, &template, limit, plane.as_deref(), json),
        Commands::Hash => cmd_hash(&ws),
        Commands::Publish { summary } => cmd_publish(&ws, summary),
        Commands::Export { format, plane } => cmd_export(&ws, &format, plane.as_deref()),
        Commands::Templates => cmd_templates(&ws),
    }
}

fn cmd_info(ws: &Workspace) -> Result<()> {
    let (store, schema) = ws.load()?;

    print!("{}", GraphStats::compute(&store));
    println!();
    match &store.meta().revision_id {
        Some(rev) => println!("Snapshot revision: {}", rev),
        None => println!("Snapshot revision: (unpublished)"),
    }
    if let Some(current) = schema.current_revision() {
        println!("Schema revision:   {} ({})", current.revision_id, current.status);
        if let Some(summary) = &current.summary {
            println!("  {}", summary);
        }
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    for error in &report.errors {
        println!("{}", error);
    }
    if !report.is_valid() {
        eprintln!();
        for (kind, n) in report.counts_by_kind() {
            eprintln!("  {:<22} {}", kind, n);
        }
    }
}

fn cmd_validate(ws: &Workspace) -> Result<()> {
    let (store, schema) = ws.load()?;
    let report = validate(&store, &schema);
    print_report(&report);

    if !report.is_valid() {
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }
    eprintln!(
        "Graph is valid: {} nodes, {} edges.",
        report.node_count, report.edge_count
    );
    Ok(())
}

fn cmd_merge(ws: &Workspace, batch_path: &Path, write: bool) -> Result<()> {
    let (mut store, schema) = if storage::graph_exists(&ws.graph_dir) {
        storage::load_graph(&ws.graph_dir)?
    } else {
        (GraphStore::new(), storage::load_schema(&ws.graph_dir)?)
    };

    let raw = std::fs::read_to_string(batch_path)
        .with_context(|| format!("failed to read {}", batch_path.display()))?;
    let batch = CandidateBatch::from_json(&raw)
        .with_context(|| format!("invalid candidate batch {}", batch_path.display()))?;

    let nodes = store.merge_nodes(batch.nodes);
    let edges = store.merge_edges(batch.edges);
    println!("nodes: {}", nodes);
    println!("edges: {}", edges);

    let report = validate(&store, &schema);
    print_report(&report);
    if !report.is_valid() {
        anyhow::bail!(
            "merged graph has {} validation error(s); nothing written",
            report.errors.len()
        );
    }

    if write {
        store.refresh_meta();
        storage::save_snapshot(&ws.graph_dir, &store)?;
        tracing::info!(
            "merged {} into {}",
            batch_path.display(),
            ws.graph_dir.display()
        );
    } else {
        eprintln!("Dry run: re-run with --write to save.");
    }
    Ok(())
}

fn format_path(path: &PathResult) -> String {
    let mut out = path.anchor().to_string();
    for (hop, node) in path.hops.iter().zip(path.nodes.iter().skip(1)) {
        if hop.inverse {
            out.push_str(&format!(" <-[{}]- {}", hop.predicate, node));
        } else {
            out.push_str(&format!(" -[{}]-> {}", hop.predicate, node));
        }
    }
    out
}

fn cmd_retrieve(
    ws: &Workspace,
    anchor: &str,
    template: &str,
    limit: Option<usize>,
    plane: Option<&str>,
    json: bool,
) -> Result<()> {
    let (store, schema) = ws.load()?;
    let options = RetrieveOptions {
        max_results: limit.unwrap_or(ws.config.retrieval.max_results),
        plane: parse_plane(plane)?,
    };
    let results = retrieve(&store, &schema, anchor, template, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        eprintln!("No paths from {} match template {}.", anchor, template);
        return Ok(());
    }
    for path in &results {
        println!("{:.3}  {}", path.score, format_path(path));
    }
    Ok(())
}

fn cmd_hash(ws: &Workspace) -> Result<()> {
    ws.require_graph()?;
    let store = storage::load_store(&ws.graph_dir)?;
    let hash = content_hash(&store);
    println!("nodes:    {}", hash.nodes);
    println!("edges:    {}", hash.edges);
    println!("combined: {}", hash.combined());
    Ok(())
}

fn cmd_publish(ws: &Workspace, summary: Option<String>) -> Result<()> {
    let (store, schema) = ws.load()?;
    let manager = RevisionManager::for_schema(&schema, &ws.config.revision.id_prefix);
    let draft = manager.create_draft(store, summary);

    match manager.publish(draft, &schema)? {
        PublishOutcome::Published(revision) => {
            let mut doc = schema.into_document();
            doc.revision_layer.current_revision = Some(revision.info());
            storage::save_revision(&ws.graph_dir, revision.store(), &doc)?;

            println!("Published {}", revision.id);
            println!("  {}", revision.hash);
            Ok(())
        }
        PublishOutcome::Rejected { draft, gate } => {
            for failure in &gate.failures {
                eprintln!("  {}", failure);
            }
            print_report(&gate.report);
            anyhow::bail!("{} failed {}; nothing written", draft.id, gate.gate)
        }
    }
}

fn cmd_export(ws: &Workspace, format: &str, plane: Option<&str>) -> Result<()> {
    let format: ExportFormat = format.parse().map_err(anyhow::Error::msg)?;
    let (store, schema) = ws.load()?;

    match format {
        ExportFormat::Json => {
            let payload = export_payload(&store, &schema);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        ExportFormat::Dot => print!("{}", export_dot(&store, parse_plane(plane)?)),
    }
    Ok(())
}

fn cmd_templates(ws: &Workspace) -> Result<()> {
    let schema = storage::load_schema(&ws.graph_dir)?;
    for template in schema.templates() {
        let steps: Vec<String> = template.steps.iter().map(ToString::to_string).collect();
        println!("{:<28} {}", template.name, steps.join(" -> "));
        if !template.description.is_empty() {
            println!("{:<28} {}", "", template.description);
        }
    }
    Ok(())
}
