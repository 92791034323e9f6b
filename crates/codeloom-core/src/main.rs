//! Codeloom CLI - Inspect and exercise a persisted knowledge graph
//!
//! Commands:
//! - `ingest` - Load nodes from a JSON array file into the graph
//! - `compose` - Compose layered context for free-text input
//! - `stats` - Show graph and index statistics
//! - `search` - Vector search over node names and contents

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use codeloom_config::{ConfigLoader, ConfigOverrides, GraphBackendType, LogFormat, LoomConfig};
use codeloom_core::{KnowledgeNode, RetrievalEngine, SearchOptions};

/// Codeloom - Embedded knowledge retrieval
#[derive(Parser)]
#[command(name = "codeloom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root (holds `.codeloom/`)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Override the data directory
    #[arg(long, global = true, env = "CODELOOM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override the graph backend (memory, shared)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Override the node capacity
    #[arg(long, global = true)]
    max_nodes: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load nodes from a JSON array file
    Ingest {
        /// JSON file containing an array of nodes
        file: PathBuf,
    },

    /// Compose layered context for free-text input
    Compose {
        /// Input text
        text: String,

        /// Token budget (default: context.default_max_tokens)
        #[arg(short, long)]
        max_tokens: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show graph and index statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Vector search over node names and contents
    Search {
        /// Query text
        text: String,

        /// Maximum number of results (default: vector.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config, cli.verbose)?;

    let workspace = cli.workspace.as_path();
    match cli.command {
        Commands::Ingest { file } => cmd_ingest(config, workspace, &file),
        Commands::Compose {
            text,
            max_tokens,
            json,
        } => cmd_compose(config, workspace, &text, max_tokens, json),
        Commands::Stats { json } => cmd_stats(config, workspace, json),
        Commands::Search { text, top_k, json } => cmd_search(config, workspace, &text, top_k, json),
    }
}

/// Load merged configuration; the CLI always works on the persisted graph.
fn load_config(cli: &Cli) -> Result<LoomConfig> {
    let graph_backend = cli
        .backend
        .as_deref()
        .map(GraphBackendType::from_str)
        .transpose()?;

    let overrides = ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        persist: Some(true),
        graph_backend,
        max_nodes: cli.max_nodes,
        ..Default::default()
    };

    let mut loader = ConfigLoader::new();
    loader
        .load(&cli.workspace, Some(&overrides))
        .context("Failed to load configuration")
}

fn init_logging(config: &LoomConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        Level::from_str(&config.logging.level).unwrap_or(Level::INFO)
    };

    match config.logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn open_engine(config: LoomConfig, workspace: &Path) -> Result<RetrievalEngine> {
    RetrievalEngine::from_config(config, workspace).context("Failed to open retrieval engine")
}

/// Load nodes from a JSON array file
fn cmd_ingest(config: LoomConfig, workspace: &Path, file: &Path) -> Result<()> {
    let start = Instant::now();
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let nodes: Vec<KnowledgeNode> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse nodes from {}", file.display()))?;

    let mut engine = open_engine(config, workspace)?;
    let before = engine.graph().len();
    let count = engine.ingest_all(nodes);
    engine.flush().context("Failed to persist graph")?;

    info!(
        "Ingested {} nodes in {:.2}s ({} -> {} stored)",
        count,
        start.elapsed().as_secs_f64(),
        before,
        engine.graph().len()
    );
    println!("Ingested {} nodes", count);
    Ok(())
}

/// Compose layered context for free-text input
fn cmd_compose(
    config: LoomConfig,
    workspace: &Path,
    text: &str,
    max_tokens: Option<usize>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config, workspace)?;
    let context = engine.compose(text, max_tokens);

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!("{}", context.render());
    println!();
    println!("Tokens: {}", context.total_tokens);
    if context.truncated {
        println!("Truncated:");
        for reason in &context.truncation_reasons {
            println!("  - {}", reason);
        }
    }
    if let codeloom_core::CompositionStatus::Degraded { reason } = &context.status {
        println!("Degraded: {}", reason);
    }
    Ok(())
}

/// Show graph and index statistics
fn cmd_stats(config: LoomConfig, workspace: &Path, json: bool) -> Result<()> {
    let engine = open_engine(config, workspace)?;
    let stats = engine.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Graph Statistics");
    println!("================");
    println!("Nodes:         {}", stats.graph.total_nodes);
    println!("Relationships: {}", stats.graph.total_relationships);
    println!("Evictions:     {}", stats.graph.evictions);
    println!();
    println!("Node Types:");
    for (node_type, count) in &stats.graph.node_type_distribution {
        println!("  {:12} {}", node_type.as_str(), count);
    }

    if let Some(index) = &stats.index {
        println!();
        println!("Vector Index");
        println!("============");
        println!("Documents:     {}", index.document_count);
        println!("Vocabulary:    {}", index.vocabulary_size);
        println!("Size:          {}", index.index_size);
    }
    Ok(())
}

/// Vector search over node names and contents
fn cmd_search(
    config: LoomConfig,
    workspace: &Path,
    text: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut options = SearchOptions::from(&config.vector);
    if let Some(top_k) = top_k {
        options = options.with_top_k(top_k);
    }

    let engine = open_engine(config, workspace)?;
    let Some(response) = engine.search_with(text, &options)? else {
        println!("Vector index is disabled (vector.enabled = false)");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "{} results from {} documents ({:.1}ms)",
        response.results.len(),
        response.total_documents,
        response.search_time.as_secs_f64() * 1000.0
    );
    for (rank, result) in response.results.iter().enumerate() {
        println!("{:>3}. {:.3}  {}", rank + 1, result.score, result.id);
    }
    Ok(())
}
