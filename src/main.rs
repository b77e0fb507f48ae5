//! gdgraph CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "gdgraph")]
#[command(about = "Cross-format dependency graph for game codebases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the project once and print statistics
    Index,
    /// Index the project, then watch it for changes
    Watch,
    /// Extract raw facts from a single file, without touching the graph
    Extract {
        file: PathBuf,
    },
    /// Find nodes by name
    Find {
        name: String,
    },
    /// Shortest path between two nodes
    Path {
        from: u64,
        to: u64,
        /// Maximum hop count
        #[arg(long, default_value = "10")]
        max_hops: usize,
    },
    /// Forward or backward impact of a node
    Impact {
        node: u64,
        /// Trace what this node affects instead of what affects it
        #[arg(long)]
        forward: bool,
        #[arg(long, default_value = "5")]
        depth: usize,
        #[arg(long, default_value = "2000")]
        max_results: usize,
    },
    /// Report nodes unreachable from the entry set
    DeadCode,
    /// Enumerate dependency cycles
    Cycles {
        #[arg(long, default_value = "12")]
        max_length: usize,
        #[arg(long, default_value = "100")]
        max_cycles: usize,
    },
    /// Validate scene structure
    Validate,
    /// Print graph statistics
    Stats,
    /// List everything that uses a node, grouped by relation
    Usages {
        node: u64,
    },
    /// List highly coupled nodes
    Coupling {
        #[arg(long, default_value = "10")]
        min_degree: usize,
    },
    /// Show a single node with its incident edges
    Node {
        id: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("gdgraph={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gdgraph v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("project root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root),
        Commands::Watch => commands::watch(cli.root).await,
        Commands::Extract { file } => commands::extract(file),
        Commands::Find { name } => commands::find(cli.root, name),
        Commands::Path { from, to, max_hops } => commands::path(cli.root, from, to, max_hops),
        Commands::Impact { node, forward, depth, max_results } => {
            commands::impact(cli.root, node, forward, depth, max_results)
        }
        Commands::DeadCode => commands::dead_code(cli.root),
        Commands::Cycles { max_length, max_cycles } => {
            commands::cycles(cli.root, max_length, max_cycles)
        }
        Commands::Validate => commands::validate(cli.root),
        Commands::Stats => commands::stats(cli.root),
        Commands::Usages { node } => commands::usages(cli.root, node),
        Commands::Coupling { min_degree } => commands::coupling(cli.root, min_degree),
        Commands::Node { id } => commands::node(cli.root, id),
    }
}
