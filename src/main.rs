use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evoforge_core::config::ForgeConfig;
use evoforge_core::error::ForgeError;
use evoforge_graph::{validate, RawGraph};

#[derive(Parser)]
#[command(name = "evoforge", version, about = "Evolve LLM agent workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "evoforge.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an agent graph and print it as a Mermaid flowchart
    Validate {
        /// Graph JSON file ({"nodes": [...], "edges": [...]})
        graph: PathBuf,
        /// Flowchart orientation (TD, LR, ...)
        #[arg(long, default_value = "TD")]
        orientation: String,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("evoforge=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { graph, orientation } => validate_graph(&graph, &orientation),
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Falls back to defaults only when the file is missing; a malformed file is an error.
fn load_config(path: &Path) -> anyhow::Result<ForgeConfig> {
    match ForgeConfig::load(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        Err(ForgeError::ConfigNotFound(_)) => {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(ForgeConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn validate_graph(path: &Path, orientation: &str) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let raw: RawGraph = serde_json::from_str(&content)?;

    match validate(raw) {
        Ok(graph) => {
            info!(
                nodes = graph.nodes().len(),
                edges = graph.edges().len(),
                "Graph is valid"
            );
            print!("{}", graph.to_mermaid(orientation));
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => {
            for error in errors.iter() {
                eprintln!("{}", error);
            }
            warn!(count = errors.len(), "Graph is invalid");
            Ok(ExitCode::FAILURE)
        }
    }
}
