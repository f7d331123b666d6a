use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::Config;

#[derive(Parser)]
#[command(name = "qm")]
#[command(author, version, about = "Query Memo - request-scoped memoization of query transformations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Orders scenario against the sample table
    Scenario {
        /// Number of concurrent simulated requests
        #[arg(short, long, default_value = "4")]
        requests: usize,

        /// Identical calls made by each request
        #[arg(short = 'n', long, default_value = "3")]
        repeat: usize,
    },

    /// Print the cache key for a collection and parameters
    Key {
        /// Collection identity (e.g. a table name)
        #[arg(short = 'C', long)]
        collection: String,

        /// Parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Parameters as a JSON object
        #[arg(short, long)]
        json: Option<String>,
    },

    /// Write a configuration file with default settings
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Commands::Scenario { requests, repeat }) => {
            print_banner();
            run_scenario(&config, requests, repeat).await?;
        }
        Some(Commands::Key {
            collection,
            params,
            json,
        }) => {
            derive_key(&collection, &params, json.as_deref())?;
        }
        Some(Commands::InitConfig { path }) => {
            init_config(&path)?;
        }
        None => {
            // Default: run the scenario
            print_banner();
            run_scenario(&config, 4, 3).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "query_cli=debug,query_core=debug,query_cache=debug,query_executor=debug"
    } else {
        "query_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!("{}", "Query Memo v0.1.0".bright_yellow());
    println!(
        "{}",
        "Transformations are computed once per scope\n".bright_black()
    );
}
