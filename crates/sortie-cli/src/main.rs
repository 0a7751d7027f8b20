//! `sortie` command-line interface.
//!
//! Subcommands:
//! - `validate`: load and check a configuration file
//! - `maps`: print the map strategy table
//! - `replay`: run scenario fixtures through the engine

mod maps;
mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sortie_core::SortieConfig;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "sortie.yml";

#[derive(Parser, Debug)]
#[command(name = "sortie", version, about = "Perception-action control engine for automated map clearing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: sortie.yml, falling back to built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a configuration file and print the resolved map settings
    Validate,

    /// List the map strategy table
    Maps(maps::MapsArgs),

    /// Replay scenario fixtures through the engine
    Replay(replay::ReplayArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate => validate(cli.config.as_deref()),
        Commands::Maps(args) => maps::execute(&load_config(cli.config.as_deref())?, &args),
        Commands::Replay(args) => replay::execute(&args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the given file, or `sortie.yml` if present, or the defaults.
fn load_config(path: Option<&Path>) -> Result<SortieConfig> {
    if let Some(path) = path {
        return SortieConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        return SortieConfig::from_file(default).context("Failed to load sortie.yml");
    }
    debug!("No configuration file, using defaults");
    Ok(SortieConfig::default())
}

fn validate(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let strategy = sortie_core::StrategyTable::builtin()
        .with_overrides(&config.strategies)
        .resolve(&config.combat);

    println!("Configuration OK");
    println!("  map:               {}", strategy.map);
    println!("  kills before boss: {}", strategy.kills_before_boss);
    println!("  retreat after:     {}", config.combat.retreat_after);
    println!("  clearing mode:     {}", config.combat.clearing_mode);
    println!(
        "  movement budget:   {} ticks ({:?})",
        strategy.movement_budget,
        strategy.budget_policy_for(config.combat.clearing_mode)
    );
    match config.sortie.max_sorties {
        Some(max) => println!("  max sorties:       {max}"),
        None => println!("  max sorties:       unlimited"),
    }
    println!("  diagnostics:       {}", config.diagnostics.dir.display());
    Ok(())
}
