// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # fieldwork CLI
//!
//! The `fieldwork` binary drives the coordination field from a shell: deposit
//! goal trees, sense and claim work, resolve or release it, and inspect what
//! is in the field.
//!
//! ## Commands
//!
//! - `fieldwork deposit|sense|claim|resolve|release|boost` - Field operations
//! - `fieldwork suggest|duplicates` - Planning helpers
//! - `fieldwork node show|tree|events` - Inspection
//! - `fieldwork migrate` - Apply database migrations
//! - `fieldwork config show|validate|generate` - Configuration management
//!
//! Every command builds the field in-process from configuration. Without a
//! `spec.database` section the field is in-memory and lasts one command.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fieldwork_cli::commands::{self, field, ConfigCommand, MigrateCommand, NodeCommand};

/// fieldwork - field-based work coordination for agent swarms
#[derive(Parser)]
#[command(name = "fieldwork")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FIELDWORK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FIELDWORK_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit a goal tree from a YAML or JSON file
    Deposit(field::DepositArgs),

    /// List open work matching an agent's affinities
    Sense(field::SenseArgs),

    /// Claim an open node
    Claim(field::ClaimArgs),

    /// Resolve a claimed node with an artifact
    Resolve(field::ResolveArgs),

    /// Release a claimed node back to the field
    Release(field::ReleaseArgs),

    /// Ask for help on a claimed node
    Boost(field::BoostArgs),

    /// Suggest affinity tags for a task
    Suggest(field::SuggestArgs),

    /// Look for live nodes that already cover planned work
    Duplicates(field::DuplicatesArgs),

    /// Node inspection
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Apply database migrations
    Migrate(MigrateCommand),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Deposit(args) => field::deposit(args, cli.config).await,
        Commands::Sense(args) => field::sense(args, cli.config).await,
        Commands::Claim(args) => field::claim(args, cli.config).await,
        Commands::Resolve(args) => field::resolve(args, cli.config).await,
        Commands::Release(args) => field::release(args, cli.config).await,
        Commands::Boost(args) => field::boost(args, cli.config).await,
        Commands::Suggest(args) => field::suggest(args, cli.config).await,
        Commands::Duplicates(args) => field::duplicates(args, cli.config).await,
        Commands::Node { command } => commands::node::handle_command(command, cli.config).await,
        Commands::Migrate(command) => commands::migrate::execute(command, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
