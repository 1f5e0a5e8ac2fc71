// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Migrate Command
//!
//! Applies the embedded SQL migrations under `cli/migrations` so the schema
//! matches this build.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! fieldwork migrate
//!
//! # Preview migrations without applying
//! fieldwork migrate --dry-run
//! ```
//!
//! # Environment
//!
//! The database URL comes from `spec.database.url` in the configuration, or
//! from `FIELDWORK_DATABASE_URL`, which overrides it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;

use fieldwork_core::domain::config::FieldworkConfig;

#[derive(Args)]
pub struct MigrateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn execute(cmd: MigrateCommand, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", "fieldwork migrate".bold().green());

    let config = FieldworkConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let database = config.spec.database.context(
        "No database configured. Set spec.database.url or FIELDWORK_DATABASE_URL to run migrations.",
    )?;

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database.url)
        .await
        .context("Failed to connect to database")?;

    // The tracking table does not exist before the first run.
    let applied_count = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);

    let total_migrations = MIGRATOR.iter().count();
    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());
    Ok(())
}
