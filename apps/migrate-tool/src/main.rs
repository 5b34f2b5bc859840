//! CLI tool for store schema migration.
//!
//! Checks whether a store needs migration to the latest declared schema
//! version and runs the migration, mirroring what an embedding
//! application's persistence layer does at startup.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use store_migrate::{Migrator, MigratorConfig};

/// Command-line arguments for the migration tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the store file
    #[arg(long)]
    store: PathBuf,

    /// Directory holding schema and mapping artifacts
    #[arg(long)]
    models: PathBuf,

    /// Ordered schema version chain, oldest first
    #[arg(long, value_delimiter = ',', required = true)]
    versions: Vec<String>,

    /// Directory for intermediate migration stores (defaults to the system
    /// temp directory)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether the store needs migration to the latest version
    Check,
    /// Migrate the store to the latest version
    Migrate,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = MigratorConfig::new(args.versions, &args.models);
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }

    let migrator = Migrator::new(config);
    let target = migrator.catalog().current().clone();

    match args.command {
        Command::Check => {
            let required = migrator
                .requires_migration(&args.store, &target)
                .context("failed to check store version")?;
            if required {
                println!(
                    "store at {} requires migration to version {}",
                    args.store.display(),
                    target
                );
            } else {
                println!("store at {} is up to date", args.store.display());
            }
        }
        Command::Migrate => {
            migrator
                .ensure_current(&args.store)
                .context("migration failed")?;
            println!(
                "store at {} is at version {}",
                args.store.display(),
                target
            );
        }
    }

    Ok(())
}
