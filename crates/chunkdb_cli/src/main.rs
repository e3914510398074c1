//! chunkdb CLI
//!
//! Command-line tools for chunk directories.
//!
//! # Commands
//!
//! - `inspect` - Show files, sizes, chunk counts and time ranges
//! - `verify` - Check every record of a live or persisted directory
//! - `dump` - Print chunk records for debugging
//! - `repair` - Delete files from the first corruption onwards

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// chunkdb command-line tools.
#[derive(Parser)]
#[command(name = "chunkdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the chunk directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show files, sizes, chunk counts and time ranges
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every record in the directory
    Verify {
        /// Treat the directory as persisted segments instead of live files
        #[arg(long)]
        persisted: bool,
    },

    /// Print chunk records for debugging
    Dump {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print records of this series
        #[arg(short, long)]
        series: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete live files from the first corruption onwards
    Repair {
        /// Report what would be deleted without deleting
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Chunk directory required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { persisted } => {
            let path = cli.path.ok_or("Chunk directory required for verify")?;
            commands::verify::run(&path, persisted)?;
        }
        Commands::Dump {
            limit,
            series,
            format,
        } => {
            let path = cli.path.ok_or("Chunk directory required for dump")?;
            commands::dump::run(&path, limit, series, &format)?;
        }
        Commands::Repair { dry_run } => {
            let path = cli.path.ok_or("Chunk directory required for repair")?;
            commands::repair::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("chunkdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("chunkdb core v{}", chunkdb_core::VERSION);
        }
    }

    Ok(())
}
