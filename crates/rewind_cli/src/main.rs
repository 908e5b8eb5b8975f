//! Rewind CLI
//!
//! Command-line tools for sequence-tracked environments.
//!
//! # Commands
//!
//! - `load` - Write random records in batches and verify them
//! - `status` - Display the recovered sequence counters

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rewind command-line environment tools.
#[derive(Parser)]
#[command(name = "rewind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the environment directory
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
    /// Write random records in batches, then read them all back
    Load {
        /// Number of transactions to run
        #[arg(short, long, default_value = "100")]
        loop_count: usize,

        /// Number of records per transaction
        #[arg(short, long, default_value = "100")]
        batch_count: usize,

        /// Flush and confirm every commit instead of syncing once at the end
        #[arg(short = 'r', long)]
        enable_rewind: bool,
    },

    /// Display durable and current sequence
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        Commands::Load {
            loop_count,
            batch_count,
            enable_rewind,
        } => {
            let path = cli.path.ok_or("Environment path required for load")?;
            let options = commands::load::LoadOptions {
                loop_count,
                batch_count,
                enable_rewind,
            };
            let report = commands::load::run(&path, &options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.mismatched > 0 {
                return Err(format!("{} records failed verification", report.mismatched).into());
            }
        }
        Commands::Status { format } => {
            let path = cli.path.ok_or("Environment path required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::Version => {
            println!("Rewind CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Rewind Core v{}", rewind_core::VERSION);
        }
    }

    Ok(())
}
