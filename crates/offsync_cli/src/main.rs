//! offsync CLI
//!
//! Command-line tools for inspecting and maintaining offsync queues.
//!
//! # Commands
//!
//! - `inspect` - List pending operations in replay order
//! - `clear` - Discard a persisted queue
//! - `resolve` - Reconcile two versions of a record
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use offsync_engine::DEFAULT_STORAGE_KEY;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// offsync queue tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the durable store
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Storage key of the queue
    #[arg(global = true, short, long, default_value = DEFAULT_STORAGE_KEY)]
    key: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pending operations in replay order
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Discard the persisted queue
    Clear {
        /// Confirm that pending operations should be discarded
        #[arg(long)]
        yes: bool,
    },

    /// Reconcile a client and a server version of a record
    Resolve {
        /// Client record (JSON)
        #[arg(long)]
        client: String,

        /// Server record (JSON)
        #[arg(long)]
        server: String,

        /// Strategy (client-wins, server-wins, last-write-wins, merge)
        #[arg(short, long, default_value = "server-wins")]
        strategy: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let dir = cli.dir.ok_or("Store directory required for inspect")?;
            commands::inspect::run(&dir, &cli.key, &format)?;
        }
        Commands::Clear { yes } => {
            let dir = cli.dir.ok_or("Store directory required for clear")?;
            commands::clear::run(&dir, &cli.key, yes)?;
        }
        Commands::Resolve {
            client,
            server,
            strategy,
        } => {
            commands::resolve::run(&client, &server, &strategy)?;
        }
        Commands::Version => {
            println!("offsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
