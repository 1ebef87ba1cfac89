use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use filedepot::{Config, FileDepot};

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect the index
    Inspect {
        #[command(subcommand)]
        command: InspectCommand,
    },

    /// Delete files (index and disk)
    Purge {
        #[command(subcommand)]
        command: PurgeCommand,
    },
}

#[derive(Debug, Subcommand)]
enum InspectCommand {
    /// Number of records in the index
    NumRecords,
    /// List records, newest first
    List {
        /// Filter by bucket
        #[arg(long)]
        bucket: Option<String>,

        #[arg(long, default_value = "50")]
        limit: usize,

        /// Resume strictly after this createdAt value
        #[arg(long)]
        cursor: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum PurgeCommand {
    /// Empty one bucket
    Bucket {
        /// Bucket name
        bucket: String,
    },
    /// Remove specific record ids
    Ids { ids: Vec<String> },
    /// Remove everything
    All {
        /// Required; purge all refuses to run without it
        #[arg(long)]
        confirm: bool,
    },
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    let depot = FileDepot::new(Arc::new(Config::from_env()));

    match cli.command {
        Command::Inspect { command } => match command {
            InspectCommand::NumRecords => {
                println!("Number of records: {}", depot.num_records().await?);
            }
            InspectCommand::List {
                bucket,
                limit,
                cursor,
            } => {
                let page = depot.list(bucket.as_deref(), limit, cursor).await?;
                for record in &page.items {
                    println!(
                        "{}  {}  {}/{}  {} bytes",
                        record.created_at, record.id, record.bucket, record.filename, record.size
                    );
                }
                if let Some(cursor) = page.next_cursor {
                    println!("next cursor: {cursor}");
                }
            }
        },
        Command::Purge { command } => match command {
            PurgeCommand::Bucket { bucket } => {
                let out = depot.delete_bucket(&bucket).await?;
                println!("Removed {} record(s) from bucket {}", out.count, out.bucket);
            }
            PurgeCommand::Ids { ids } => {
                let out = depot.delete_many_by_ids(&ids).await?;
                println!(
                    "Requested {}, removed {}, missing {}",
                    out.requested,
                    out.removed,
                    out.missing.len()
                );
            }
            PurgeCommand::All { confirm } => {
                let out = depot.delete_all(confirm).await?;
                println!("Removed {} record(s)", out.total);
            }
        },
    }
    Ok(())
}
