//! arfs-sync: inspect and manage persisted drive sync snapshots.
//!
//! Uses the same store and serializer as the sync engine, backed by one
//! JSON file per drive in the state directory.

use anyhow::{Context, Result, bail};
use arfs_core::EntityId;
use arfs_core::state::serialize_sync_state;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use arfs_sync::inspect;
use arfs_sync::{Config, STATE_DIR_ENV, open_store};

#[derive(Parser, Debug)]
#[command(name = "arfs-sync")]
#[command(about = "Inspect ArFS drive sync snapshots")]
struct Args {
    /// Directory holding the snapshots (defaults to the platform data directory)
    #[arg(long, env = STATE_DIR_ENV, global = true)]
    state_dir: Option<String>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List drives with a stored snapshot
    List,
    /// Show one drive's snapshot
    Show {
        drive_id: String,
        /// Print the stored JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the folder and file paths recorded for a drive
    Tree { drive_id: String },
    /// Forget one drive's snapshot; its next sync scans from the beginning
    Clear { drive_id: String },
    /// Forget every snapshot in the state directory
    ClearAll,
}

fn parse_drive_id(raw: &str) -> Result<EntityId> {
    raw.parse()
        .with_context(|| format!("Invalid drive ID: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to warn (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,arfs_sync=debug,arfs_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(args.state_dir.as_deref())?;
    debug!("State directory: {:?}", config.state_dir);
    let store = open_store(&config);

    match args.command {
        Command::List => {
            let drives = store.list().await?;
            if drives.is_empty() {
                info!("No snapshots in {:?}", config.state_dir);
            }
            for drive_id in drives {
                match store.load(&drive_id).await? {
                    Some(state) => println!("{}", inspect::summary(&state)),
                    None => debug!("Snapshot for {} vanished while listing", drive_id),
                }
            }
        }
        Command::Show { drive_id, json } => {
            let drive_id = parse_drive_id(&drive_id)?;
            let Some(state) = store.load(&drive_id).await? else {
                bail!("No snapshot for drive {}", drive_id);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&serialize_sync_state(&state))?);
            } else {
                println!("{}", inspect::summary(&state));
            }
        }
        Command::Tree { drive_id } => {
            let drive_id = parse_drive_id(&drive_id)?;
            let Some(state) = store.load(&drive_id).await? else {
                bail!("No snapshot for drive {}", drive_id);
            };
            for line in inspect::tree_lines(&state) {
                println!("{}", line);
            }
        }
        Command::Clear { drive_id } => {
            let drive_id = parse_drive_id(&drive_id)?;
            store.clear(&drive_id).await?;
            info!("Cleared snapshot for {}", drive_id);
        }
        Command::ClearAll => {
            let count = store.list().await?.len();
            store.clear_all().await?;
            info!("Cleared {} snapshot(s)", count);
        }
    }

    Ok(())
}
