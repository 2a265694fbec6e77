//! rowsync CLI
//!
//! Command-line tools for rowsync stores.
//!
//! # Commands
//!
//! - `provision` - Install change tracking on the configured tables
//! - `deprovision` - Remove change tracking
//! - `info` - Show the store id and change log window
//! - `retain` - Trim the change log
//! - `forget` - Reset a peer so its next sync is a full snapshot
//! - `sync` - Run a round against another database file
//! - `serve` - Serve the store over HTTP

mod commands;

use clap::{Parser, Subcommand};
use rowsync_protocol::SyncDirection;
use rowsync_sqlite::{SqliteSyncConfiguration, SqliteSyncProvider};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// rowsync command-line tools.
#[derive(Parser)]
#[command(name = "rowsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Table configuration (JSON)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured connection
    #[arg(global = true, short, long)]
    db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install change tracking on the configured tables
    Provision,

    /// Remove change tracking and sync state
    Deprovision,

    /// Show the store id and change log window
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete change log entries older than a version
    Retain {
        /// Oldest version to keep
        #[arg(short, long)]
        min_version: u64,
    },

    /// Forget a peer's acknowledged version so its next sync is a full snapshot
    Forget {
        /// Store id of the peer
        peer: Uuid,
    },

    /// Run a sync round against another database file
    Sync {
        /// Database file of the remote store
        #[arg(short, long)]
        remote_db: PathBuf,

        /// Round direction (UploadOnly, DownloadOnly, UploadAndDownload)
        #[arg(long, default_value = "UploadAndDownload")]
        direction: SyncDirection,

        /// Let local changes overwrite conflicting remote rows
        #[arg(long)]
        force_remote: bool,

        /// Fail on a stale anchor instead of resnapshotting
        #[arg(long)]
        no_resnapshot: bool,
    },

    /// Serve the store over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Let uploaded changes overwrite conflicting rows
        #[arg(long)]
        force_write: bool,
    },
}

fn load_config(config: Option<&Path>, db: Option<&Path>) -> Result<SqliteSyncConfiguration, Box<dyn std::error::Error>> {
    let path = config.ok_or("Table configuration required (--config)")?;
    let config = SqliteSyncConfiguration::from_json_file(path)?;
    Ok(match db {
        Some(db) => config.with_path(db),
        None => config,
    })
}

fn open_store(config: SqliteSyncConfiguration) -> Result<SqliteSyncProvider, Box<dyn std::error::Error>> {
    Ok(SqliteSyncProvider::open(config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;

    match cli.command {
        Commands::Provision => commands::provision::run(&open_store(config)?)?,
        Commands::Deprovision => commands::provision::remove(&open_store(config)?)?,
        Commands::Info { format } => commands::info::run(&open_store(config)?, &format)?,
        Commands::Retain { min_version } => commands::retain::run(&open_store(config)?, min_version)?,
        Commands::Forget { peer } => commands::forget::run(&open_store(config)?, peer)?,
        Commands::Sync {
            remote_db,
            direction,
            force_remote,
            no_resnapshot,
        } => {
            let remote = open_store(config.clone().with_path(remote_db))?;
            commands::sync::run(open_store(config)?, remote, direction, force_remote, !no_resnapshot)?;
        }
        Commands::Serve { bind, force_write } => {
            commands::serve::run(open_store(config)?, bind, force_write)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_arguments_parse() {
        let cli = Cli::parse_from([
            "rowsync",
            "--config",
            "tables.json",
            "sync",
            "--remote-db",
            "hub.db",
            "--direction",
            "DownloadOnly",
            "--force-remote",
        ]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("tables.json")));
        match cli.command {
            Commands::Sync {
                remote_db,
                direction,
                force_remote,
                no_resnapshot,
            } => {
                assert_eq!(remote_db, PathBuf::from("hub.db"));
                assert_eq!(direction, SyncDirection::DownloadOnly);
                assert!(force_remote);
                assert!(!no_resnapshot);
            }
            _ => unreachable!("parsed as another command"),
        }
    }

    #[test]
    fn forget_takes_a_store_id() {
        let peer = Uuid::new_v4();
        let cli = Cli::parse_from(["rowsync", "-c", "tables.json", "forget", &peer.to_string()]);
        assert!(matches!(cli.command, Commands::Forget { peer: p } if p == peer));
        assert!(Cli::try_parse_from(["rowsync", "forget", "not-a-uuid"]).is_err());
    }

    #[test]
    fn missing_config_is_reported() {
        let err = load_config(None, None).unwrap_err();
        assert!(err.to_string().contains("--config"));
    }
}
