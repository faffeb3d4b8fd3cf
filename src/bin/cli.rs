//! Gallery Sync CLI
//!
//! Manage the local photo library and its cloud mirror.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gallery_sync::error::{GalleryError, Result};
use gallery_sync::storage::{FileStore, KeyValueStore};
use gallery_sync::sync::{CloudSyncManager, HttpTransport, TracingListener};
use gallery_sync::types::{format_file_size, Photo, SyncConfig};

#[derive(Parser)]
#[command(name = "gallery-sync")]
#[command(about = "Photo gallery with cloud sync")]
#[command(version)]
struct Cli {
    /// Local store file (defaults to the platform data directory)
    #[arg(long, env = "GALLERY_SYNC_STORE")]
    store: Option<String>,

    /// Document store API base URL
    #[arg(long, env = "GALLERY_SYNC_API_URL")]
    api_url: Option<String>,

    /// Per-photo payload cap in characters (0 = uncapped)
    #[arg(long)]
    max_payload_chars: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a token and connect to cloud storage
    Connect {
        /// Personal access token
        #[arg(env = "GITHUB_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the stored token
    Disconnect,
    /// Show connection and storage usage
    Status,
    /// Add image files to the local library
    Add {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List local photos
    List,
    /// Remove a photo locally
    Remove {
        /// Photo ID
        id: String,
        /// Also remove it from the cloud record
        #[arg(long)]
        cloud: bool,
    },
    /// Upload the local library to the cloud
    Push,
    /// Replace the local library with the cloud copy
    Pull,
    /// Export the local library as JSON
    Export {
        /// Output file (- for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// List pre-pull backups, newest first
    Backups,
    /// Restore the local library from a backup
    Restore {
        /// Backup key (see `backups`)
        key: String,
    },
    /// Delete every local photo
    Clear,
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gallery_sync=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn store_path(cli: &Cli) -> PathBuf {
    match &cli.store {
        Some(path) => PathBuf::from(shellexpand::tilde(path).to_string()),
        None => dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gallery-sync")
            .join("store.json"),
    }
}

/// Reconnect with the stored token or fail
async fn require_session(manager: &CloudSyncManager) -> Result<()> {
    match manager.restore_session().await? {
        Some(_) => Ok(()),
        None => Err(GalleryError::NotConnected),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = SyncConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(chars) = cli.max_payload_chars {
        config.max_payload_chars = (chars > 0).then_some(chars);
    }
    config.validate()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(store_path(&cli))?);
    let transport = Arc::new(HttpTransport::new(&config)?);
    let manager = CloudSyncManager::new(transport, store, Arc::new(TracingListener), config);
    let library = manager.library().clone();

    match cli.command {
        Commands::Connect { token } => {
            let outcome = manager.connect(&token).await?;
            println!("Connected as {}", outcome.owner);
            if let Some(err) = outcome.storage_error {
                println!("Cloud storage unavailable: {}", err);
            }
        }

        Commands::Disconnect => {
            manager.disconnect()?;
            println!("Disconnected");
        }

        Commands::Status => {
            if let Err(e) = manager.restore_session().await {
                println!("Reconnect failed: {}", e);
            }
            let status = manager.status();
            let usage = library.usage()?;
            match &status.owner {
                Some(owner) if status.connected => println!(
                    "Connected as {} (storage {})",
                    owner,
                    if status.storage_ready { "ready" } else { "unavailable" }
                ),
                _ => println!("Not connected"),
            }
            println!("Photos: {}", library.load()?.len());
            println!(
                "Local: {} / Cloud: {}",
                format_file_size(usage.local_bytes),
                format_file_size(usage.cloud_bytes)
            );
            if let Some(last) = status.last_sync {
                println!("Last sync: {}", last.to_rfc3339());
            }
            if let Some(err) = status.last_error {
                println!("Last error: {}", err);
            }
        }

        Commands::Add { files } => {
            for file in files {
                let photo = match Photo::from_file(&file) {
                    Ok(photo) => photo,
                    Err(e @ GalleryError::InvalidFile(_)) => {
                        println!("Skipped: {}", e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                println!(
                    "Added {} as {} ({})",
                    photo.name,
                    photo.id,
                    format_file_size(photo.compressed_size)
                );
                library.add(photo)?;
            }
        }

        Commands::List => {
            let photos = library.load()?;
            if photos.is_empty() {
                println!("No photos");
            }
            for photo in photos {
                println!(
                    "{}  {:<30}  {:>10}  {}",
                    photo.id,
                    photo.name,
                    format_file_size(photo.compressed_size),
                    photo.upload_date.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::Remove { id, cloud } => {
            if cloud {
                require_session(&manager).await?;
                match manager.delete_remote(&id).await? {
                    Some(outcome) => println!(
                        "Removed from cloud record #{} ({} photos remain)",
                        outcome.record_number, outcome.photo_count
                    ),
                    None => println!("Photo {} is not in the cloud", id),
                }
            }
            match library.remove(&id)? {
                Some(photo) => println!("Removed {}", photo.name),
                None => println!("Photo {} not found locally", id),
            }
        }

        Commands::Push => {
            require_session(&manager).await?;
            let outcome = manager.push_local().await?;
            println!(
                "Uploaded {} photos ({}) to record #{}",
                outcome.photo_count,
                format_file_size(outcome.envelope_bytes as u64),
                outcome.record_number
            );
        }

        Commands::Pull => {
            require_session(&manager).await?;
            let outcome = manager.pull().await?;
            match outcome.record_number {
                None => println!("No photos in the cloud yet"),
                Some(number) => {
                    println!("Pulled {} photos from record #{}", outcome.photos.len(), number)
                }
            }
            if let Some(key) = outcome.backup_key {
                println!("Previous library saved as {}", key);
            }
            if let Some(warning) = outcome.warning {
                println!("Warning: {}", warning);
            }
        }

        Commands::Export { output } => {
            let json = library.export_json()?;
            if output == "-" {
                let mut stdout = io::stdout().lock();
                stdout.write_all(json.as_bytes())?;
                writeln!(stdout)?;
            } else {
                std::fs::write(shellexpand::tilde(&output).to_string(), json)?;
                println!("Exported to {}", output);
            }
        }

        Commands::Backups => {
            let backups = library.backups()?;
            if backups.is_empty() {
                println!("No backups");
            }
            for key in backups {
                println!("{}", key);
            }
        }

        Commands::Restore { key } => {
            let photos = library.restore_backup(&key)?;
            println!("Restored {} photos from {}", photos.len(), key);
        }

        Commands::Clear => {
            library.clear()?;
            println!("Cleared local library");
        }
    }

    Ok(())
}
