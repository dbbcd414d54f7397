//! chatstore command-line client
//!
//! Reads and writes chat collections through the same data sources the
//! application uses, so a collection can be inspected or repaired from a
//! shell.
//!
//! Usage:
//!   chatstore list feeds
//!   chatstore --mode hybrid sync dialogues
//!   chatstore create profiles --json '{"nickname": "ann"}'
//!   chatstore config set-mode remote
//!
//! Settings come from the environment (`CHATSTORE_*`), then from the
//! settings persisted in the data directory. Flags override both for a
//! single invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chatstore_data::{
    ConfigOverrides, DataSource, FileStore, KeyValueStore, SettingsStore, SourceConfig,
    SourceFactory, SourceMode, collections, default_client,
};
use chatstore_types::{Document, Fields};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

const MODES: [&str; 3] = ["local", "remote", "hybrid"];

#[derive(Parser, Debug)]
#[command(name = "chatstore")]
#[command(about = "Inspect and edit chatstore collections")]
struct Args {
    /// Data source mode for this invocation
    #[arg(long, global = true, value_parser = MODES)]
    mode: Option<String>,

    /// API base URL for this invocation
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Never contact the remote API
    #[arg(long, global = true)]
    offline: bool,

    /// Directory holding local collections and settings
    #[arg(long, global = true, default_value = ".chatstore")]
    data_dir: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every record of a collection
    List(CollectionArgs),
    /// Print one record
    Get {
        #[command(flatten)]
        collection: CollectionArgs,
        id: String,
    },
    /// Create a record from a JSON object
    Create {
        #[command(flatten)]
        collection: CollectionArgs,
        #[arg(long)]
        json: String,
    },
    /// Merge a JSON object into a record
    Update {
        #[command(flatten)]
        collection: CollectionArgs,
        id: String,
        #[arg(long)]
        json: String,
    },
    /// Delete a record
    Delete {
        #[command(flatten)]
        collection: CollectionArgs,
        id: String,
    },
    /// Replace the local copy of a collection with the remote one
    Sync(CollectionArgs),
    /// Show or change persisted settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug)]
struct CollectionArgs {
    /// Collection key, e.g. `feeds` or `allWallets`
    collection: String,

    /// Remote route below /api/v1 (defaults to the collection's own route)
    #[arg(long)]
    endpoint: Option<String>,
}

impl CollectionArgs {
    fn endpoint(&self) -> String {
        match (&self.endpoint, collections::by_key(&self.collection)) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(known)) => known.endpoint.to_string(),
            (None, None) => format!("/{}", self.collection),
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective settings
    Show,
    /// Persist the data source mode
    SetMode {
        #[arg(value_parser = MODES)]
        mode: String,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.as_deref().map(SourceMode::from),
            api_base_url: self.api_url.clone(),
            offline_mode: self.offline.then_some(true),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&args.data_dir)
            .await
            .with_context(|| format!("failed to open data dir {}", args.data_dir.display()))?,
    );
    let settings = Arc::new(SettingsStore::load(Arc::clone(&store), SourceConfig::from_env()).await);
    let factory = SourceFactory::new(Arc::clone(&settings), store, default_client());
    let overrides = args.overrides();
    debug!(?overrides, "resolved command-line overrides");

    match &args.command {
        Command::List(collection) => {
            let source = open(&factory, collection, &overrides).await;
            let records = source.get_all().await?;
            print_json(&records)?;
        }
        Command::Get { collection, id } => {
            let source = open(&factory, collection, &overrides).await;
            print_json(&source.get(id).await?)?;
        }
        Command::Create { collection, json } => {
            let source = open(&factory, collection, &overrides).await;
            let created = source.create(parse_fields(json)?).await?;
            info!(id = %created.id, "record created");
            print_json(&created)?;
        }
        Command::Update {
            collection,
            id,
            json,
        } => {
            let source = open(&factory, collection, &overrides).await;
            print_json(&source.update(id, parse_fields(json)?).await?)?;
        }
        Command::Delete { collection, id } => {
            let source = open(&factory, collection, &overrides).await;
            source.delete(id).await?;
            println!("deleted {id} from {}", collection.collection);
        }
        Command::Sync(collection) => {
            let source = open(&factory, collection, &overrides).await;
            source.sync().await?;
            println!("{} synced ({} source)", collection.collection, source.kind());
        }
        Command::Config(ConfigCommand::Show) => {
            let effective = settings.current().await.merged(&overrides);
            print_json(&effective)?;
        }
        Command::Config(ConfigCommand::SetMode { mode }) => {
            let updated = settings.set_mode(SourceMode::from(mode.as_str())).await;
            println!("mode set to {}", updated.mode);
        }
    }

    Ok(())
}

async fn open(
    factory: &SourceFactory,
    collection: &CollectionArgs,
    overrides: &ConfigOverrides,
) -> Arc<dyn DataSource<Document>> {
    let overrides = (!overrides.is_empty()).then_some(overrides);
    factory
        .build(&collection.collection, &collection.endpoint(), overrides)
        .await
}

fn parse_fields(json: &str) -> Result<Fields> {
    match serde_json::from_str::<Value>(json).context("--json is not valid JSON")? {
        Value::Object(fields) => Ok(fields),
        other => bail!("--json must be an object, got {other}"),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn endpoint_defaults_to_known_route() {
        let args = Args::parse_from(["chatstore", "list", "allWallets"]);
        let Command::List(collection) = args.command else {
            panic!("expected list");
        };
        assert_eq!(collection.endpoint(), "/wallet");

        let args = Args::parse_from(["chatstore", "list", "stickers"]);
        let Command::List(collection) = args.command else {
            panic!("expected list");
        };
        assert_eq!(collection.endpoint(), "/stickers");
    }

    #[test]
    fn flags_become_overrides() {
        let args = Args::parse_from(["chatstore", "--mode", "hybrid", "--offline", "sync", "feeds"]);
        let overrides = args.overrides();
        assert_eq!(overrides.mode, Some(SourceMode::Hybrid));
        assert_eq!(overrides.offline_mode, Some(true));
        assert_eq!(overrides.api_base_url, None);

        let plain = Args::parse_from(["chatstore", "config", "show"]);
        assert!(plain.overrides().is_empty());
    }

    #[test]
    fn json_must_be_an_object() {
        assert!(parse_fields(r#"{"name": "x"}"#).is_ok());
        assert!(parse_fields("[1, 2]").is_err());
        assert!(parse_fields("nope").is_err());
    }
}
