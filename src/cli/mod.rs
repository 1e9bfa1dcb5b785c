pub mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use crate::engine::lifecycle::engine_defaults;
use crate::engine::types::{CounterOp, Mutation, ParameterDocument};
use crate::storage::json_store::JsonParameterStore;
use crate::storage::{ParameterRepository, StoreError};

pub use config::StepStoreConfig;

#[derive(Parser)]
#[command(
    name = "stepstore",
    version,
    about = "Inspect and edit a step engine parameter store"
)]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a stepstore.yaml file (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine instance directory holding the parameter document
    #[arg(short, long, global = true, env = "STEP_ENGINE_INSTANCE_PATH")]
    instance_dir: Option<PathBuf>,

    /// Store name; the document is .<name>.json
    #[arg(long, global = true, env = "STEPSTORE_NAME")]
    store_name: Option<String>,

    /// Give up waiting for the store lock after this many milliseconds
    #[arg(long, global = true, env = "STEPSTORE_LOCK_TIMEOUT_MS")]
    lock_timeout_ms: Option<u64>,

    /// Step module library recorded in the engine defaults
    #[arg(long, global = true, env = "STEP_ENGINE_LIBRARY_PATH")]
    library_path: Option<String>,

    /// Do not merge the engine's global_parameters defaults
    #[arg(long, global = true)]
    bare: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the instance directory and write the default document
    Init,

    /// Display the whole document
    Show {
        /// Output format (json, table)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Display one group
    Group { group: String },

    /// Read one key
    Get { group: String, key: String },

    /// Write one key
    Set {
        group: String,
        key: String,
        /// Parsed as JSON when possible, otherwise stored as a string
        value: String,

        /// Always store the value as a string
        #[arg(long)]
        string: bool,
    },

    /// Add one to a counter (absent counts as 0)
    Incr { group: String, key: String },

    /// Subtract one from a counter (absent counts as 0)
    Decr { group: String, key: String },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Values from .env must be visible to clap's `env` fallbacks, so parse again.
    let cli = if load_dotenv(cli.dotenv.as_deref()) {
        Cli::parse()
    } else {
        cli
    };

    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let file_config = StepStoreConfig::load(cli.config.as_deref())?;

    let instance_dir = cli
        .instance_dir
        .clone()
        .or_else(|| file_config.instance_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let library_path = cli
        .library_path
        .clone()
        .or_else(|| file_config.library_path.clone())
        .unwrap_or_default();

    let store = JsonParameterStore::open(
        &instance_dir,
        file_config.store_config(cli.store_name.as_deref(), cli.lock_timeout_ms),
    );
    let defaults = if cli.bare {
        ParameterDocument::new()
    } else {
        engine_defaults(&library_path, &instance_dir.to_string_lossy())
    };

    if matches!(cli.command, Commands::Init) {
        std::fs::create_dir_all(&instance_dir).with_context(|| {
            format!("Failed to create instance directory: {}", instance_dir.display())
        })?;
    }

    let output = execute(&store, &defaults, &cli.command, store.document_path())?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (warn if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
/// Returns whether anything was loaded.
fn load_dotenv(explicit_path: Option<&Path>) -> bool {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => {
                info!("Loaded env from {}", path.display());
                true
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
                false
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => {
                info!("Loaded env from {}", path.display());
                true
            }
            Err(dotenvy::Error::Io(_)) => false,
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
                false
            }
        },
    }
}

/// Run one command against `store` and return what should be printed.
pub fn execute(
    store: &dyn ParameterRepository,
    defaults: &ParameterDocument,
    command: &Commands,
    location: &Path,
) -> Result<String> {
    let at = location.display();

    match command {
        Commands::Init => {
            let doc = store
                .bootstrap_defaults(defaults)
                .map_err(failed(format!("bootstrap {}", at)))?;
            Ok(format!("{} ({} group(s))", at, doc.groups().len()))
        }
        Commands::Show { format } => {
            let doc = store
                .read(defaults)
                .map_err(failed(format!("read {}", at)))?;
            match format.as_str() {
                "json" => Ok(serde_json::to_string_pretty(&doc)?),
                "table" => Ok(render_table(&doc)),
                other => anyhow::bail!("Invalid output format: {} (expected json or table)", other),
            }
        }
        Commands::Group { group } => {
            let found = store
                .read_group(defaults, group)
                .and_then(|found| {
                    found.ok_or_else(|| StoreError::MissingGroupOrKey {
                        group: group.clone(),
                        key: None,
                    })
                })
                .map_err(failed(format!("read group {} in {}", group, at)))?;
            Ok(serde_json::to_string_pretty(&found)?)
        }
        Commands::Get { group, key } => {
            let value = store
                .read_key(defaults, group, key)
                .and_then(|value| {
                    value.ok_or_else(|| StoreError::MissingGroupOrKey {
                        group: group.clone(),
                        key: Some(key.clone()),
                    })
                })
                .map_err(failed(format!("read {}.{} in {}", group, key, at)))?;
            Ok(render_value(&value))
        }
        Commands::Set {
            group,
            key,
            value,
            string,
        } => {
            let value = parse_value(value, *string);
            let doc = store
                .apply(defaults, Mutation::set(group, key, value))
                .map_err(failed(format!("write {}.{} in {}", group, key, at)))?;
            Ok(current(&doc, group, key))
        }
        Commands::Incr { group, key } => {
            adjust(store, defaults, group, key, CounterOp::Increment, location)
        }
        Commands::Decr { group, key } => {
            adjust(store, defaults, group, key, CounterOp::Decrement, location)
        }
    }
}

fn adjust(
    store: &dyn ParameterRepository,
    defaults: &ParameterDocument,
    group: &str,
    key: &str,
    op: CounterOp,
    location: &Path,
) -> Result<String> {
    let doc = store
        .increment(defaults, group, key, op)
        .map_err(failed(format!("{} {}.{} in {}", op, group, key, location.display())))?;
    Ok(current(&doc, group, key))
}

/// Wrap a store error with its kind and the operation it interrupted.
fn failed(context: String) -> impl FnOnce(StoreError) -> anyhow::Error {
    move |e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("{}: {}", kind, context))
    }
}

fn current(doc: &ParameterDocument, group: &str, key: &str) -> String {
    doc.get(group, key).map(render_value).unwrap_or_default()
}

/// JSON if it parses, otherwise the raw text as a string.
pub fn parse_value(raw: &str, force_string: bool) -> Value {
    if force_string {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Strings print bare so shell callers can use them directly.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_table(doc: &ParameterDocument) -> String {
    let mut out = format!("{:<28} {:<28} {}\n", "GROUP", "KEY", "VALUE");
    out.push_str(&"-".repeat(80));

    let mut rows = 0;
    for (group, entries) in doc.groups() {
        for (key, value) in entries {
            out.push_str(&format!("\n{:<28} {:<28} {}", group, key, value));
            rows += 1;
        }
    }

    out.push_str(&format!("\n\nTotal: {} parameter(s)", rows));
    out
}
