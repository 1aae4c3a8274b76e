use std::path::{Path, PathBuf};

use anyhow::Context;
use brain_api::commands::{
    ClearArgs, DeleteArgs, GetArgs, ListArgs, MigrateArgs, RememberArgs, SetArgs,
};
use brain_api::Command;
use brain_core::BrainConfig;
use clap::{Parser, Subcommand};
use serde_json::Value;

mod commands;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "brain.toml";

#[derive(Parser)]
#[command(
    name = "brain",
    about = "Brain: versioned, namespaced state store",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to brain.toml (default: ./brain.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the database file from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update an entry
    Set {
        key: String,
        /// Stored verbatim
        value: String,
        #[arg(short = 'C', long, default_value = "system")]
        category: String,
    },
    /// Fetch an entry ("any" searches every category)
    Get {
        key: String,
        #[arg(short = 'C', long, default_value = "any")]
        category: String,
    },
    /// List entries, most recently updated first
    List {
        #[arg(short = 'C', long, default_value = "all")]
        category: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete an entry
    Delete {
        key: String,
        #[arg(short = 'C', long, default_value = "system")]
        category: String,
    },
    /// Delete every entry of the cache or session category
    Clear {
        #[arg(short = 'C', long, default_value = "cache")]
        category: String,
        /// Required: confirm the deletion
        #[arg(long)]
        confirm: bool,
    },
    /// Apply a batch of operations atomically.
    ///
    /// Reads `{"operations": [{"action": "set"|"delete", "key", "value"?, "category"?}]}`
    /// from FILE, or stdin when FILE is "-".
    Transaction {
        file: String,
    },
    /// Migrate legacy memories into namespaced entries (dry run unless --apply)
    Migrate {
        #[arg(long)]
        apply: bool,
        /// Only keys containing this substring (case-sensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Entry counts per category
    Stats,
    /// Legacy memory records
    Legacy {
        #[command(subcommand)]
        action: LegacyAction,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum LegacyAction {
    /// Store a flat legacy memory
    Remember {
        key: String,
        value: String,
        #[arg(short = 't', long = "type", default_value = "general")]
        memory_type: String,
    },
    /// Load legacy memories from a JSON array file
    Import {
        file: PathBuf,
    },
    /// List legacy memories
    List {
        #[arg(short, long)]
        filter: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,brain=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(explicit: Option<&Path>, db: Option<PathBuf>) -> anyhow::Result<BrainConfig> {
    let mut config = match explicit {
        Some(path) => BrainConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            BrainConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => BrainConfig::default(),
    };
    if db.is_some() {
        config.storage.path = db;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let config = load_config(cli.config.as_deref(), cli.db)?;

    let command = match cli.command {
        Commands::Set { key, value, category } => Command::Set(SetArgs {
            key,
            value: Value::String(value),
            category,
        }),
        Commands::Get { key, category } => Command::Get(GetArgs { key, category }),
        Commands::List { category, limit } => Command::List(ListArgs { category, limit }),
        Commands::Delete { key, category } => Command::Delete(DeleteArgs { key, category }),
        Commands::Clear { category, confirm } => Command::Clear(ClearArgs { category, confirm }),
        Commands::Transaction { file } => Command::Transaction(commands::state::read_transaction(&file)?),
        Commands::Migrate { apply, filter } => Command::Migrate(MigrateArgs {
            dry_run: !apply,
            filter,
        }),
        Commands::Stats => Command::Stats,
        Commands::Legacy { action } => match action {
            LegacyAction::Remember { key, value, memory_type } => Command::Remember(RememberArgs {
                key,
                value: Value::String(value),
                memory_type,
            }),
            LegacyAction::Import { file } => return commands::legacy::import(&config, &file),
            LegacyAction::List { filter } => {
                return commands::legacy::list(&config, filter.as_deref());
            }
        },
        Commands::Serve { bind, port } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            return commands::serve::serve(&config);
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            return Ok(());
        }
    };

    commands::state::run(&config, command)
}
