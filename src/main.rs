//! # hostbridge CLI
//!
//! ## Usage
//!
//! ```bash
//! hostbridge [--config ~/.hostbridge/config.toml] [--verbose] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hostbridge init` | Write a sample config and create cache directories |
//! | `hostbridge sources` | List configured sources and their cache state |
//! | `hostbridge update` | Refresh source caches from their backends |
//! | `hostbridge list` | Print every instance that passes the filters |
//! | `hostbridge search <target>...` | Rank instances against targets |
//!
//! ## Examples
//!
//! ```bash
//! # Refresh only the sources named prod-*
//! hostbridge update --source 'prod-*'
//!
//! # Typo-tolerant search, refreshing first
//! hostbridge search devlab-game-svx --fuzzy --update
//!
//! # Machine-readable output
//! hostbridge search web db --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hostbridge::commands::{self, SearchFlags};
use hostbridge::config::{self, default_config_path};
use hostbridge::inventory::InventorySet;
use hostbridge::{logging, sources};

/// hostbridge: find hosts across EC2, ECS, flat files and New Relic.
#[derive(Parser)]
#[command(
    name = "hostbridge",
    about = "Resolve fuzzy host names against a multi-source inventory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.hostbridge/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample config (if absent) and create cache directories.
    Init,

    /// List configured sources and when their caches were last updated.
    Sources,

    /// Refresh source caches from their backends.
    ///
    /// Each source's cache is replaced wholesale. A failing source does not
    /// stop the others.
    Update {
        /// Only sources whose name matches this glob (type when unnamed).
        #[arg(long)]
        source: Option<String>,
    },

    /// Print every instance that passes the include/exclude filters.
    List {
        /// Only sources whose name matches this glob (type when unnamed).
        #[arg(long)]
        source: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Rank instances against one or more targets, best match first.
    ///
    /// Exits non-zero when nothing matches.
    Search {
        /// Host names, aliases or fragments to look for.
        #[arg(required = true)]
        targets: Vec<String>,

        /// Also accept approximate (typo-tolerant) matches.
        #[arg(long, conflicts_with = "exact")]
        fuzzy: bool,

        /// Only accept exact matches (no substrings).
        #[arg(long)]
        exact: bool,

        /// Refresh every source before searching.
        #[arg(long)]
        update: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config_path = cli.config.unwrap_or_else(default_config_path);

    // Commands that don't require config
    if let Commands::Init = cli.command {
        return commands::run_init(&config_path);
    }

    let cfg = config::load_config(&config_path)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Sources => {
            let set = InventorySet::from_config(&cfg.inventory);
            sources::list_sources(&set)?;
        }
        Commands::Update { source } => {
            commands::run_update(&cfg, source.as_deref()).await?;
        }
        Commands::List { source, json } => {
            commands::run_list(&cfg, source.as_deref(), json).await?;
        }
        Commands::Search {
            targets,
            fuzzy,
            exact,
            update,
            json,
        } => {
            let flags = SearchFlags {
                fuzzy,
                exact,
                update,
                json,
            };
            commands::run_search(&cfg, &targets, flags).await?;
        }
    }

    Ok(())
}
