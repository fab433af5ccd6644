//! # SmartPics CLI (`smartpics`)
//!
//! ## Usage
//!
//! ```bash
//! smartpics --config ./config/smartpics.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `smartpics init` | Create the SQLite database and schema |
//! | `smartpics analyze <id>` | Print the text analysis of a post |
//! | `smartpics process <id>` | Generate metadata for one image attachment |
//! | `smartpics bulk` | Process image attachments missing alt text |
//! | `smartpics cache stats` | Print cache counters |
//! | `smartpics cache evict <policy>` | Delete entries by policy |
//! | `smartpics cache optimize` | Evict stale entries and rebuild clusters |
//! | `smartpics cache clusters` | List similarity clusters |
//!
//! Log verbosity follows `RUST_LOG` (default `smartpics=info`); logs go to
//! stderr, results to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use smartpics::{commands, config, migrate};

/// SmartPics: AI-generated alt text, captions and titles for images.
#[derive(Parser)]
#[command(
    name = "smartpics",
    about = "SmartPics: AI-generated alt text, captions and titles for images",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/smartpics.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Analyze a post: topics, keywords, sentiment and readability.
    Analyze {
        /// Post id.
        content_id: i64,
    },

    /// Generate and apply metadata for one image attachment.
    Process {
        /// Attachment id.
        attachment_id: i64,

        /// Extra provider context; overrides gathered keys.
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },

    /// Process image attachments that have no alt text, in id order.
    Bulk {
        /// Maximum number of attachments to process.
        #[arg(long, default_value_t = 10)]
        limit: i64,

        /// Number of candidates to skip.
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Inspect and maintain the similarity cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print entry and usage counters.
    Stats,

    /// Delete entries: `expired`, `low-usage`, `old` or `all`.
    Evict { policy: String },

    /// Evict expired and low-usage entries, then rebuild clusters.
    Optimize,

    /// List clusters of entries with identical generated text.
    Clusters,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartpics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze { content_id } => {
            commands::run_analyze(&cfg, content_id).await?;
        }
        Commands::Process {
            attachment_id,
            context,
        } => {
            commands::run_process(&cfg, attachment_id, context).await?;
        }
        Commands::Bulk { limit, offset } => {
            commands::run_bulk(&cfg, limit, offset).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::run_cache_stats(&cfg).await?,
            CacheAction::Evict { policy } => commands::run_cache_evict(&cfg, &policy).await?,
            CacheAction::Optimize => commands::run_cache_optimize(&cfg).await?,
            CacheAction::Clusters => commands::run_cache_clusters(&cfg).await?,
        },
    }

    Ok(())
}
