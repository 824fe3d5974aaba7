mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mdmemory::config::MemoryConfig;

#[derive(Parser)]
#[command(name = "mdmemory", version, about = "Markdown-backed per-user memory store with an MCP interface")]
struct Cli {
    /// Config file (defaults to ~/.mdmemory/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Overrides `[server] transport`
        #[arg(long, value_enum)]
        transport: Option<Transport>,
    },
    /// Queue a memory update (idempotent on user, kind and ref id)
    Enqueue {
        #[arg(long)]
        user: String,
        /// session, check_in, onboarding, inbox_action or manual
        #[arg(long)]
        kind: String,
        #[arg(long = "ref")]
        ref_id: String,
        /// JSON object
        #[arg(long)]
        payload: Option<String>,
        /// JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// List pending updates for a user, or users with pending updates
    Pending {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Fold pending updates into change-log digests
    Summarize {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        user: Option<String>,
        /// Run for every user with pending updates
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a user's overview snapshot
    Overview {
        user: String,
        /// Recent change-log entries to show (0 to hide)
        #[arg(long, default_value_t = 5)]
        entries: usize,
        /// Recent audited mutations to show
        #[arg(long, default_value_t = 0)]
        events: usize,
    },
    /// Lint a markdown file for missing anchors and over-long evidence lists
    Lint { file: PathBuf },
    /// Run database, storage and summarizer diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MemoryConfig::load_from(path)?,
        None => MemoryConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = match transport {
                Some(t) => t,
                None if config.server.transport == "http" => Transport::Http,
                None => Transport::Stdio,
            };
            match transport {
                Transport::Stdio => server::serve_stdio(config).await?,
                Transport::Http => server::serve_http(config).await?,
            }
        }
        Command::Enqueue {
            user,
            kind,
            ref_id,
            payload,
            metadata,
        } => {
            let state = server::setup_shared_state(config)?;
            cli::queue::enqueue(
                &state,
                &user,
                &kind,
                &ref_id,
                payload.as_deref(),
                metadata.as_deref(),
            )
            .await?;
        }
        Command::Pending { user, limit } => {
            let state = server::setup_shared_state(config)?;
            cli::queue::pending(&state, user.as_deref(), limit).await?;
        }
        Command::Summarize { user, all: _, limit } => {
            let state = server::setup_shared_state(config)?;
            cli::summarize::summarize(&state, user.as_deref(), limit).await?;
        }
        Command::Overview {
            user,
            entries,
            events,
        } => {
            let state = server::setup_shared_state(config)?;
            cli::overview::overview(&state, &user, entries, events).await?;
        }
        Command::Lint { file } => {
            let warnings = cli::lint::lint(&file)?;
            if warnings > 0 {
                std::process::exit(1);
            }
        }
        Command::Doctor => {
            cli::doctor::doctor(&config).await?;
        }
    }

    Ok(())
}
