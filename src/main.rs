use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use journal_rag::cli;
use journal_rag::config::Config;
use journal_rag::server;

#[derive(Parser)]
#[command(
    name = "journal-rag",
    version,
    about = "Hybrid retrieval and streaming chat over a personal journal"
)]
struct Cli {
    /// Config file (default: ~/.journal-rag/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP service
    Serve,
    /// Add a journal entry from a file or stdin
    Ingest {
        /// Owner of the entry
        #[arg(long)]
        user: String,
        /// File holding the entry body (`-` or omitted for stdin)
        file: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        /// ISO 8601 timestamp (default: now)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        mood: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Search a user's journal
    Search {
        #[arg(long)]
        user: String,
        query: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Embed chunks that have no vector yet
    Reembed {
        /// Only this user's chunks
        #[arg(long)]
        user: Option<String>,
        /// Replace every vector, e.g. after changing the embedding model
        #[arg(long)]
        all: bool,
    },
    /// Show entry, chunk, and embedding counts
    Stats {
        #[arg(long)]
        user: Option<String>,
    },
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Logs go to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Ingest {
            user,
            file,
            title,
            date,
            mood,
            tags,
        } => {
            cli::ingest(
                config,
                cli::ingest::IngestArgs {
                    user,
                    file,
                    title,
                    date,
                    mood,
                    tags,
                },
            )
            .await?
        }
        Command::Search { user, query, k } => cli::search(config, &user, &query, k).await?,
        Command::Reembed { user, all } => cli::re_embed(config, user, all).await?,
        Command::Stats { user } => cli::stats(config, user).await?,
        Command::Doctor => cli::doctor(&config)?,
    }

    Ok(())
}
