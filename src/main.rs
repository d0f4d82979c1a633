//! # repo-chat CLI
//!
//! Chat with a GitHub repository from the terminal, or serve the same
//! sessions over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! repo-chat --config ./config/repo-chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-chat chat [url]` | Interactive session in the terminal |
//! | `repo-chat serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! export GITHUB_TOKEN=ghp_...
//!
//! # Only Rust sources under src/
//! repo-chat chat https://github.com/acme/widgets --dirs src --exts rs
//!
//! # Everything except docs, on the dev branch
//! repo-chat chat https://github.com/acme/widgets --branch dev \
//!     --exts md,txt --ext-mode exclude
//!
//! repo-chat serve --config ./config/repo-chat.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use repo_chat::config;
use repo_chat::filter::FilterMode;
use repo_chat::repl::run_repl;
use repo_chat::server::run_server;
use repo_chat::session::{Credentials, LoadRequest, Session};

/// Ask questions about a GitHub repository, answered from its own files.
///
/// Secrets are read from `OPENAI_API_KEY` and `GITHUB_TOKEN` unless given
/// as flags.
#[derive(Parser)]
#[command(name = "repo-chat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/repo-chat.toml")]
    config: PathBuf,

    /// OpenAI API key (overrides `OPENAI_API_KEY`).
    #[arg(long, global = true)]
    openai_key: Option<String>,

    /// GitHub personal access token (overrides `GITHUB_TOKEN`).
    #[arg(long, global = true)]
    github_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// When a URL is given the repository is loaded before the first
    /// prompt; otherwise use `/load <url>` inside the session. The filter
    /// flags apply to every load.
    Chat {
        /// Repository URL, e.g. `https://github.com/owner/repo`.
        url: Option<String>,

        /// Branch to index (default `main`).
        #[arg(long)]
        branch: Option<String>,

        /// Comma-separated directories.
        #[arg(long, default_value = "")]
        dirs: String,

        /// Whether `--dirs` includes or excludes.
        #[arg(long, default_value_t = FilterMode::Include)]
        dir_mode: FilterMode,

        /// Comma-separated file extensions.
        #[arg(long, default_value = "")]
        exts: String,

        /// Whether `--exts` includes or excludes.
        #[arg(long, default_value_t = FilterMode::Include)]
        ext_mode: FilterMode,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    let credentials = Credentials::new(cli.openai_key, cli.github_token).or(Credentials::from_env());

    match cli.command {
        Commands::Chat {
            url,
            branch,
            dirs,
            dir_mode,
            exts,
            ext_mode,
        } => {
            let mut session = Session::new(&cfg, credentials)?;
            let template = LoadRequest {
                url: url.unwrap_or_default(),
                branch,
                directories: dirs,
                directory_mode: dir_mode,
                extensions: exts,
                extension_mode: ext_mode,
            };
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            run_repl(&mut session, template, stdin, &mut stdout).await?;
        }
        Commands::Serve => {
            run_server(&cfg, credentials).await?;
        }
    }

    Ok(())
}
