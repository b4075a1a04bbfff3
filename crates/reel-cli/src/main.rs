//! Reel CLI - Playback Session Driver
//!
//! Features:
//! - Manifest inspection (qualities, subtitles, audio tracks)
//! - Scripted playback sessions against a live or in-memory backend
//! - Termination reports as tables or JSON

use clap::{Args, Parser, Subcommand};
use reel_core::{ErrorKind, PlaybackRequest};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

mod commands;
mod output;

/// Reel CLI - Playback session toolkit
#[derive(Parser)]
#[command(name = "reel")]
#[command(version)]
#[command(about = "Drive playback sessions against a streaming backend", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Coordinator configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend API root
    #[arg(long, env = "REEL_API_URL", default_value = "http://localhost:8000/api/")]
    base_url: Url,

    /// Bearer token for the backend
    #[arg(long, env = "REEL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Use the built-in in-memory backend instead of the network
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

/// What to play
#[derive(Args, Clone, Copy)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Content (movie) id
    #[arg(long)]
    content: Option<u64>,

    /// Episode id
    #[arg(long)]
    episode: Option<u64>,
}

impl From<TargetArgs> for PlaybackRequest {
    fn from(args: TargetArgs) -> Self {
        PlaybackRequest {
            content_id: args.content.map(reel_core::ContentId),
            episode_id: args.episode.map(reel_core::EpisodeId),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a manifest and list its tracks
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run a scripted playback session and print the termination report
    Simulate {
        #[command(flatten)]
        target: TargetArgs,

        /// Seconds of playback to simulate, one progress tick per second
        #[arg(short, long, default_value = "10")]
        watch: u64,

        /// Buffering stalls in milliseconds, comma separated
        #[arg(long, value_delimiter = ',')]
        stalls: Vec<u64>,

        /// Switch to this quality id after the first tick
        #[arg(short, long)]
        quality: Option<u64>,

        /// Player errors to raise (playback, buffering, quality, audio, subtitle, connection, other)
        #[arg(short, long, value_delimiter = ',')]
        errors: Vec<ErrorKind>,

        /// Stop at the end of the content instead of a user stop
        #[arg(long)]
        to_end: bool,

        /// Wall-clock milliseconds per simulated second
        #[arg(long, default_value = "100")]
        tick_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    reel_core::init();

    let backend = commands::Backend::from_cli(
        cli.offline,
        cli.base_url.clone(),
        cli.token.clone(),
        cli.config.as_deref(),
    )?;

    match cli.command {
        Commands::Resolve { target } => {
            commands::resolve(&backend, target.into(), &cli.format).await?;
        }
        Commands::Simulate {
            target,
            watch,
            stalls,
            quality,
            errors,
            to_end,
            tick_ms,
        } => {
            let script = commands::Script {
                watch_seconds: watch,
                stalls_ms: stalls,
                quality,
                errors,
                to_end,
                tick_ms,
            };
            commands::simulate(&backend, target.into(), script, &cli.format).await?;
        }
    }

    Ok(())
}
