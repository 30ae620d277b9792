//! Reverie CLI - Meditation Playback Engine
//!
//! Command-line interface for rendering Reverie sessions.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reverie::cli::commands::{self, PlayArgs};
use reverie::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Reverie v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd).await,
        None => {
            println!("Reverie v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Play {
            manifest,
            soundscapes,
            atmosphere,
            out,
            config,
            stream_interval_ms,
            prefs,
        } => {
            let label = manifest.display().to_string();
            commands::play(PlayArgs {
                manifest,
                soundscapes,
                atmosphere,
                out,
                config,
                stream_interval_ms,
                prefs,
            })
            .await
            .with_context(|| format!("playing {}", label))
        }
        Commands::Texture {
            out,
            seconds,
            rms_db,
        } => commands::texture(&out, seconds, rms_db).context("generating texture"),
        Commands::Binaural {
            out,
            seconds,
            base,
            from,
            to,
        } => commands::binaural(&out, seconds, base, from, to).context("rendering binaural glide"),
        Commands::Soundscapes { dir } => {
            commands::list_soundscapes(&dir).context("listing soundscapes")
        }
    }
}
