use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spatial_overlay::config::OverlayConfig;
use spatial_overlay::geometry::Extent;
use spatial_overlay::io::{run_session, ReplayOptions, Session};

/// Spatial overlay tracking core
#[derive(Parser, Debug)]
#[command(name = "spatial-overlay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded session headlessly
    Replay {
        /// Session CSV file
        session: PathBuf,

        /// Viewport width in pixels
        #[arg(long, default_value = "800")]
        width: f64,

        /// Viewport height in pixels
        #[arg(long, default_value = "600")]
        height: f64,

        /// Camera frame width in pixels
        #[arg(long, default_value = "640")]
        video_width: f64,

        /// Camera frame height in pixels
        #[arg(long, default_value = "480")]
        video_height: f64,

        /// Print every tick result as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => OverlayConfig::load(path)?,
        None => OverlayConfig::default(),
    };

    match cli.command {
        Commands::Replay {
            session,
            width,
            height,
            video_width,
            video_height,
            json,
        } => {
            let options = ReplayOptions {
                viewport: Extent::new(width, height),
                video: Extent::new(video_width, video_height),
            };
            run_replay(&session, &config, &options, json)?;
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn run_replay(path: &Path, config: &OverlayConfig, options: &ReplayOptions, json: bool) -> Result<()> {
    let session = Session::load(path)?;
    info!("Loaded {} rows from {}", session.len(), path.display());

    let summary = run_session(&session, config, options, |result| {
        if json {
            println!("{}", serde_json::to_string(result)?);
        } else {
            let visible = result.anchors.values().filter(|p| p.visible).count();
            info!(
                "tick {:>5} t={:>8.1}ms anchors {}/{} phase {:<10} clicks {}",
                result.tick,
                result.timestamp_ms,
                visible,
                result.anchors.len(),
                result.gesture.phase,
                result.clicks.len(),
            );
        }
        Ok(())
    })?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    }
    for (id, pos) in &summary.final_anchors {
        info!(
            "{}: ({:.1}, {:.1}) depth {:.2} m {}",
            id,
            pos.x,
            pos.y,
            pos.depth,
            if pos.visible { "visible" } else { "hidden" }
        );
    }
    Ok(())
}
