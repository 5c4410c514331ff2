use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refbase::config::RemoteConfig;
use refbase::remote::{InstanceCoordinator, RemoteEvent, Role};

#[derive(Parser)]
#[command(
    name = "refbase",
    version,
    about = "Reference manager with single-instance coordination",
    long_about = None
)]
struct Cli {
    /// Library files to open (forwarded to a running instance if one exists)
    files: Vec<String>,

    /// Remote listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable single-instance coordination
    #[arg(long)]
    no_remote: bool,

    /// Configuration file (TOML with a [remote] table)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => RemoteConfig::from_file(path)?,
        None => RemoteConfig::from_env()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.no_remote {
        config.enabled = false;
    }

    tracing::info!(
        port = config.port,
        enabled = config.enabled,
        "refbase starting"
    );

    // The channel stands in for the GUI event loop, which is outside this
    // subsystem.
    let (events, mut gui_events) = mpsc::unbounded_channel::<RemoteEvent>();

    let coordinator = InstanceCoordinator::new(config, events);
    let listener = match coordinator.on_startup(&cli.files).await? {
        Role::Secondary => {
            tracing::info!("arguments forwarded to the running instance, exiting");
            return Ok(());
        }
        Role::Primary(listener) => Some(listener),
        Role::Standalone => None,
    };

    open_files(cli.files);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = gui_events.recv() => match event {
                Some(RemoteEvent::OpenFiles(files)) => open_files(files),
                Some(RemoteEvent::FocusMainWindow) => {
                    tracing::info!("focus requested by another launch");
                }
                None => break,
            },
        }
    }

    // Release the port before reporting shutdown so a relaunch can bind it
    if let Some(listener) = listener {
        listener.stop().await;
    }

    tracing::info!("refbase exiting");
    Ok(())
}

fn open_files(files: Vec<String>) {
    for file in files {
        tracing::info!(file = %file, "opening library file");
    }
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("refbase=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("refbase=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
