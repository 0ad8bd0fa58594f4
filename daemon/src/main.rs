use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use marquee::command::CommandBuilder;
use marquee::config::ConfigStore;
use marquee::supervisor::{CommandLauncher, Supervisor};
use marquee_daemon::config::{Config, parse_config};
use marquee_daemon::server::{AppState, build_router, run_server};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Parser, Debug)]
#[command(version, about = "HTTP control plane for an LED matrix display")]
struct Args {
    /// Path to the daemon's TOML settings
    #[arg(default_value = "/etc/marquee/config.toml")]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let parsed = parse_config(&args.config_path).await?;
    let config = parsed.clone().unwrap_or_default();

    let level = if config.debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    marquee::init_logging(level);
    if parsed.is_none() {
        warn!(
            "no config at {}, using defaults",
            args.config_path.display()
        );
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let display_config = Arc::new(ConfigStore::load(&config.state_path));
    let supervisor = Arc::new(Supervisor::new(CommandLauncher::new(
        &config.text_renderer,
        &config.image_renderer,
    )));
    let builder = CommandBuilder::new(&config.font_path, config.hardware_pulse);
    let state = AppState::new(
        display_config,
        supervisor.clone(),
        builder,
        config.max_upload_bytes,
    );

    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let task_tracker = TaskTracker::new();
    let shutdown_token = CancellationToken::new();
    task_tracker.spawn(listen_for_shutdown(shutdown_token.clone()));
    task_tracker.close();

    info!("marquee listening on {addr}");
    let served = run_server(listener, build_router(state), shutdown_token.clone()).await;

    // also reached when the server fails on its own
    shutdown_token.cancel();
    supervisor.shutdown().await;
    task_tracker.wait().await;
    info!("marquee stopped");
    served
}

async fn listen_for_shutdown(shutdown_token: CancellationToken) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(err) => {
            warn!("failed to register SIGTERM handler: {err}");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(err) => {
            warn!("failed to register SIGINT handler: {err}");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = shutdown_token.cancelled() => return,
    }
    shutdown_token.cancel();
}
