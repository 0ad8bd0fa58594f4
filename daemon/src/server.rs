use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use marquee::command::CommandBuilder;
use marquee::config::ConfigStore;
use marquee::supervisor::Supervisor;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{display, media, settings};

#[derive(Clone)]
pub struct AppState {
    pub display_config: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
    pub builder: Arc<CommandBuilder>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        display_config: Arc<ConfigStore>,
        supervisor: Arc<Supervisor>,
        builder: CommandBuilder,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            display_config,
            supervisor,
            builder: Arc::new(builder),
            max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    Router::new()
        .route("/api/status", get(display::get_status))
        .route("/api/display/text", post(display::display_text))
        .route("/api/display/media", post(display::display_media))
        .route("/api/display/folder", post(display::display_folder))
        .route("/api/display/stop", post(display::stop_display))
        .route("/api/config", get(settings::get_display_config))
        .route("/api/config/{field}", post(settings::update_display_config))
        .route("/api/media", get(media::list_media).post(media::upload_media))
        .route("/api/folders", get(media::list_folders))
        .layer(body_limit)
        .with_state(state)
}

/// Serves `app` until `shutdown_token` is cancelled. In-flight requests are
/// allowed to finish.
pub async fn run_server(
    listener: TcpListener,
    app: Router,
    shutdown_token: CancellationToken,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .context("running http server")?;
    Ok(())
}
