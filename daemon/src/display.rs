use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Local};
use log::info;
use marquee::command::RendererKind;
use marquee::intent::{DEFAULT_TEXT_COLOR, DEFAULT_TEXT_SPEED, DisplayIntent, Rgb};
use marquee::supervisor::{ProcessStatus, StopOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DisplayStatus {
    Idle,
    Running {
        pid: Option<u32>,
        started_at: DateTime<Local>,
        renderer: RendererKind,
        args: Vec<String>,
    },
}

impl From<Option<ProcessStatus>> for DisplayStatus {
    fn from(status: Option<ProcessStatus>) -> Self {
        match status {
            None => DisplayStatus::Idle,
            Some(status) => DisplayStatus::Running {
                pid: status.pid,
                started_at: status.started_at,
                renderer: status.invocation.kind(),
                args: status.invocation.args().to_vec(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
    /// `"r,g,b"`
    pub color: Option<String>,
    pub speed: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct MediaRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: Option<StopOutcome>,
    pub status: DisplayStatus,
}

pub async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    Json(state.supervisor.status().await.into())
}

pub async fn display_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<DisplayStatus>, ApiError> {
    let color = match req.color.as_deref() {
        Some(color) => color
            .parse::<Rgb>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => DEFAULT_TEXT_COLOR,
    };
    let intent = DisplayIntent::Text {
        content: req.text,
        color,
        speed: req.speed.unwrap_or(DEFAULT_TEXT_SPEED),
    };
    show(state, intent).await
}

pub async fn display_media(
    State(state): State<AppState>,
    Json(req): Json<MediaRequest>,
) -> Result<Json<DisplayStatus>, ApiError> {
    show(state, DisplayIntent::SingleMedia { path: req.path }).await
}

pub async fn display_folder(
    State(state): State<AppState>,
    Json(req): Json<FolderRequest>,
) -> Result<Json<DisplayStatus>, ApiError> {
    let intent = DisplayIntent::Folder {
        path: req.path,
        shuffled: req.shuffle,
    };
    show(state, intent).await
}

pub async fn stop_display(State(state): State<AppState>) -> Result<Json<StopResponse>, ApiError> {
    let supervisor = state.supervisor.clone();
    // a spawned task keeps running if the client hangs up mid-stop
    let stopped = tokio::spawn(async move { supervisor.stop().await }).await?;
    match stopped {
        Some(outcome) => info!("display stopped ({outcome:?})"),
        None => info!("stop requested while idle"),
    }
    Ok(Json(StopResponse {
        stopped,
        status: DisplayStatus::Idle,
    }))
}

async fn show(state: AppState, intent: DisplayIntent) -> Result<Json<DisplayStatus>, ApiError> {
    let config = state.display_config.snapshot();
    let builder = state.builder.clone();
    // resolving paths and listing folders touches the filesystem
    let invocation =
        tokio::task::spawn_blocking(move || builder.build(&intent, &config)).await??;
    let supervisor = state.supervisor.clone();
    let status = tokio::spawn(async move { supervisor.start(invocation).await }).await??;
    Ok(Json(Some(status).into()))
}
