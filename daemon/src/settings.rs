use axum::Json;
use axum::extract::{Path, State};
use marquee::config::{ConfigField, DisplayConfig};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateField {
    #[serde(default)]
    pub value: Value,
}

pub async fn get_display_config(State(state): State<AppState>) -> Json<DisplayConfig> {
    Json(state.display_config.snapshot())
}

pub async fn update_display_config(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Json(req): Json<UpdateField>,
) -> Result<Json<DisplayConfig>, ApiError> {
    let field: ConfigField = field
        .parse()
        .map_err(|e: marquee::config::UnknownField| ApiError::not_found(e.to_string()))?;
    let store = state.display_config.clone();
    let value = req.value;
    let updated = tokio::task::spawn_blocking(move || store.update(field, value)).await??;
    Ok(Json(updated))
}
