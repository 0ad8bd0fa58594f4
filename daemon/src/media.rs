use axum::Json;
use axum::extract::{Multipart, State};
use axum::extract::multipart::MultipartError;
use marquee::catalog::{self, CatalogError};
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
}

pub async fn list_media(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let config = state.display_config.snapshot();
    let names = tokio::task::spawn_blocking(move || {
        let mut names: Vec<String> = catalog::list(&config)?.collect();
        names.sort();
        Ok::<_, CatalogError>(names)
    })
    .await??;
    Ok(Json(names))
}

pub async fn list_folders(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let config = state.display_config.snapshot();
    let folders = tokio::task::spawn_blocking(move || catalog::list_folders(&config)).await??;
    Ok(Json(folders))
}

/// Accepts a multipart form with a `file` field and stores it in the source
/// directory under its sanitized name.
pub async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        // reject bad names before reading the body
        let name = catalog::validate_upload(field.file_name().unwrap_or_default())
            .map_err(CatalogError::from)?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let config = state.display_config.snapshot();
        let stored_name = name.clone();
        tokio::spawn(async move { catalog::store(&config, &stored_name, &bytes).await })
            .await??;
        return Ok(Json(UploadResponse { filename: name }));
    }
    Err(ApiError::bad_request("missing multipart field \"file\""))
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}
