//! Persistence of generated code.

use std::sync::Arc;

use applink_types::{ErrorBody, GeneratedCode, SaveCodeRequest, SaveCodeResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use super::json_body;
use crate::db::CodeStore;
use crate::error::ServerError;
use crate::state::AppState;

const SAVE_FAILED: &str = "Failed to save code";

#[derive(OpenApi)]
#[openapi(
    paths(save_code, get_code),
    components(schemas(SaveCodeRequest, SaveCodeResponse, GeneratedCode, ErrorBody))
)]
pub struct CodeApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/save-code", post(save_code))
        .route("/code/{id}", get(get_code))
}

/// Replace the code of a stored generation.
#[utoipa::path(
    post,
    path = "/api/save-code",
    tag = "code",
    request_body = SaveCodeRequest,
    responses(
        (status = 200, description = "Saved", body = SaveCodeResponse),
        (status = 400, description = "Code or id missing", body = ErrorBody),
        (status = 500, description = "Unknown id or store failure", body = ErrorBody),
    )
)]
pub async fn save_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveCodeRequest>, JsonRejection>,
) -> Result<Json<SaveCodeResponse>, ServerError> {
    let req = json_body(payload)?;
    let (id, code) = req
        .fields()
        .ok_or_else(|| ServerError::BadRequest("Code and ID are required".into()))?;

    let data = state
        .store
        .update_code(id, code)
        .await
        .map_err(ServerError::storage(SAVE_FAILED))?
        .ok_or_else(|| ServerError::storage(SAVE_FAILED)(sqlx::Error::RowNotFound))?;

    info!(id, code_len = code.len(), "code saved");
    Ok(Json(SaveCodeResponse {
        success: true,
        data,
    }))
}

/// Fetch a stored generation.
#[utoipa::path(
    get,
    path = "/api/code/{id}",
    tag = "code",
    params(("id" = String, Path, description = "Generation id")),
    responses(
        (status = 200, description = "Stored generation", body = GeneratedCode),
        (status = 404, description = "Unknown id", body = ErrorBody),
    )
)]
pub async fn get_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GeneratedCode>, ServerError> {
    state
        .store
        .get_code(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Generated code {id} not found")))
}
