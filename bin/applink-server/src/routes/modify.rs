//! One-shot code modification (`POST /api/modify-code`).

use std::sync::Arc;

use applink_types::{DEFAULT_MODIFY_MODEL, ErrorBody, ModifyCodeRequest};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, info};
use utoipa::OpenApi;

use super::json_body;
use crate::error::ServerError;
use crate::llm::prompts::modification_prompt;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(modify_code), components(schemas(ModifyCodeRequest, ErrorBody)))]
pub struct ModifyApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/modify-code", post(modify_code))
}

/// Rewrite `code` according to `prompt`; returns the model's text as-is.
#[utoipa::path(
    post,
    path = "/api/modify-code",
    tag = "code",
    request_body = ModifyCodeRequest,
    responses(
        (status = 200, description = "Modified code", content_type = "text/plain", body = String),
        (status = 400, description = "Code or prompt missing", body = ErrorBody),
        (status = 500, description = "Model failure", body = ErrorBody),
    )
)]
pub async fn modify_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ModifyCodeRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let req = json_body(payload)?;
    if req.code.is_empty() || req.prompt.is_empty() {
        return Err(ServerError::BadRequest("Code and prompt are required".into()));
    }
    let model = match req.model.trim() {
        "" => DEFAULT_MODIFY_MODEL,
        m => m,
    };

    debug!(model, code_len = req.code.len(), prompt_len = req.prompt.len(), "modify request");
    let modified = state
        .model
        .generate(model, &modification_prompt(&req.code, &req.prompt))
        .await
        .map_err(|e| {
            ServerError::model(e, StatusCode::INTERNAL_SERVER_ERROR, "Failed to modify code")
        })?;

    info!(model, output_len = modified.len(), "code modified");
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], modified).into_response())
}
