//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a `{"error": "..."}`
//! JSON body with an appropriate status code.
//!
//! Internal errors (model, database) are logged with full detail, but the
//! caller only sees a fixed message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use applink_types::FieldErrors;

use crate::llm::ModelError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The model call failed; the payload is the message shown to the caller.
    #[error("model error: {source}")]
    Model {
        source: ModelError,
        status: StatusCode,
        message: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Form validation failed; the first field message is returned.
    #[error("invalid form: {0}")]
    Validation(#[from] FieldErrors),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A store failure reported with a route-specific message.
    #[error("storage failure: {message}")]
    Storage {
        message: &'static str,
        source: sqlx::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn model(source: ModelError, status: StatusCode, message: &'static str) -> Self {
        Self::Model {
            source,
            status,
            message,
        }
    }

    pub fn storage(message: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Storage { message, source }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ServerError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                fields.first_message().unwrap_or("invalid form").to_owned(),
            ),

            ServerError::Model {
                source,
                status,
                message,
            } => {
                error!(error = %source, "model error");
                (*status, (*message).to_owned())
            }
            ServerError::Storage { message, source } => {
                error!(error = %source, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, (*message).to_owned())
            }
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_of(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn storage_failure_hides_database_detail() {
        let err = ServerError::storage("Failed to save code")(sqlx::Error::PoolTimedOut);
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to save code");
    }

    #[tokio::test]
    async fn validation_reports_first_field_message() {
        let mut fields = FieldErrors::new();
        fields.add("email", "Invalid email format");
        let (status, body) = body_of(fields.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email format");
    }

    #[tokio::test]
    async fn database_error_is_generic() {
        let (status, body) = body_of(sqlx::Error::RowNotFound.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }
}
