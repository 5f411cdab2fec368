//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - middleware layers (CORS, per-request trace span)
//! - optional Swagger UI (disable with `APPLINK_ENABLE_SWAGGER=false`)
//! - health route
//! - `/api` code generation, modification, persistence and auth routes

mod auth;
mod code;
pub mod doc;
mod generate;
mod health;
mod modify;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Json, Router, middleware};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ServerError;
use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(generate::router())
        .merge(modify::router())
        .merge(code::router())
        .nest("/auth", auth::router());

    let mut app = Router::new()
        .merge(health::router())
        .nest("/api", api_router);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

/// Unwrap a JSON body, turning extractor rejections into `{"error": ...}`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}
