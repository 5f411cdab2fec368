use std::sync::Arc;

use applink_types::GENERATED_CODE_ID_HEADER;
use axum::http::{HeaderName, HeaderValue};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;

/// Restrict origins to `APPLINK_CORS_ORIGINS` when set; allow any otherwise.
/// The generated-code id header is exposed so browser clients can read it.
pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers([HeaderName::from_static(GENERATED_CODE_ID_HEADER)])
}
