//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Signing secret used when `JWT_SECRET` is unset. Only fit for local use.
pub const DEV_JWT_SECRET: &str = "applink-dev-secret-change-me";

const DEFAULT_TOKEN_TTL_HOURS: u64 = 168;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Runtime configuration for applink-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; model calls fail until `GOOGLE_AI_API_KEY` is provided.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://applink.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Google AI Studio key sent as `x-goog-api-key`.
    pub gemini_api_key: Option<String>,

    pub gemini_base_url: String,

    /// HS256 secret for session tokens.
    pub jwt_secret: String,

    /// `true` when `jwt_secret` is the built-in development value.
    pub jwt_secret_is_default: bool,

    /// Lifetime of issued session tokens.
    pub token_ttl: Duration,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let jwt_secret = non_empty_env("JWT_SECRET");
        Self {
            bind_address: env_or("APPLINK_BIND", "0.0.0.0:3000"),
            database_url: env_or("APPLINK_DATABASE_URL", "sqlite://applink.db?mode=rwc"),
            log_level: env_or("APPLINK_LOG", "info"),
            log_json: flag_env("APPLINK_LOG_JSON", false),
            cors_allowed_origins: non_empty_env("APPLINK_CORS_ORIGINS"),
            enable_swagger: flag_env("APPLINK_ENABLE_SWAGGER", true),
            gemini_api_key: non_empty_env("GOOGLE_AI_API_KEY"),
            gemini_base_url: env_or("APPLINK_GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            jwt_secret_is_default: jwt_secret.is_none(),
            jwt_secret: jwt_secret.unwrap_or_else(|| DEV_JWT_SECRET.to_owned()),
            token_ttl: ttl_from_hours(parse_env("APPLINK_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_owned(),
            database_url: "sqlite::memory:".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            cors_allowed_origins: None,
            enable_swagger: true,
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            jwt_secret_is_default: true,
            token_ttl: ttl_from_hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

/// Oversized values clamp instead of overflowing.
fn ttl_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn flag_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
