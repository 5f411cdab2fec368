//! applink-server: generation proxy, code store and account backend.

mod config;
mod db;
mod error;
mod llm;
mod middleware;
mod routes;
mod security;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::llm::gemini::GeminiModel;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env();
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "applink-server starting");

    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("APPLINK_BIND='{}' is not a socket address", cfg.bind_address))?;
    let state = Arc::new(build_state(cfg).await?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, routes::build(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("applink-server stopped");
    Ok(())
}

/// `RUST_LOG` wins over `APPLINK_LOG`; an unparsable `APPLINK_LOG` falls
/// back to `info`.
fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        cfg.log_level.parse::<EnvFilter>().unwrap_or_else(|e| {
            eprintln!("WARN: APPLINK_LOG='{}' is not a valid filter ({e}); using 'info'", cfg.log_level);
            EnvFilter::new("info")
        })
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn build_state(cfg: Config) -> anyhow::Result<AppState> {
    if cfg.jwt_secret_is_default {
        warn!("JWT_SECRET is not set; tokens are signed with the development secret");
    }
    if cfg.gemini_api_key.is_none() {
        warn!("GOOGLE_AI_API_KEY is not set; generate and modify requests will fail");
    }

    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("cannot open database {}", cfg.database_url))?;
    info!(database_url = %cfg.database_url, "database ready");

    let model = GeminiModel::new(cfg.gemini_base_url.clone(), cfg.gemini_api_key.clone())?;
    info!(base_url = %cfg.gemini_base_url, "gemini client ready");
    Ok(AppState::new(cfg, store, Arc::new(model)))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received; draining connections");
}
