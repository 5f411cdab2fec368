//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::llm::CodeModel;
use crate::security::TokenKeys;

#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Generated code and accounts.
    pub store: Arc<SqliteStore>,
    /// Generation model backend.
    pub model: Arc<dyn CodeModel>,
    /// Session token signer.
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(config: Config, store: SqliteStore, model: Arc<dyn CodeModel>) -> Self {
        let tokens = TokenKeys::new(&config.jwt_secret, config.token_ttl);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            model,
            tokens: Arc::new(tokens),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
