//! Generation model seam.
//!
//! Handlers only see [`CodeModel`]; [`gemini::GeminiModel`] is the production
//! implementation and tests plug in their own.

pub mod gemini;
pub mod prompts;

use applink_types::ChatMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Text deltas in arrival order.
pub type TextStream = BoxStream<'static, Result<String, ModelError>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no API key configured (set GOOGLE_AI_API_KEY)")]
    MissingApiKey,

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("model stream interrupted: {0}")]
    Stream(String),

    #[error("unexpected model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("prompt was blocked: {0}")]
    Blocked(String),
}

#[async_trait]
pub trait CodeModel: Send + Sync + 'static {
    /// Stream a completion for a conversation. `system` is sent as the
    /// model's system instruction.
    async fn generate_stream(
        &self,
        model: &str,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TextStream, ModelError>;

    /// Single-shot completion of one user prompt.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, ModelError>;
}
