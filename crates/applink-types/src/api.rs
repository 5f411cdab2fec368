//! Request / response bodies for the `/api` routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response header carrying the id under which a finished generation is stored.
pub const GENERATED_CODE_ID_HEADER: &str = "x-generated-code-id";

/// Model used by `POST /api/modify-code` when the caller omits one.
pub const DEFAULT_MODIFY_MODEL: &str = "gemini-pro";

// ── Generation ───────────────────────────────────────────────────────────────

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Request body for `POST /api/generateCode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerateCodeRequest {
    pub model: String,
    /// Ordered conversation; the last user turn is the app description.
    pub messages: Vec<ChatMessage>,
}

impl GenerateCodeRequest {
    /// The most recent user turn, if any.
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

// ── Modification ─────────────────────────────────────────────────────────────

/// Request body for `POST /api/modify-code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ModifyCodeRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_modify_model")]
    pub model: String,
}

fn default_modify_model() -> String {
    DEFAULT_MODIFY_MODEL.to_owned()
}

// ── Persistence ──────────────────────────────────────────────────────────────

/// Request body for `POST /api/save-code`.
///
/// Both fields are optional on the wire so that a missing field can be
/// reported as a 400 instead of a deserialization rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SaveCodeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SaveCodeRequest {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            id: Some(id.into()),
        }
    }

    /// Returns `(id, code)` when both are present and non-empty.
    pub fn fields(&self) -> Option<(&str, &str)> {
        let id = self.id.as_deref().filter(|s| !s.is_empty())?;
        let code = self.code.as_deref().filter(|s| !s.is_empty())?;
        Some((id, code))
    }
}

/// A stored generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub id: String,
    pub code: String,
    pub model: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Success body for `POST /api/save-code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SaveCodeResponse {
    pub success: bool,
    pub data: GeneratedCode,
}

// ── Auth ─────────────────────────────────────────────────────────────────────

/// The user record kept alongside the token on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserSession {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Success body for `POST /api/auth/signin` and `/api/auth/signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSession,
}

/// Failure body returned by every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}
