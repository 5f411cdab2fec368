//! HTTP client for the AppLink API.
//!
//! [`CodeService`] is the seam the studio and dispatcher depend on; tests
//! substitute their own implementation. [`HttpCodeService`] talks to a real
//! `applink-server` with `reqwest`.

use std::time::Duration;

use applink_types::{
    AuthResponse, ErrorBody, FieldErrors, GenerateCodeRequest, GeneratedCode, ModifyCodeRequest,
    SaveCodeRequest, SaveCodeResponse, SignInForm, SignUpForm, UserSession,
    GENERATED_CODE_ID_HEADER,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::StorageError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Validation(#[from] FieldErrors),

    #[error("response has no body")]
    EmptyBody,

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// HTTP status of a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A generation response whose body has not been read yet.
pub struct GenerationStream {
    /// Id the server will store the finished generation under, if announced.
    pub code_id: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, ClientError>>,
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("code_id", &self.code_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait CodeService: Send + Sync + 'static {
    /// Start a streamed generation.
    async fn generate_stream(
        &self,
        request: &GenerateCodeRequest,
    ) -> Result<GenerationStream, ClientError>;

    /// One-shot modification; returns the model's full text.
    async fn modify_code(&self, request: &ModifyCodeRequest) -> Result<String, ClientError>;

    async fn save_code(&self, request: &SaveCodeRequest) -> Result<SaveCodeResponse, ClientError>;

    async fn sign_in(&self, form: &SignInForm) -> Result<AuthResponse, ClientError>;

    async fn sign_up(&self, form: &SignUpForm) -> Result<AuthResponse, ClientError>;
}

/// `reqwest` implementation of [`CodeService`].
#[derive(Debug, Clone)]
pub struct HttpCodeService {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCodeService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, None)
    }

    /// `request_timeout` bounds connection setup and each individual read,
    /// so a slow but live generation stream is not cut off.
    pub fn with_timeout(
        base_url: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.connect_timeout(timeout).read_timeout(timeout);
        }
        let http = builder.build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        debug!(path, "POST");
        let response = self
            .authorize(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        check_response(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body).await?;
        decode_json(response).await
    }

    /// `GET /api/auth/me` with the attached token.
    pub async fn current_user(&self) -> Result<UserSession, ClientError> {
        let response = self
            .authorize(self.http.get(self.url("/api/auth/me")))
            .send()
            .await?;
        decode_json(check_response(response).await?).await
    }

    /// `GET /api/code/{id}`.
    pub async fn fetch_code(&self, id: &str) -> Result<GeneratedCode, ClientError> {
        let response = self
            .authorize(self.http.get(self.url(&format!("/api/code/{id}"))))
            .send()
            .await?;
        decode_json(check_response(response).await?).await
    }
}

#[async_trait]
impl CodeService for HttpCodeService {
    async fn generate_stream(
        &self,
        request: &GenerateCodeRequest,
    ) -> Result<GenerationStream, ClientError> {
        let response = self.post("/api/generateCode", request).await?;
        let code_id = response
            .headers()
            .get(GENERATED_CODE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes_stream().map_err(ClientError::from).boxed();
        Ok(GenerationStream { code_id, body })
    }

    async fn modify_code(&self, request: &ModifyCodeRequest) -> Result<String, ClientError> {
        let response = self.post("/api/modify-code", request).await?;
        let text = response.text().await?;
        if text.is_empty() {
            return Err(ClientError::EmptyBody);
        }
        Ok(text)
    }

    async fn save_code(&self, request: &SaveCodeRequest) -> Result<SaveCodeResponse, ClientError> {
        self.post_json("/api/save-code", request).await
    }

    async fn sign_in(&self, form: &SignInForm) -> Result<AuthResponse, ClientError> {
        form.check()?;
        self.post_json("/api/auth/signin", form).await
    }

    async fn sign_up(&self, form: &SignUpForm) -> Result<AuthResponse, ClientError> {
        form.check()?;
        self.post_json("/api/auth/signup", form).await
    }
}

/// Turn a non-success response into [`ClientError::Status`].
async fn check_response(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    warn!(status = status.as_u16(), %message, "request rejected");
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

/// The body's `error` field, else the body text, else the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        if !error.is_empty() {
            return error;
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_owned();
    }
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ClientError::EmptyBody);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
