//! Google Gemini REST client.
//!
//! Streaming goes through `:streamGenerateContent?alt=sse`, which answers
//! with one server-sent event per partial `GenerateContentResponse`.

use applink_types::ChatMessage;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CodeModel, ModelError, TextStream};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiModel {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ModelError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    async fn post(&self, url: String, body: &GenerateContentRequest<'_>) -> Result<Response, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, key)
            .json(body)
            .send()
            .await?;
        check_response(response).await
    }
}

#[async_trait]
impl CodeModel for GeminiModel {
    async fn generate_stream(
        &self,
        model: &str,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TextStream, ModelError> {
        let body = GenerateContentRequest::conversation(system, messages);
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        debug!(model, turns = body.contents.len(), "gemini stream request");
        let response = self.post(url, &body).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => match serde_json::from_str::<GenerateContentResponse>(&event.data) {
                        Ok(chunk) => chunk.into_text().transpose(),
                        Err(e) => Some(Err(ModelError::Decode(e))),
                    },
                    Err(e) => Some(Err(ModelError::Stream(e.to_string()))),
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateContentRequest::single(prompt);
        debug!(model, prompt_len = prompt.len(), "gemini request");
        let response = self.post(self.endpoint(model, "generateContent"), &body).await?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parsed.into_text()?.unwrap_or_default())
    }
}

async fn check_response(response: Response) -> Result<Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    warn!(status = status.as_u16(), %message, "gemini request rejected");
    Err(ModelError::Status {
        status: status.as_u16(),
        message,
    })
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<PartRef<'a>>,
}

#[derive(Debug, Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn single(prompt: &'a str) -> Self {
        Self {
            system_instruction: None,
            contents: vec![Content {
                role: Some("user"),
                parts: vec![PartRef { text: prompt }],
            }],
        }
    }

    /// System turns in `messages` are folded into the system instruction;
    /// `assistant` turns map to Gemini's `model` role.
    fn conversation(system: &'a str, messages: &'a [ChatMessage]) -> Self {
        let mut system_parts: Vec<PartRef<'a>> = Vec::new();
        if !system.is_empty() {
            system_parts.push(PartRef { text: system });
        }
        let mut contents = Vec::with_capacity(messages.len());
        for message in messages {
            let role = match message.role.as_str() {
                "system" => {
                    system_parts.push(PartRef {
                        text: &message.content,
                    });
                    continue;
                }
                "assistant" | "model" => "model",
                _ => "user",
            };
            contents.push(Content {
                role: Some(role),
                parts: vec![PartRef {
                    text: &message.content,
                }],
            });
        }
        Self {
            system_instruction: (!system_parts.is_empty()).then_some(Content {
                role: None,
                parts: system_parts,
            }),
            contents,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate; `None` when it carries none.
    fn into_text(self) -> Result<Option<String>, ModelError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ModelError::Blocked(reason));
        }
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok((!text.is_empty()).then_some(text))
    }
}
