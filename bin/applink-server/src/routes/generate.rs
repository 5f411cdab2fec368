//! Streamed code generation (`POST /api/generateCode`).
//!
//! The model's text is forwarded to the caller as it arrives. Once the model
//! finishes, the full text is stored as a [`GeneratedCode`] row under the id
//! announced in the `x-generated-code-id` response header.

use std::sync::Arc;

use applink_types::{
    DEFAULT_MODEL, ErrorBody, GENERATED_CODE_ID_HEADER, GenerateCodeRequest, GeneratedCode,
};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use super::json_body;
use crate::db::CodeStore;
use crate::error::ServerError;
use crate::llm::prompts::GENERATION_SYSTEM_PROMPT;
use crate::llm::TextStream;
use crate::state::AppState;

/// Maximum allowed prompt length in bytes.
const MAX_PROMPT_BYTES: usize = 32 * 1024;

#[derive(OpenApi)]
#[openapi(paths(generate_code), components(schemas(GenerateCodeRequest, ErrorBody)))]
pub struct GenerateApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generateCode", post(generate_code))
}

/// Generate a React component from a conversation, streaming plain text.
#[utoipa::path(
    post,
    path = "/api/generateCode",
    tag = "code",
    request_body = GenerateCodeRequest,
    responses(
        (status = 200, description = "Generated code, streamed", content_type = "text/plain", body = String,
            headers(("x-generated-code-id" = String, description = "Id the finished generation is stored under"))),
        (status = 400, description = "No user message", body = ErrorBody),
        (status = 502, description = "Model unavailable", body = ErrorBody),
    )
)]
pub async fn generate_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateCodeRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let req = json_body(payload)?;
    let prompt = req
        .last_user_prompt()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServerError::BadRequest("A user message is required".into()))?
        .to_owned();
    if prompt.len() > MAX_PROMPT_BYTES {
        return Err(ServerError::BadRequest(format!(
            "Prompt too large ({} bytes); maximum is {MAX_PROMPT_BYTES} bytes",
            prompt.len()
        )));
    }
    let model = match req.model.trim() {
        "" => DEFAULT_MODEL.to_owned(),
        m => m.to_owned(),
    };

    debug!(%model, turns = req.messages.len(), prompt_len = prompt.len(), "generation request");
    let stream = state
        .model
        .generate_stream(&model, GENERATION_SYSTEM_PROMPT, &req.messages)
        .await
        .map_err(|e| ServerError::model(e, StatusCode::BAD_GATEWAY, "Failed to generate code"))?;

    let id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);
    let span = info_span!("generation", id = %id, model = %model);
    tokio::spawn(
        forward_and_store(state.clone(), stream, tx, id.clone(), model, prompt).instrument(span),
    );

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(GENERATED_CODE_ID_HEADER, value);
    }
    Ok(response)
}

/// Pump model deltas into the response body, then persist the full text.
///
/// `tx` is held until the row is written, so the response body only ends
/// after the generation is stored. A model error or a disconnected client
/// ends the pump without storing anything.
async fn forward_and_store(
    state: Arc<AppState>,
    mut stream: TextStream,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    id: String,
    model: String,
    prompt: String,
) {
    let mut full = String::new();
    while let Some(delta) = stream.next().await {
        match delta {
            Ok(text) => {
                full.push_str(&text);
                if tx.send(Ok(Bytes::from(text))).await.is_err() {
                    warn!("client went away; generation dropped");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "model stream failed");
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                return;
            }
        }
    }

    let now = Utc::now();
    let record = GeneratedCode {
        id,
        code: full,
        model,
        prompt,
        created_at: now,
        updated_at: now,
    };
    let code_len = record.code.len();
    match state.store.insert_code(record).await {
        Ok(()) => info!(code_len, "generation stored"),
        Err(e) => warn!(error = %e, "failed to store generation"),
    }
    drop(tx);
}

#[cfg(test)]
mod test {
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::{FakeModel, post_json, read_body, read_json, send, state_with};

    #[tokio::test]
    async fn streams_text_and_stores_generation() {
        let (state, model) = state_with(FakeModel {
            chunks: vec!["```tsx\n", "export default App;", "\n```"],
            ..FakeModel::default()
        })
        .await;

        let response = send(
            &state,
            post_json(
                "/api/generateCode",
                json!({"model": "gemini-1.5-pro", "messages": [{"role": "user", "content": "todo app"}]}),
            ),
        )
        .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let id = response.headers()[GENERATED_CODE_ID_HEADER]
            .to_str()
            .unwrap()
            .to_owned();

        let (status, body) = read_body(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "```tsx\nexport default App;\n```");

        let stored = state.store.get_code(&id).await.unwrap().unwrap();
        assert_eq!(stored.code, body);
        assert_eq!(stored.prompt, "todo app");
        assert_eq!(stored.model, "gemini-1.5-pro");
        assert_eq!(model.calls.lock().unwrap()[0].1, "todo app");
    }

    #[tokio::test]
    async fn missing_user_message_is_rejected() {
        let (state, model) = state_with(FakeModel::default()).await;
        for messages in [json!([]), json!([{"role": "assistant", "content": "hi"}])] {
            let response = send(
                &state,
                post_json("/api/generateCode", json!({"model": "m", "messages": messages})),
            )
            .await;
            let (status, body) = read_json(response).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "A user message is required");
        }
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_model_falls_back_to_default() {
        let (state, model) = state_with(FakeModel {
            chunks: vec!["x"],
            ..FakeModel::default()
        })
        .await;
        let response = send(
            &state,
            post_json(
                "/api/generateCode",
                json!({"model": "", "messages": [{"role": "user", "content": "app"}]}),
            ),
        )
        .await;
        read_body(response).await;
        assert_eq!(model.calls.lock().unwrap()[0].0, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let (state, _) = state_with(FakeModel {
            fail: true,
            ..FakeModel::default()
        })
        .await;
        let response = send(
            &state,
            post_json(
                "/api/generateCode",
                json!({"model": "m", "messages": [{"role": "user", "content": "app"}]}),
            ),
        )
        .await;
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to generate code");
    }

    #[tokio::test]
    async fn broken_model_stream_fails_body_and_stores_nothing() {
        let (state, _) = state_with(FakeModel {
            chunks: vec!["```tsx\n", "export default"],
            break_stream: true,
            ..FakeModel::default()
        })
        .await;

        let response = send(
            &state,
            post_json(
                "/api/generateCode",
                json!({"model": "m", "messages": [{"role": "user", "content": "app"}]}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()[GENERATED_CODE_ID_HEADER]
            .to_str()
            .unwrap()
            .to_owned();

        assert!(response.into_body().collect().await.is_err());
        assert!(state.store.get_code(&id).await.unwrap().is_none());
    }
}
