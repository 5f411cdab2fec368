//! The operations a front-end calls, wired over one session.

use std::sync::Arc;

use applink_types::{ChatMessage, GenerateCodeRequest, SaveCodeRequest, SaveCodeResponse, find_model};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::client::{ClientError, CodeService};
use crate::dispatcher::{DispatcherConfig, ModifyDispatcher, SubmitOutcome};
use crate::ingest::ingest_stream;
use crate::session::{InvalidTransition, SessionHolder, SessionSnapshot};

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Please enter a description of the app")]
    EmptyPrompt,

    #[error(transparent)]
    Busy(#[from] InvalidTransition),

    #[error("Nothing to save yet")]
    NothingToSave,

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct Studio<S> {
    service: Arc<S>,
    session: SessionHolder,
    dispatcher: ModifyDispatcher,
}

impl<S: CodeService> Studio<S> {
    pub fn new(service: Arc<S>, model: impl Into<String>) -> Self {
        Self::with_config(service, model, DispatcherConfig::default())
    }

    pub fn with_config(service: Arc<S>, model: impl Into<String>, config: DispatcherConfig) -> Self {
        let session = SessionHolder::new(model);
        let dispatcher = ModifyDispatcher::spawn(service.clone(), session.clone(), config);
        Self {
            service,
            session,
            dispatcher,
        }
    }

    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    pub fn set_model(&self, model: &str) {
        if find_model(model).is_none() {
            warn!(model, "model is not in the catalog");
        }
        self.session.set_model(model);
    }

    pub fn clear_error(&self) {
        self.session.clear_error();
    }

    /// Stream a fresh generation for `prompt` into the session.
    ///
    /// Cleaned code is published after every chunk. On failure the session
    /// returns to `initial` with the message in the error slot; whatever was
    /// published before the failure stays visible.
    pub async fn generate(&self, prompt: &str) -> Result<SessionSnapshot, StudioError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        let model = self.session.begin_generation()?;
        let messages = vec![ChatMessage::user(prompt)];
        let request = GenerateCodeRequest {
            model: model.clone(),
            messages: messages.clone(),
        };
        info!(%model, "generation requested");

        let stream = match self.service.generate_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.generation_failed(e)),
        };
        let code_id = stream.code_id;
        let output = match ingest_stream(stream.body, |code| self.session.publish_code(code)).await {
            Ok(output) => output,
            Err(e) => return Err(self.generation_failed(e)),
        };

        info!(chunks = output.chunks, code_len = output.code.len(), "generation complete");
        self.session
            .finish_generation(output.code, code_id, model, messages)?;
        Ok(self.session.snapshot())
    }

    fn generation_failed(&self, e: ClientError) -> StudioError {
        error!(error = %e, "generation failed");
        if let Err(t) = self.session.fail_generation(e.to_string()) {
            warn!(error = %t, "could not revert session after failed generation");
        }
        StudioError::Client(e)
    }

    /// Whether a prompt entered now should start a fresh generation rather
    /// than modify. Only `created` and `updated` have code to modify; code
    /// left behind by a failed generation does not count.
    pub fn next_prompt_generates(&self) -> bool {
        !self.session.status().is_terminal()
    }

    /// Modify the current code now.
    pub async fn submit_modification(&self, prompt: &str) -> SubmitOutcome {
        self.dispatcher.submit_immediate(prompt).await
    }

    /// Modify the current code once typing pauses.
    pub fn queue_modification(&self, prompt: &str) {
        self.dispatcher.submit_debounced(prompt);
    }

    pub fn cancel_pending(&self) {
        self.dispatcher.cancel();
    }

    /// Save the current code under the id of the generation that produced it.
    pub async fn save(&self) -> Result<SaveCodeResponse, StudioError> {
        let snapshot = self.session.snapshot();
        match snapshot.code_id {
            Some(id) => self.save_as(&id).await,
            None => Err(StudioError::NothingToSave),
        }
    }

    /// Save the current code under `id`.
    pub async fn save_as(&self, id: &str) -> Result<SaveCodeResponse, StudioError> {
        let snapshot = self.session.snapshot();
        if !snapshot.has_code() || id.is_empty() {
            return Err(StudioError::NothingToSave);
        }
        let response = self
            .service
            .save_code(&SaveCodeRequest::new(id, snapshot.code))
            .await?;
        info!(id, "code saved");
        Ok(response)
    }

    /// Resolve once no generation or modification is running.
    pub async fn settled(&self) -> SessionSnapshot {
        self.session.settled().await
    }

    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use applink_types::{
        AuthResponse, GeneratedCode, ModifyCodeRequest, SignInForm, SignUpForm,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::client::GenerationStream;
    use crate::session::SessionStatus;

    #[derive(Default)]
    struct FakeService {
        chunks: Vec<&'static str>,
        fail_after: Option<usize>,
        reject: bool,
        saved: Mutex<Vec<SaveCodeRequest>>,
        requests: Mutex<Vec<GenerateCodeRequest>>,
    }

    #[async_trait]
    impl CodeService for FakeService {
        async fn generate_stream(
            &self,
            request: &GenerateCodeRequest,
        ) -> Result<GenerationStream, ClientError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(ClientError::Status {
                    status: 502,
                    message: "Failed to generate code".into(),
                });
            }
            let mut items: Vec<Result<Bytes, ClientError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(ClientError::EmptyBody));
            }
            Ok(GenerationStream {
                code_id: Some("gen-1".into()),
                body: futures::stream::iter(items).boxed(),
            })
        }

        async fn modify_code(&self, request: &ModifyCodeRequest) -> Result<String, ClientError> {
            Ok(format!("{}\n// {}", request.code, request.prompt))
        }

        async fn save_code(&self, request: &SaveCodeRequest) -> Result<SaveCodeResponse, ClientError> {
            self.saved.lock().unwrap().push(request.clone());
            let (id, code) = request.fields().ok_or(ClientError::EmptyBody)?;
            let now = chrono::Utc::now();
            Ok(SaveCodeResponse {
                success: true,
                data: GeneratedCode {
                    id: id.into(),
                    code: code.into(),
                    model: "m".into(),
                    prompt: "p".into(),
                    created_at: now,
                    updated_at: now,
                },
            })
        }

        async fn sign_in(&self, _: &SignInForm) -> Result<AuthResponse, ClientError> {
            unimplemented!("not used by studio tests")
        }

        async fn sign_up(&self, _: &SignUpForm) -> Result<AuthResponse, ClientError> {
            unimplemented!("not used by studio tests")
        }
    }

    fn studio(service: FakeService) -> (Arc<FakeService>, Studio<FakeService>) {
        let service = Arc::new(service);
        (service.clone(), Studio::new(service, "gemini-1.5-pro"))
    }

    #[tokio::test]
    async fn generate_streams_into_session() {
        let (service, studio) = studio(FakeService {
            chunks: vec!["```ts\n", "const y", "=2;\n```"],
            ..FakeService::default()
        });
        let mut rx = studio.subscribe();

        let snapshot = studio.generate("  a counter  ").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Created);
        assert_eq!(snapshot.code, "const y=2;");
        assert_eq!(snapshot.code_id.as_deref(), Some("gen-1"));
        assert_eq!(snapshot.messages, vec![ChatMessage::user("a counter")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().code, "const y=2;");

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests[0].model, "gemini-1.5-pro");
        assert_eq!(requests[0].last_user_prompt(), Some("a counter"));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_locally() {
        let (service, studio) = studio(FakeService::default());
        assert!(matches!(
            studio.generate("   ").await,
            Err(StudioError::EmptyPrompt)
        ));
        assert!(service.requests.lock().unwrap().is_empty());
        assert_eq!(studio.snapshot().status, SessionStatus::Initial);
    }

    #[tokio::test]
    async fn read_failure_reverts_to_initial_and_keeps_partial_code() {
        let (_, studio) = studio(FakeService {
            chunks: vec!["const a", " = 1;"],
            fail_after: Some(1),
            ..FakeService::default()
        });

        assert!(studio.generate("app").await.is_err());
        let snapshot = studio.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Initial);
        assert_eq!(snapshot.code, "const a");
        assert!(snapshot.error.is_some());
        assert!(!snapshot.inputs_disabled());
    }

    #[tokio::test]
    async fn rejected_request_reverts_without_publishing() {
        let (service, studio) = studio(FakeService {
            chunks: vec!["never sent"],
            reject: true,
            ..FakeService::default()
        });
        let mut rx = studio.subscribe();
        rx.borrow_and_update();

        match studio.generate("app").await {
            Err(StudioError::Client(e)) => assert_eq!(e.status(), Some(502)),
            other => panic!("unexpected result: {other:?}"),
        }
        let snapshot = studio.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Initial);
        assert_eq!(snapshot.error.as_deref(), Some("Failed to generate code"));
        assert!(snapshot.code.is_empty());
        assert!(!snapshot.has_code());
        assert_eq!(service.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prompt_after_failed_generation_generates_again() {
        let (service, studio) = studio(FakeService {
            chunks: vec!["const a", " = 1;"],
            fail_after: Some(1),
            ..FakeService::default()
        });
        assert!(studio.next_prompt_generates());
        assert!(studio.generate("app").await.is_err());

        // Partial code is visible but the session never reached `created`.
        assert!(studio.snapshot().has_code());
        assert!(studio.next_prompt_generates());
        assert!(matches!(
            studio.generate("app again").await,
            Err(StudioError::Client(_))
        ));
        assert_eq!(service.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn prompt_after_successful_generation_modifies() {
        let (_, studio) = studio(FakeService {
            chunks: vec!["let a = 1;"],
            ..FakeService::default()
        });
        studio.generate("app").await.unwrap();
        assert!(!studio.next_prompt_generates());
    }

    #[tokio::test]
    async fn modification_then_save_uses_generation_id() {
        let (service, studio) = studio(FakeService {
            chunks: vec!["let a = 1;"],
            ..FakeService::default()
        });
        studio.generate("app").await.unwrap();

        assert!(studio.submit_modification("add b").await.is_started());
        let snapshot = studio.settled().await;
        assert_eq!(snapshot.status, SessionStatus::Updated);
        assert_eq!(snapshot.code, "let a = 1;\n// add b");

        let saved = studio.save().await.unwrap();
        assert!(saved.success);
        assert_eq!(saved.data.id, "gen-1");
        let requests = service.saved.lock().unwrap();
        assert_eq!(requests[0].fields(), Some(("gen-1", "let a = 1;\n// add b")));
    }

    #[tokio::test]
    async fn save_before_generation_is_refused() {
        let (service, studio) = studio(FakeService::default());
        assert!(matches!(studio.save().await, Err(StudioError::NothingToSave)));
        assert!(service.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_model_applies_to_next_generation() {
        let (service, studio) = studio(FakeService {
            chunks: vec!["x"],
            ..FakeService::default()
        });
        studio.set_model("gemini-1.5-flash");
        studio.generate("app").await.unwrap();
        assert_eq!(
            studio.snapshot().generated_with.as_deref(),
            Some("gemini-1.5-flash")
        );
        assert_eq!(service.requests.lock().unwrap()[0].model, "gemini-1.5-flash");
    }
}
