//! Debounced modification dispatcher.
//!
//! Both entry points post a [`Command`] to a single worker task. The worker
//! owns the one pending debounce slot (latest prompt wins) and the handle of
//! the modification currently in flight, so at most one modify request is
//! ever outstanding and no caller touches those flags directly.

use std::sync::Arc;
use std::time::Duration;

use applink_types::ModifyCodeRequest;
use strum::Display;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::client::CodeService;
use crate::fence::strip_code_fences;
use crate::session::{ModificationTicket, SessionHolder};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Quiet interval after the most recent debounced submission.
    pub quiet_period: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IgnoreReason {
    #[strum(to_string = "prompt is empty")]
    EmptyPrompt,
    #[strum(to_string = "a modification is already running")]
    InFlight,
    #[strum(to_string = "there is no code to modify yet")]
    NoBaseCode,
    #[strum(to_string = "the session is busy")]
    NotReady,
    #[strum(to_string = "the dispatcher has shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started,
    Ignored(IgnoreReason),
}

impl SubmitOutcome {
    pub fn is_started(self) -> bool {
        matches!(self, Self::Started)
    }
}

enum Command {
    Immediate {
        prompt: String,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Debounced {
        prompt: String,
    },
    Cancel,
    Shutdown,
}

struct Pending {
    prompt: String,
    deadline: Instant,
}

/// Handle to the dispatcher worker. Dropping it cancels any pending
/// debounced prompt; a modification already in flight still completes.
#[derive(Debug)]
pub struct ModifyDispatcher {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl ModifyDispatcher {
    pub fn spawn<S: CodeService>(
        service: Arc<S>,
        session: SessionHolder,
        config: DispatcherConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            service,
            session,
            quiet_period: config.quiet_period,
            pending: None,
            in_flight: None,
        };
        let worker = tokio::spawn(worker.run(rx));
        Self { tx, worker }
    }

    /// Start a modification now, unless one of the preconditions fails.
    /// Any pending debounced prompt is discarded.
    pub async fn submit_immediate(&self, prompt: impl Into<String>) -> SubmitOutcome {
        let (reply, rx) = oneshot::channel();
        let command = Command::Immediate {
            prompt: prompt.into(),
            reply,
        };
        if self.tx.send(command).is_err() {
            return SubmitOutcome::Ignored(IgnoreReason::Closed);
        }
        rx.await
            .unwrap_or(SubmitOutcome::Ignored(IgnoreReason::Closed))
    }

    /// Record `prompt` and (re)start the quiet-period timer.
    pub fn submit_debounced(&self, prompt: impl Into<String>) {
        let _ = self.tx.send(Command::Debounced {
            prompt: prompt.into(),
        });
    }

    /// Drop the pending debounced prompt, if any.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }

    /// Stop the worker after cancelling anything pending.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "dispatcher worker ended abnormally");
        }
    }
}

struct Worker<S> {
    service: Arc<S>,
    session: SessionHolder,
    quiet_period: Duration,
    pending: Option<Pending>,
    in_flight: Option<JoinHandle<()>>,
}

impl<S: CodeService> Worker<S> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);
            let in_flight = &mut self.in_flight;

            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Immediate { prompt, reply }) => {
                        if self.pending.take().is_some() {
                            debug!("immediate submit supersedes pending prompt");
                        }
                        let outcome = self.start(prompt);
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Debounced { prompt }) => {
                        self.session.set_modification_prompt(prompt.as_str());
                        self.pending = Some(Pending {
                            prompt,
                            deadline: Instant::now() + self.quiet_period,
                        });
                    }
                    Some(Command::Cancel) => {
                        if self.pending.take().is_some() {
                            debug!("pending modification cancelled");
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                () = wait_deadline(deadline), if deadline.is_some() => {
                    if let Some(pending) = self.pending.take() {
                        let outcome = self.start(pending.prompt);
                        debug!(?outcome, "debounced modification fired");
                    }
                }
                joined = wait_job(in_flight) => {
                    self.in_flight = None;
                    self.job_finished(joined);
                }
            }
        }
        debug!("modify dispatcher stopped");
    }

    fn start(&mut self, prompt: String) -> SubmitOutcome {
        if prompt.trim().is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyPrompt);
        }
        if self.in_flight.as_ref().is_some_and(|job| !job.is_finished()) {
            return SubmitOutcome::Ignored(IgnoreReason::InFlight);
        }
        if !self.session.snapshot().has_code() {
            return SubmitOutcome::Ignored(IgnoreReason::NoBaseCode);
        }
        let ticket = match self.session.begin_modification() {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(error = %e, "modification not started");
                return SubmitOutcome::Ignored(IgnoreReason::NotReady);
            }
        };

        info!(model = %ticket.model, prompt_len = prompt.len(), "modification started");
        let job = run_modification(self.service.clone(), self.session.clone(), prompt, ticket);
        self.in_flight = Some(tokio::spawn(job));
        SubmitOutcome::Started
    }

    fn job_finished(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "modification task failed");
            let _ = self.session.fail_modification("Failed to modify code");
        }
        self.session.end_modification();
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_job(job: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match job {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Clears the in-flight flag however the job ends.
struct InFlightGuard(SessionHolder);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.end_modification();
    }
}

async fn run_modification<S: CodeService>(
    service: Arc<S>,
    session: SessionHolder,
    prompt: String,
    ticket: ModificationTicket,
) {
    let _guard = InFlightGuard(session.clone());
    let request = ModifyCodeRequest {
        code: ticket.code,
        prompt,
        model: ticket.model,
    };

    match service.modify_code(&request).await {
        Ok(text) => {
            let code = strip_code_fences(&text);
            if let Err(e) = session.finish_modification(code) {
                warn!(error = %e, "modification result discarded");
            } else {
                info!("modification applied");
            }
        }
        Err(e) => {
            error!(error = %e, "modification failed");
            if let Err(e) = session.fail_modification(e.to_string()) {
                warn!(error = %e, "could not revert session after failed modification");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use applink_types::{
        AuthResponse, SaveCodeRequest, SaveCodeResponse, SignInForm, SignUpForm,
    };
    use async_trait::async_trait;

    use super::*;
    use crate::client::{ClientError, GenerationStream};
    use crate::session::SessionStatus;

    #[derive(Default)]
    struct FakeService {
        prompts: Mutex<Vec<String>>,
        fail_with: Option<u16>,
        delay: Option<Duration>,
    }

    impl FakeService {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CodeService for FakeService {
        async fn generate_stream(
            &self,
            _request: &applink_types::GenerateCodeRequest,
        ) -> Result<GenerationStream, ClientError> {
            unimplemented!("not used by dispatcher tests")
        }

        async fn modify_code(&self, request: &ModifyCodeRequest) -> Result<String, ClientError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.fail_with {
                Some(status) => Err(ClientError::Status {
                    status,
                    message: "Failed to modify code".into(),
                }),
                None => Ok(format!("```tsx\n{} // {}\n```", request.code, request.prompt)),
            }
        }

        async fn save_code(&self, _: &SaveCodeRequest) -> Result<SaveCodeResponse, ClientError> {
            unimplemented!("not used by dispatcher tests")
        }

        async fn sign_in(&self, _: &SignInForm) -> Result<AuthResponse, ClientError> {
            unimplemented!("not used by dispatcher tests")
        }

        async fn sign_up(&self, _: &SignUpForm) -> Result<AuthResponse, ClientError> {
            unimplemented!("not used by dispatcher tests")
        }
    }

    fn generated_session() -> SessionHolder {
        let session = SessionHolder::new("gemini-1.5-pro");
        session.begin_generation().unwrap();
        session
            .finish_generation("let a = 1;".into(), None, "gemini-1.5-pro".into(), vec![])
            .unwrap();
        session
    }

    fn spawn(service: FakeService, session: &SessionHolder) -> (Arc<FakeService>, ModifyDispatcher) {
        let service = Arc::new(service);
        let dispatcher =
            ModifyDispatcher::spawn(service.clone(), session.clone(), DispatcherConfig::default());
        (service, dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_debounced_prompts_sends_only_the_last() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        for prompt in ["a", "b", "c"] {
            dispatcher.submit_debounced(prompt);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(service.prompts().is_empty());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let snapshot = session.settled().await;

        assert_eq!(service.prompts(), vec!["c".to_owned()]);
        assert_eq!(snapshot.status, SessionStatus::Updated);
        assert_eq!(snapshot.code, "let a = 1; // c");
        assert!(snapshot.modification_prompt.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_period_restarts_on_every_submission() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        dispatcher.submit_debounced("first");
        tokio::time::sleep(Duration::from_millis(400)).await;
        dispatcher.submit_debounced("second");
        tokio::time::sleep(Duration::from_millis(400)).await;
        // 800 ms after the first call, but only 400 ms after the second.
        assert!(service.prompts().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        session.settled().await;
        assert_eq!(service.prompts(), vec!["second".to_owned()]);
    }

    #[tokio::test]
    async fn blank_prompts_never_reach_the_service() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        for prompt in ["", "   ", "\n\t"] {
            assert_eq!(
                dispatcher.submit_immediate(prompt).await,
                SubmitOutcome::Ignored(IgnoreReason::EmptyPrompt)
            );
        }
        assert!(service.prompts().is_empty());
        assert_eq!(session.status(), SessionStatus::Created);
    }

    #[tokio::test]
    async fn nothing_to_modify_before_first_generation() {
        let session = SessionHolder::new("m");
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        assert_eq!(
            dispatcher.submit_immediate("make it blue").await,
            SubmitOutcome::Ignored(IgnoreReason::NoBaseCode)
        );
        assert!(service.prompts().is_empty());
    }

    #[tokio::test]
    async fn server_error_clears_in_flight_and_reverts_status() {
        let session = generated_session();
        let service = FakeService {
            fail_with: Some(500),
            ..FakeService::default()
        };
        let (_service, dispatcher) = spawn(service, &session);

        assert!(dispatcher.submit_immediate("make it blue").await.is_started());
        let snapshot = session.settled().await;

        assert!(!snapshot.modifying);
        assert_eq!(snapshot.status, SessionStatus::Created);
        assert_eq!(snapshot.code, "let a = 1;");
        assert_eq!(snapshot.error.as_deref(), Some("Failed to modify code"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_immediate_submit_is_ignored_while_in_flight() {
        let session = generated_session();
        let service = FakeService {
            delay: Some(Duration::from_secs(2)),
            ..FakeService::default()
        };
        let (service, dispatcher) = spawn(service, &session);

        assert!(dispatcher.submit_immediate("one").await.is_started());
        assert!(session.snapshot().modifying);
        assert_eq!(
            dispatcher.submit_immediate("two").await,
            SubmitOutcome::Ignored(IgnoreReason::InFlight)
        );

        session.settled().await;
        assert_eq!(service.prompts(), vec!["one".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_firing_during_in_flight_is_dropped() {
        let session = generated_session();
        let service = FakeService {
            delay: Some(Duration::from_secs(2)),
            ..FakeService::default()
        };
        let (service, dispatcher) = spawn(service, &session);

        assert!(dispatcher.submit_immediate("one").await.is_started());
        dispatcher.submit_debounced("two");
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.settled().await;

        assert_eq!(service.prompts(), vec!["one".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_prompt() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        dispatcher.submit_debounced("soon");
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(service.prompts().is_empty());
        assert_eq!(session.status(), SessionStatus::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_submit_supersedes_pending_prompt() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        dispatcher.submit_debounced("later");
        assert!(dispatcher.submit_immediate("now").await.is_started());
        tokio::time::sleep(Duration::from_secs(2)).await;
        session.settled().await;

        assert_eq!(service.prompts(), vec!["now".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_pending_prompt() {
        let session = generated_session();
        let (service, dispatcher) = spawn(FakeService::default(), &session);

        dispatcher.submit_debounced("never");
        dispatcher.shutdown().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(service.prompts().is_empty());
    }
}
