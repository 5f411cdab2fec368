//! Session state: lifecycle status, current code artifact, error slot.
//!
//! [`SessionStatus`] is a closed state machine; every transition is a method
//! that either returns the next state or an [`InvalidTransition`]. The
//! [`SessionHolder`] owns the live [`SessionSnapshot`] and publishes each
//! change over a `tokio::sync::watch` channel so UI observers can follow
//! code and status as they change.

use std::sync::Arc;

use applink_types::ChatMessage;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Generation / modification lifecycle.
///
/// ```text
/// initial --start generation--> creating --ok--> created
///                                        --err--> initial
/// created|updated --start modify--> updating --ok--> updated
///                                            --err--> previous terminal state
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Initial,
    Creating,
    Created,
    Updating,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while {from}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub action: &'static str,
}

impl SessionStatus {
    /// Form controls are disabled while loading.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Creating | Self::Updating)
    }

    /// `created` or `updated`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    fn deny(self, action: &'static str) -> InvalidTransition {
        InvalidTransition { from: self, action }
    }

    pub fn start_generation(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Initial | Self::Created | Self::Updated => Ok(Self::Creating),
            _ => Err(self.deny("start generation")),
        }
    }

    pub fn complete_generation(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Creating => Ok(Self::Created),
            _ => Err(self.deny("complete generation")),
        }
    }

    pub fn fail_generation(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Creating => Ok(Self::Initial),
            _ => Err(self.deny("fail generation")),
        }
    }

    pub fn start_modification(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Created | Self::Updated => Ok(Self::Updating),
            _ => Err(self.deny("start modification")),
        }
    }

    pub fn complete_modification(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Updating => Ok(Self::Updated),
            _ => Err(self.deny("complete modification")),
        }
    }

    /// Fall back to `resume`, the terminal state held before the modification.
    pub fn fail_modification(self, resume: SessionStatus) -> Result<Self, InvalidTransition> {
        match self {
            Self::Updating if resume.is_terminal() => Ok(resume),
            _ => Err(self.deny("fail modification")),
        }
    }
}

/// Immutable view of the session published to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// The current code artifact, already fence-stripped.
    pub code: String,
    /// Id of the stored generation, once the server has reported one.
    pub code_id: Option<String>,
    /// Model the session generates and modifies with.
    pub model: String,
    /// Model used for the generation currently shown.
    pub generated_with: Option<String>,
    /// Conversation that produced the current generation.
    pub messages: Vec<ChatMessage>,
    /// Latest text of the modification input.
    pub modification_prompt: String,
    /// A modification request is in flight.
    pub modifying: bool,
    /// User-facing message of the last failure.
    pub error: Option<String>,
    /// Terminal state to fall back to if the running modification fails.
    pub resume_to: Option<SessionStatus>,
}

impl SessionSnapshot {
    pub fn inputs_disabled(&self) -> bool {
        self.status.is_loading()
    }

    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Inputs for a modification, captured when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationTicket {
    pub code: String,
    pub model: String,
}

/// Shared owner of the session; cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHolder {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionHolder {
    pub fn new(model: impl Into<String>) -> Self {
        let snapshot = SessionSnapshot {
            model: model.into(),
            ..SessionSnapshot::default()
        };
        let (tx, _rx) = watch::channel(snapshot);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.tx.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Resolve once the session is neither creating nor updating.
    pub async fn settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.status.is_loading() && !s.modifying).await {
            Ok(s) => (*s).clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.snapshot(),
        }
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        self.tx.send_modify(|s| s.model = model);
    }

    pub fn set_modification_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.tx.send_if_modified(|s| {
            if s.modification_prompt == prompt {
                return false;
            }
            s.modification_prompt = prompt;
            true
        });
    }

    pub fn clear_error(&self) {
        self.tx.send_if_modified(|s| s.error.take().is_some());
    }

    /// Move to `creating`, clear the error slot and the code artifact.
    /// Returns the model to generate with.
    pub fn begin_generation(&self) -> Result<String, InvalidTransition> {
        let mut outcome = Err(self.status().deny("start generation"));
        self.tx.send_if_modified(|s| match s.status.start_generation() {
            Ok(next) => {
                s.status = next;
                s.error = None;
                s.code.clear();
                s.code_id = None;
                outcome = Ok(s.model.clone());
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        if outcome.is_ok() {
            debug!("generation started");
        }
        outcome
    }

    /// Publish an intermediate (or final) cleaned code buffer.
    pub fn publish_code(&self, code: &str) {
        self.tx.send_if_modified(|s| {
            if s.code == code {
                return false;
            }
            s.code.clear();
            s.code.push_str(code);
            true
        });
    }

    pub fn finish_generation(
        &self,
        code: String,
        code_id: Option<String>,
        model: String,
        messages: Vec<ChatMessage>,
    ) -> Result<(), InvalidTransition> {
        self.transition(|s| {
            s.status = s.status.complete_generation()?;
            s.code = code;
            s.code_id = code_id;
            s.generated_with = Some(model);
            s.messages = messages;
            Ok(())
        })
    }

    pub fn fail_generation(&self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        let message = message.into();
        self.transition(|s| {
            s.status = s.status.fail_generation()?;
            s.error = Some(message);
            Ok(())
        })
    }

    /// Move to `updating` and mark a modification in flight. The error slot
    /// is left untouched.
    pub fn begin_modification(&self) -> Result<ModificationTicket, InvalidTransition> {
        let mut ticket = None;
        self.transition(|s| {
            let resume = s.status;
            s.status = s.status.start_modification()?;
            s.resume_to = Some(resume);
            s.modifying = true;
            ticket = Some(ModificationTicket {
                code: s.code.clone(),
                model: s.model.clone(),
            });
            Ok(())
        })?;
        ticket.ok_or(SessionStatus::Updating.deny("start modification"))
    }

    pub fn finish_modification(&self, code: String) -> Result<(), InvalidTransition> {
        self.transition(|s| {
            s.status = s.status.complete_modification()?;
            s.code = code;
            s.resume_to = None;
            s.modification_prompt.clear();
            Ok(())
        })
    }

    pub fn fail_modification(&self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        let message = message.into();
        self.transition(|s| {
            let resume = s.resume_to.unwrap_or(SessionStatus::Created);
            s.status = s.status.fail_modification(resume)?;
            s.resume_to = None;
            s.error = Some(message);
            Ok(())
        })
    }

    /// Clear the in-flight flag. Idempotent.
    pub fn end_modification(&self) {
        self.tx.send_if_modified(|s| std::mem::replace(&mut s.modifying, false));
    }

    /// Apply `f` to a scratch copy and publish it only if `f` succeeds, so a
    /// rejected transition leaves the session untouched.
    fn transition<F>(&self, f: F) -> Result<(), InvalidTransition>
    where
        F: FnOnce(&mut SessionSnapshot) -> Result<(), InvalidTransition>,
    {
        let mut result = Ok(());
        self.tx.send_if_modified(|s| {
            let mut next = s.clone();
            match f(&mut next) {
                Ok(()) => {
                    debug!(from = %s.status, to = %next.status, "session transition");
                    *s = next;
                    true
                }
                Err(e) => {
                    result = Err(e);
                    false
                }
            }
        });
        result
    }
}
