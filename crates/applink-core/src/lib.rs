//! Client pipeline for AppLink.
//!
//! A generation is streamed from the server through [`ingest`], which
//! decodes the bytes, strips markdown fences ([`fence`]) and republishes the
//! cleaned code into the [`session`] after every chunk. Follow-up edits go
//! through the [`dispatcher`], which debounces rapid prompts and keeps at
//! most one modification in flight. [`studio::Studio`] ties these together
//! for a front-end; [`auth`] and [`credentials`] handle sign-in state.

pub mod auth;
pub mod client;
pub mod credentials;
pub mod dispatcher;
pub mod fence;
pub mod ingest;
pub mod session;
pub mod studio;

pub use auth::AuthFlow;
pub use client::{ClientError, CodeService, GenerationStream, HttpCodeService};
pub use credentials::{
    CredentialStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StorageError,
};
pub use dispatcher::{DispatcherConfig, IgnoreReason, ModifyDispatcher, SubmitOutcome};
pub use fence::strip_code_fences;
pub use ingest::{IngestOutput, StreamIngest, ingest_stream};
pub use session::{InvalidTransition, SessionHolder, SessionSnapshot, SessionStatus};
pub use studio::{Studio, StudioError};
