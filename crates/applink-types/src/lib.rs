//! Shared types for AppLink.
//!
//! Everything that crosses the HTTP boundary between `applink-server` and the
//! client pipeline in `applink-core` lives here, together with the sign-in /
//! sign-up form validation both sides run.

pub mod api;
pub mod forms;
pub mod models;

pub use api::{
    AuthResponse, ChatMessage, ErrorBody, GenerateCodeRequest, GeneratedCode, ModifyCodeRequest,
    SaveCodeRequest, SaveCodeResponse, UserSession, DEFAULT_MODIFY_MODEL, GENERATED_CODE_ID_HEADER,
};
pub use forms::{FieldErrors, SignInForm, SignUpForm, validate_form};
pub use models::{DEFAULT_MODEL, MODEL_CATALOG, ModelOption, find_model};
