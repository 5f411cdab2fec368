//! Sign-in / sign-up forms and their field validation.
//!
//! The client runs these checks before any network call; the server runs
//! them again on the decoded body.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub const MIN_PASSWORD_LEN: u64 = 8;

/// Field name → message, one message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The first message in field order, used as a one-line summary.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().next().map(String::as_str)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            // A missing value is reported before any format problem.
            let chosen = errs
                .iter()
                .find(|e| e.code == "length")
                .or_else(|| errs.first());
            if let Some(err) = chosen {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

/// Run the derived field rules of `form`.
pub fn validate_form<F: Validate>(form: &F) -> Result<(), FieldErrors> {
    form.validate().map_err(FieldErrors::from)
}

/// Credentials posted to `/api/auth/signin`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignInForm {
    #[validate(
        length(min = 1, message = "Email is required"),
        regex(path = *EMAIL_RE, message = "Invalid email format")
    )]
    #[serde(default)]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[serde(default)]
    pub password: String,
}

impl SignInForm {
    pub fn check(&self) -> Result<(), FieldErrors> {
        validate_form(self)
    }
}

/// Account details posted to `/api/auth/signup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    #[validate(length(min = 1, message = "Full name is required"))]
    #[serde(default)]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        regex(path = *EMAIL_RE, message = "Invalid email format")
    )]
    #[serde(default)]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub confirm_password: String,
}

impl SignUpForm {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = match validate_form(self) {
            Ok(()) => FieldErrors::new(),
            Err(errors) => errors,
        };
        if self.password != self.confirm_password {
            errors.add("confirm_password", "Passwords do not match");
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
