//! Catalog of generation models offered by the front-end.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub label: &'static str,
    pub value: &'static str,
}

/// Offered models, default first.
pub const MODEL_CATALOG: &[ModelOption] = &[
    ModelOption { label: "gemini-exp-1206", value: "gemini-exp-1206" },
    ModelOption { label: "gemini-2.0-flash-exp", value: "gemini-2.0-flash-exp" },
    ModelOption { label: "gemini-1.5-pro", value: "gemini-1.5-pro" },
    ModelOption { label: "gemini-1.5-flash", value: "gemini-1.5-flash" },
];

pub const DEFAULT_MODEL: &str = MODEL_CATALOG[0].value;

pub fn find_model(value: &str) -> Option<&'static ModelOption> {
    MODEL_CATALOG.iter().find(|m| m.value == value)
}
