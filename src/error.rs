//! Error types for store and registry operations.

use thiserror::Error;

/// Misuse of a store or registry.
///
/// Errors raised by action bodies are not wrapped in this type; they reach
/// the caller of [`Store::call`](crate::Store::call) as the exact
/// `anyhow::Error` the action returned.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store \"{id}\" is built using the setup syntax and does not implement reset()")]
    ResetUnsupported { id: String },

    #[error("no active registry: install a registry or pass one explicitly")]
    NoActiveRegistry,

    #[error("registry has been disposed")]
    RegistryDisposed,

    #[error("store \"{id}\" has no action named \"{name}\"")]
    UnknownAction { id: String, name: String },

    #[error("store \"{id}\" has no state field named \"{key}\"")]
    UnknownField { id: String, key: String },

    #[error("store \"{id}\" has no custom method named \"{name}\"")]
    UnknownMethod { id: String, name: String },

    #[error("member \"{key}\" of store \"{id}\" belongs to another reactive runtime")]
    ForeignCell { id: String, key: String },

    #[error("state of store \"{id}\" must be an object, got {found}")]
    NotAnObject { id: String, found: &'static str },

    #[error("state (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Short JSON type name used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
