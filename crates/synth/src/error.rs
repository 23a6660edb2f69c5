//! Error types for stack synthesis.

use thiserror::Error;

/// Errors produced while resolving context or assembling the template.
///
/// Everything beyond this list — malformed resource parameters, permission
/// conflicts, capacity limits — is validated by the cloud control plane at
/// deployment time, not here.
#[derive(Debug, Error)]
pub enum Error {
    /// A context key that no builder consumes.
    #[error("unknown context key: {0}")]
    UnknownContextKey(String),

    /// A context value that does not parse for its key.
    #[error("invalid value {value:?} for context key {key}")]
    InvalidContextValue { key: String, value: String },

    /// Two resources were registered under the same logical ID.
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    /// A post-pass referenced a logical ID that was never registered.
    #[error("unknown logical id: {0}")]
    UnknownLogicalId(String),

    /// Template could not be rendered as JSON.
    #[error("failed to render template as JSON")]
    Json(#[from] serde_json::Error),

    /// Template could not be rendered as YAML.
    #[error("failed to render template as YAML")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
