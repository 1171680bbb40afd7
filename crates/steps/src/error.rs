//! Step invocation error types.

use thiserror::Error;

/// Errors returned across the step, job and storage boundaries.
///
/// Every error maps to a stable `{code, message}` pair through [`StepError::code`]
/// so the engine can record it on the execution without knowing the variant.
#[derive(Debug, Error)]
pub enum StepError {
    /// Step not found in registry.
    #[error("Step not found: {0}")]
    NotFound(String),

    /// The step ran and reported a failure.
    #[error("Step failed [{code}]: {message}")]
    Failed { code: String, message: String },

    /// Step invocation timed out.
    #[error("Invocation timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Object missing from storage.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias using StepError.
pub type StepResult<T> = Result<T, StepError>;

impl StepError {
    /// Build a `Failed` error from a code and message.
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        StepError::Failed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &str {
        match self {
            StepError::NotFound(_) => "STEP_NOT_FOUND",
            StepError::Failed { code, .. } => code,
            StepError::Timeout(_) => "TIMEOUT",
            StepError::Configuration(_) => "CONFIGURATION",
            StepError::Http(_) => "HTTP",
            StepError::Json(_) => "JSON",
            StepError::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            StepError::Io(_) => "IO",
        }
    }

    /// Transport failures and timeouts are worth another attempt; anything the
    /// step itself reported is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Http(_) | StepError::Timeout(_))
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StepError::ObjectNotFound(e.to_string())
        } else {
            StepError::Io(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for StepError {
    fn from(e: reqwest::Error) -> Self {
        StepError::Http(e.to_string())
    }
}
