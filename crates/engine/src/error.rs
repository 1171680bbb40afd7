//! Error types for the docflow engine.

use docflow_steps::StepError;
use thiserror::Error;

/// Engine-level errors.
///
/// Every variant that can end an execution has a stable code (see
/// [`EngineError::code`]) that is recorded on the execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Workflow definition failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parse error (YAML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A Task state's step failed
    #[error("Step '{step}' failed in state '{state}': {source}")]
    StepInvocation {
        state: String,
        step: String,
        #[source]
        source: StepError,
    },

    /// A Choice state matched no rule and has no default
    #[error("No choice rule matched in state '{0}' and no default is declared")]
    ChoiceNoMatch(String),

    /// One or more fan-out items failed
    #[error("{} of {total} item(s) failed in map state '{state}': indices {failed:?}", .failed.len())]
    MapItem {
        state: String,
        total: usize,
        failed: Vec<usize>,
    },

    /// The job service answered with a status outside the protocol
    #[error("Job '{job_id}' reported unknown status '{status}'")]
    JobPollProtocol { job_id: String, status: String },

    /// The job service reported FAILED
    #[error("Job '{job_id}' failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The job exhausted its own poll budget
    #[error("Job '{job_id}' still running after {polls} poll(s)")]
    JobTimeout { job_id: String, polls: u32 },

    /// The execution passed its deadline
    #[error("Workflow timed out after {0} seconds")]
    WorkflowTimeout(u64),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable error code recorded on failed executions.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::Parse(_) => "ParseError",
            EngineError::Config(_) => "ConfigError",
            EngineError::Serialization(_) => "SerializationError",
            EngineError::StepInvocation { .. } => "StepInvocationError",
            EngineError::ChoiceNoMatch(_) => "ChoiceNoMatchError",
            EngineError::MapItem { .. } => "MapItemError",
            EngineError::JobPollProtocol { .. } => "JobPollProtocolError",
            EngineError::JobFailed { .. } => "JobFailedError",
            EngineError::JobTimeout { .. } => "JobTimeoutError",
            EngineError::WorkflowTimeout(_) => "WorkflowTimeoutError",
            EngineError::Internal(_) => "InternalError",
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Validation("start state missing".to_string());
        assert_eq!(err.to_string(), "Validation error: start state missing");

        let err = EngineError::ChoiceNoMatch("CheckAttachments".to_string());
        assert_eq!(
            err.to_string(),
            "No choice rule matched in state 'CheckAttachments' and no default is declared"
        );

        let err = EngineError::MapItem {
            state: "ProcessAttachments".to_string(),
            total: 4,
            failed: vec![1, 3],
        };
        assert_eq!(
            err.to_string(),
            "2 of 4 item(s) failed in map state 'ProcessAttachments': indices [1, 3]"
        );
    }

    #[test]
    fn test_error_codes() {
        let err = EngineError::StepInvocation {
            state: "DetectInvoice".to_string(),
            step: "detectInvoice".to_string(),
            source: StepError::failed("HTTP_400", "bad request"),
        };
        assert_eq!(err.code(), "StepInvocationError");
        assert!(err.to_string().contains("HTTP_400"));

        assert_eq!(EngineError::WorkflowTimeout(300).code(), "WorkflowTimeoutError");
        assert_eq!(
            EngineError::JobPollProtocol {
                job_id: "j".into(),
                status: "?".into()
            }
            .code(),
            "JobPollProtocolError"
        );
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err: EngineError = yaml_err.into();
        assert!(matches!(err, EngineError::Parse(_)));
    }
}
