//! Execution record.
//!
//! One record per workflow run: the mutable context, where the run is, how
//! it ended and the ordered history of visited states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::workflow::{ContextPath, StateKind};

/// High-level execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Execution is in progress.
    Running,
    /// Execution reached a Succeed state or the end of a branch.
    Succeeded,
    /// Execution reached a Fail state or hit an error.
    Failed,
    /// Execution passed its deadline; the outcome of in-flight work is unknown.
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

impl From<&str> for ExecutionStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SUCCEEDED" | "SUCCESS" => Self::Succeeded,
            "FAILED" | "ERROR" => Self::Failed,
            "TIMED_OUT" | "TIMEOUT" => Self::TimedOut,
            _ => Self::Running,
        }
    }
}

/// How a visit to a state ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Transitioned { next: String },
    Succeeded,
    Failed { code: String, cause: String },
    TimedOut,
}

/// One visited state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: String,
    pub kind: StateKind,
    pub timestamp: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub cause: String,
}

/// A workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow: String,
    pub context: Value,
    pub current_state: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl Execution {
    /// Create a running execution positioned at `start`.
    pub fn new(workflow: &str, start: &str, context: Value, timeout: Duration) -> Self {
        let started_at = Utc::now();
        let deadline = started_at
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365));

        Self {
            id: Uuid::new_v4(),
            workflow: workflow.to_string(),
            context,
            current_state: start.to_string(),
            status: ExecutionStatus::Running,
            started_at,
            deadline,
            finished_at: None,
            history: Vec::new(),
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Names of visited states, in order.
    pub fn visited_states(&self) -> Vec<&str> {
        self.history.iter().map(|h| h.state.as_str()).collect()
    }

    fn push(&mut self, state: &str, kind: StateKind, outcome: Outcome, detail: Option<Value>) {
        self.history.push(HistoryEntry {
            state: state.to_string(),
            kind,
            timestamp: Utc::now(),
            outcome,
            detail,
        });
    }

    /// Record a visit that moves the execution to `next`.
    pub fn transition(&mut self, state: &str, kind: StateKind, next: &str, detail: Option<Value>) {
        self.push(
            state,
            kind,
            Outcome::Transitioned {
                next: next.to_string(),
            },
            detail,
        );
        self.current_state = next.to_string();
    }

    /// Record a visit that ends the execution successfully.
    pub fn succeed(&mut self, state: &str, kind: StateKind, detail: Option<Value>) {
        self.push(state, kind, Outcome::Succeeded, detail);
        self.finish(ExecutionStatus::Succeeded, None);
    }

    /// Record a visit that fails the execution.
    pub fn fail(
        &mut self,
        state: &str,
        kind: StateKind,
        code: impl Into<String>,
        cause: impl Into<String>,
        detail: Option<Value>,
    ) {
        let error = ExecutionError {
            code: code.into(),
            cause: cause.into(),
        };
        self.push(
            state,
            kind,
            Outcome::Failed {
                code: error.code.clone(),
                cause: error.cause.clone(),
            },
            detail,
        );
        self.finish(ExecutionStatus::Failed, Some(error));
    }

    /// Fail the execution with an engine error.
    pub fn fail_with(&mut self, state: &str, kind: StateKind, error: &EngineError, detail: Option<Value>) {
        self.fail(state, kind, error.code(), error.to_string(), detail);
    }

    /// Record that the deadline passed while in (or before entering) `state`.
    pub fn time_out(&mut self, state: &str, kind: StateKind, timeout: Duration) {
        self.push(state, kind, Outcome::TimedOut, None);
        let error = EngineError::WorkflowTimeout(timeout.as_secs());
        self.finish(
            ExecutionStatus::TimedOut,
            Some(ExecutionError {
                code: error.code().to_string(),
                cause: error.to_string(),
            }),
        );
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<ExecutionError>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    /// Merge a step output into the context.
    ///
    /// With a path the output is written there. Without one an object output
    /// is merged key by key into the root, `null` merges nothing and any other
    /// value is rejected.
    pub fn merge_output(&mut self, result_path: Option<&str>, output: Value) -> EngineResult<()> {
        merge_into(&mut self.context, result_path, output)
    }

    /// Wall-clock run time so far (or in total once finished).
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }
}

/// Merge `output` into `context` at `result_path` (see [`Execution::merge_output`]).
pub fn merge_into(context: &mut Value, result_path: Option<&str>, output: Value) -> EngineResult<()> {
    if let Some(path) = result_path {
        let path = ContextPath::parse(path).map_err(|e| EngineError::Validation(e.to_string()))?;
        return path
            .set(context, output)
            .map_err(|e| EngineError::Internal(e.to_string()));
    }

    match output {
        Value::Null => Ok(()),
        Value::Object(fragment) => {
            if context.is_null() {
                *context = Value::Object(serde_json::Map::new());
            }
            let root = context.as_object_mut().ok_or_else(|| {
                EngineError::Internal("execution context is not an object".to_string())
            })?;
            for (key, value) in fragment {
                root.insert(key, value);
            }
            Ok(())
        }
        other => Err(EngineError::Validation(format!(
            "step output must be an object when no result_path is set, got {}",
            other
        ))),
    }
}
