//! Step output types.

use serde::{Deserialize, Serialize};

/// Output of a successful step invocation.
///
/// `data` is the context fragment the engine merges back into the execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutput {
    /// Context fragment produced by the step.
    pub data: serde_json::Value,

    /// Invocation duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Number of attempts it took, including the successful one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl StepOutput {
    /// Create an output carrying a context fragment.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            data,
            duration_ms: None,
            attempts: 1,
        }
    }

    /// Output that merges nothing.
    pub fn empty() -> Self {
        Self::success(serde_json::Value::Null)
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Returns true if there is nothing to merge.
    pub fn is_empty(&self) -> bool {
        match &self.data {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}
