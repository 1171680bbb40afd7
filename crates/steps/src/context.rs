//! Context handed to a step invocation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Context passed to steps during invocation.
///
/// Steps see a snapshot of the execution context. They never mutate the
/// execution directly; whatever they want merged back goes into their
/// [`StepOutput`](crate::StepOutput).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepContext {
    /// Execution the invocation belongs to.
    pub execution_id: String,

    /// Workflow state that triggered the invocation.
    pub state: String,

    /// Step name being invoked.
    pub step: String,

    /// Unique id of this invocation, stable across retries.
    pub invocation_id: Uuid,

    /// Snapshot of the execution context fields.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,

    /// Attempt number, starting at 1.
    #[serde(default)]
    pub attempt: u32,
}

impl StepContext {
    /// Create a new step context.
    pub fn new(
        execution_id: impl Into<String>,
        state: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: state.into(),
            step: step.into(),
            invocation_id: Uuid::new_v4(),
            variables: HashMap::new(),
            attempt: 1,
        }
    }

    /// Attach the variables snapshot.
    pub fn with_variables(mut self, variables: HashMap<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Set a variable value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(name.into(), value);
    }

    /// Get a variable value.
    pub fn get_variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(name)
    }

    /// Get a variable as a string.
    pub fn get_variable_str(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => v.to_string(),
        })
    }

    /// Request body sent to remote processors: the variables plus invocation metadata.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut body: serde_json::Map<String, serde_json::Value> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        body.insert(
            "_docflow".to_string(),
            serde_json::json!({
                "execution_id": self.execution_id,
                "state": self.state,
                "step": self.step,
                "invocation_id": self.invocation_id,
                "attempt": self.attempt,
            }),
        );

        serde_json::Value::Object(body)
    }
}
