//! Workflow definition types.
//!
//! A workflow is a named state graph:
//! - `task` invokes a step and merges its output
//! - `choice` routes on an ordered list of rules, first match wins
//! - `map` fans a sub-graph out over a list with bounded concurrency
//! - `wait` sleeps
//! - `poll` starts an async job once and polls it to a terminal status
//! - `succeed` / `fail` end the execution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Supported definition API version.
pub const API_VERSION: &str = "docflow.io/v1";

/// Supported definition kind.
pub const KIND: &str = "Workflow";

/// Top-level workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub name: String,

    /// Overall execution deadline; falls back to the engine configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(flatten)]
    pub graph: StateGraph,
}

impl Workflow {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

/// A start state plus the named states it can reach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateGraph {
    pub start: String,

    pub states: BTreeMap<String, State>,
}

impl StateGraph {
    /// Get a state by name.
    pub fn get_state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// Check if a state exists.
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// All state names, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        self.states.keys().map(|s| s.as_str()).collect()
    }
}

// ============================================================================
// States
// ============================================================================

/// A workflow state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum State {
    Task(TaskState),
    Choice(ChoiceState),
    Map(MapState),
    Wait(WaitState),
    Poll(PollState),
    Succeed,
    Fail(FailState),
}

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            State::Task(_) => StateKind::Task,
            State::Choice(_) => StateKind::Choice,
            State::Map(_) => StateKind::Map,
            State::Wait(_) => StateKind::Wait,
            State::Poll(_) => StateKind::Poll,
            State::Succeed => StateKind::Succeed,
            State::Fail(_) => StateKind::Fail,
        }
    }

    /// Every state name this state can transition to.
    pub fn transitions(&self) -> Vec<&str> {
        match self {
            State::Task(t) => t.next.iter().map(|s| s.as_str()).collect(),
            State::Choice(c) => c
                .choices
                .iter()
                .map(|r| r.next.as_str())
                .chain(c.default.as_deref())
                .collect(),
            State::Map(m) => m.next.iter().map(|s| s.as_str()).collect(),
            State::Wait(w) => vec![w.next.as_str()],
            State::Poll(p) => p
                .next
                .iter()
                .chain(p.failure.iter())
                .map(|s| s.as_str())
                .collect(),
            State::Succeed | State::Fail(_) => Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed | State::Fail(_))
    }
}

/// State kind, recorded in execution history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Task,
    Choice,
    Map,
    Wait,
    Poll,
    Succeed,
    Fail,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateKind::Task => "task",
            StateKind::Choice => "choice",
            StateKind::Map => "map",
            StateKind::Wait => "wait",
            StateKind::Poll => "poll",
            StateKind::Succeed => "succeed",
            StateKind::Fail => "fail",
        };
        write!(f, "{}", s)
    }
}

/// Invoke a step and merge its output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskState {
    pub step: String,

    /// Where the output lands. Absent: an object output is merged into the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    /// Absent: the workflow ends successfully after this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Route on the first matching rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceState {
    pub choices: Vec<ChoiceRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One ordered `(predicate, next)` pair. All conditions must hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceRule {
    pub when: Vec<Condition>,

    pub next: String,
}

/// Fan a sub-graph out over a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapState {
    /// Path of the list to iterate.
    pub items_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Parent context fields copied into every item context.
    #[serde(default)]
    pub parameters: Vec<String>,

    /// Sub-graph run once per item.
    pub iterator: StateGraph,

    /// Where the ordered item results land (default `$.mapResults`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl MapState {
    pub fn result_path(&self) -> &str {
        self.result_path.as_deref().unwrap_or("$.mapResults")
    }
}

/// Sleep before moving on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitState {
    pub seconds: u64,

    pub next: String,
}

/// Start an async job once, then poll it to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollState {
    /// Registered job client name.
    pub job: String,

    /// Path of the job input reference. Absent: the whole context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,

    #[serde(default = "default_status_path")]
    pub status_path: String,

    #[serde(default = "default_job_result_path")]
    pub result_path: String,

    #[serde(default = "default_job_id_path")]
    pub job_id_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_seconds: Option<u64>,

    /// Next state on success. Absent: the workflow ends successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    /// State entered when the job fails. Absent: the execution fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

fn default_status_path() -> String {
    "$.jobStatus".to_string()
}

fn default_job_result_path() -> String {
    "$.jobResultLocation".to_string()
}

fn default_job_id_path() -> String {
    "$.jobId".to_string()
}

/// End the execution as FAILED.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailState {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

// ============================================================================
// Conditions
// ============================================================================

/// Condition operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality check.
    #[default]
    Eq,
    /// Inequality check.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// String or list contains.
    Contains,
    /// Regex match.
    Matches,
    /// Value is truthy.
    Truthy,
    /// Value is falsy.
    Falsy,
    /// Path resolves to a value (including null).
    Present,
    /// Path resolves to nothing.
    Absent,
    /// Value is in list.
    In,
    /// Value is not in list.
    NotIn,
}

impl Operator {
    /// Operators that compare against `value`.
    pub fn needs_value(&self) -> bool {
        !matches!(
            self,
            Operator::Truthy | Operator::Falsy | Operator::Present | Operator::Absent
        )
    }
}

/// A single predicate over the execution context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Context path, e.g. `$.attachments[0].type`.
    pub variable: String,

    #[serde(default)]
    pub op: Operator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Condition {
    pub fn new(variable: impl Into<String>, op: Operator, value: Option<serde_json::Value>) -> Self {
        Self {
            variable: variable.into(),
            op,
            value,
        }
    }

    pub fn eq(variable: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(variable, Operator::Eq, Some(value))
    }

    pub fn present(variable: impl Into<String>) -> Self {
        Self::new(variable, Operator::Present, None)
    }
}
