//! Workflow execution engine.
//!
//! - **Orchestrator**: Drives an execution through its state graph
//! - **Choice**: Picks the next state from the context
//! - **Fan-out**: Runs a map iterator per item under a concurrency bound
//! - **Poll**: Starts an async job and polls it to a terminal status
//! - **Execution**: The record of one run

pub mod choice;
pub mod execution;
pub mod fanout;
pub mod orchestrator;
pub mod poll;

pub use choice::{ChoiceEvaluator, ChoiceOutcome};
pub use execution::{Execution, ExecutionError, ExecutionStatus, HistoryEntry, Outcome};
pub use fanout::{FanOutMapper, ItemResult, ItemStatus, MapOutcome};
pub use orchestrator::WorkflowOrchestrator;
pub use poll::{AsyncJob, PollEnd, PollLoop, PollOutcome, TerminalStatus};
