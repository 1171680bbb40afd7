//! Docflow Engine
//!
//! Declarative workflow orchestration for email-driven document pipelines:
//!
//! - **Workflows**: YAML state graphs of task, choice, map, wait and poll states
//! - **Orchestration**: One execution per run, bounded by an overall deadline
//! - **Fan-out**: Per-attachment processing under a concurrency bound
//! - **Async jobs**: Start once, poll until a terminal status
//! - **Pipelines**: The invoice pipeline and the daily report schedule
//!
//! ## Modules
//!
//! - [`config`]: Engine configuration from `DOCFLOW_` environment variables
//! - [`workflow`]: Definition types, context paths and the parser
//! - [`engine`]: Orchestrator, choice evaluator, fan-out mapper and poll loop
//! - [`pipeline`]: Execution requests and the bundled workflows
//! - [`trigger`]: Weekday schedule for the daily report
//! - [`error`]: Engine error types
//!
//! ## Example
//!
//! ```ignore
//! use docflow_engine::{pipeline, EngineConfig, WorkflowOrchestrator};
//! use docflow_steps::{JobClientRegistry, StepRegistry};
//! use std::sync::Arc;
//!
//! let workflow = pipeline::invoice_pipeline()?;
//! let orchestrator = WorkflowOrchestrator::new(
//!     Arc::new(StepRegistry::new()),
//!     Arc::new(JobClientRegistry::new()),
//!     EngineConfig::from_env()?,
//! );
//! let execution = orchestrator.run(&workflow, request.into_context()?).await;
//! println!("{}", execution.status);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod result_ext;
pub mod trigger;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::{Execution, ExecutionStatus, WorkflowOrchestrator};
pub use error::{EngineError, EngineResult};
pub use pipeline::{Attachment, AttachmentType, ExecutionRequest};
pub use result_ext::{OptionResultExt, ResultExt};
pub use trigger::DailyTrigger;
pub use workflow::{parse_workflow, Workflow};
