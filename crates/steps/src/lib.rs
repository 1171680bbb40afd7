//! Docflow step library.
//!
//! External boundaries used by the workflow engine:
//!
//! - `registry`: Step trait, step registry (the step invoker) and retry policy
//! - `jobs`: Async job client boundary (start / poll) and job client registry
//! - `storage`: Object storage boundary (memory and filesystem stores)
//! - `steps`: Built-in steps (HTTP processor, static, daily report)
//! - `context`: Context handed to every step invocation
//! - `result`: Step output fragments
//! - `error`: Structured step errors

pub mod context;
pub mod error;
pub mod jobs;
pub mod registry;
pub mod result;
pub mod steps;
pub mod storage;

pub use context::StepContext;
pub use error::{StepError, StepResult};
pub use jobs::{AsyncJobClient, HttpJobClient, JobClientRegistry, JobPoll, JobStatus};
pub use registry::{RetryConfig, Step, StepInvoker, StepRegistry};
pub use result::StepOutput;
pub use storage::{FsStore, MemoryStore, ObjectRef, ObjectStore};
