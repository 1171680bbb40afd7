//! Step registry and dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::StepContext;
use crate::error::StepError;
use crate::result::StepOutput;

/// Retry configuration for a registered step.
///
/// Retries happen inside the invoker; the engine above never retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// A named unit of external work.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step's unique name.
    fn name(&self) -> &str;

    /// Invoke the step with the given context.
    async fn invoke(&self, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

/// Boundary the engine calls for every Task state.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    /// Invoke a step by name and return the context fragment it produced.
    async fn invoke(&self, step: &str, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

struct RegisteredStep {
    step: Arc<dyn Step>,
    retry: RetryConfig,
}

/// Registry of available steps.
pub struct StepRegistry {
    steps: HashMap<String, RegisteredStep>,
}

impl StepRegistry {
    /// Create a new empty step registry.
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register a step without retries.
    pub fn register<T: Step + 'static>(&mut self, step: T) {
        self.register_with_retry(step, RetryConfig::none());
    }

    /// Register a step with a retry policy.
    pub fn register_with_retry<T: Step + 'static>(&mut self, step: T, retry: RetryConfig) {
        let name = step.name().to_string();
        self.steps.insert(
            name,
            RegisteredStep {
                step: Arc::new(step),
                retry,
            },
        );
    }

    /// Get a step by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).map(|r| r.step.clone())
    }

    /// Check if a step is registered.
    pub fn has(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// List all registered step names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list())
            .finish()
    }
}

#[async_trait]
impl StepInvoker for StepRegistry {
    async fn invoke(&self, name: &str, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let registered = self
            .steps
            .get(name)
            .ok_or_else(|| StepError::NotFound(name.to_string()))?;

        let started = Instant::now();
        let mut attempt_ctx = ctx.clone();
        let mut retry = 0;

        loop {
            attempt_ctx.attempt = retry + 1;

            match registered.step.invoke(&attempt_ctx).await {
                Ok(output) => {
                    tracing::debug!(
                        step = %name,
                        execution_id = %ctx.execution_id,
                        attempts = retry + 1,
                        "Step completed"
                    );
                    return Ok(output
                        .with_duration(started.elapsed().as_millis() as u64)
                        .with_attempts(retry + 1));
                }
                Err(e) if e.is_retryable() && retry < registered.retry.max_retries => {
                    retry += 1;
                    let delay = registered.retry.delay_for(retry);
                    tracing::warn!(
                        step = %name,
                        attempt = retry,
                        max_retries = registered.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Step invocation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
