//! Workflow orchestrator.
//!
//! Drives one execution through its state graph. Before every state the
//! deadline is checked; past it the execution is marked TIMED_OUT and no
//! further state is entered. Each state's work also runs under the deadline,
//! so a slow step, a long wait or a job that never finishes cannot hold the
//! execution past it.
//!
//! Step and job errors are never retried here. Retries belong to the step
//! invoker.

use docflow_steps::{JobClientRegistry, StepContext, StepInvoker};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::choice::{ChoiceEvaluator, ChoiceOutcome};
use crate::engine::execution::{Execution, ExecutionStatus};
use crate::engine::fanout::{FanOutMapper, ItemResult};
use crate::engine::poll::{PollEnd, PollLoop};
use crate::error::{EngineError, EngineResult};
use crate::workflow::{
    ContextPath, MapState, PollState, State, StateGraph, StateKind, TaskState, Workflow,
};

/// What a state produced.
#[derive(Debug, Default)]
struct StateResult {
    /// Context writes applied in order; `None` path merges into the root.
    writes: Vec<(Option<String>, Value)>,
    /// Next state; `None` ends the execution successfully.
    next: Option<String>,
    detail: Option<Value>,
}

/// Why a state failed.
#[derive(Debug)]
struct StateFailure {
    error: EngineError,
    /// Context writes kept despite the failure.
    writes: Vec<(Option<String>, Value)>,
    detail: Option<Value>,
}

impl From<EngineError> for StateFailure {
    fn from(error: EngineError) -> Self {
        Self {
            error,
            writes: Vec::new(),
            detail: None,
        }
    }
}

/// Runs workflows against a step invoker and a set of async job clients.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    invoker: Arc<dyn StepInvoker>,
    jobs: Arc<JobClientRegistry>,
    config: EngineConfig,
    evaluator: ChoiceEvaluator,
}

impl WorkflowOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        invoker: Arc<dyn StepInvoker>,
        jobs: Arc<JobClientRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            invoker,
            jobs,
            config,
            evaluator: ChoiceEvaluator::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a workflow to completion with its own (or the configured) timeout.
    pub async fn run(&self, workflow: &Workflow, input: Value) -> Execution {
        let timeout = workflow
            .timeout()
            .unwrap_or_else(|| self.config.execution_timeout());
        self.run_with_timeout(workflow, input, timeout).await
    }

    /// Run a workflow to completion under an explicit timeout.
    pub async fn run_with_timeout(
        &self,
        workflow: &Workflow,
        input: Value,
        timeout: Duration,
    ) -> Execution {
        let deadline = Instant::now() + timeout;
        let mut execution = Execution::new(&workflow.name, &workflow.graph.start, input, timeout);

        info!(
            execution_id = %execution.id,
            workflow = %workflow.name,
            timeout_secs = timeout.as_secs(),
            "Execution started"
        );

        let root_id = execution.id;
        self.drive(&workflow.graph, &mut execution, root_id, deadline, timeout)
            .await;

        tracing::info!(
            target: "docflow.performance",
            execution_id = %execution.id,
            workflow = %workflow.name,
            status = %execution.status,
            states = execution.history.len(),
            duration_ms = execution.duration().num_milliseconds(),
            "Execution finished"
        );

        execution
    }

    /// Walk the graph until the execution leaves RUNNING.
    fn drive<'a>(
        &'a self,
        graph: &'a StateGraph,
        execution: &'a mut Execution,
        root_id: Uuid,
        deadline: Instant,
        timeout: Duration,
    ) -> BoxFuture<'a, ()> {
        async move {
            while execution.is_running() {
                let name = execution.current_state.clone();
                let Some(state) = graph.get_state(&name) else {
                    let error = EngineError::Validation(format!("Unknown state '{}'", name));
                    execution.fail_with(&name, StateKind::Fail, &error, None);
                    break;
                };
                let kind = state.kind();

                if Instant::now() >= deadline {
                    warn!(execution_id = %root_id, state = %name, "Deadline passed before entering state");
                    execution.time_out(&name, kind, timeout);
                    break;
                }

                debug!(execution_id = %root_id, state = %name, kind = %kind, "Entering state");

                match state {
                    State::Succeed => {
                        execution.succeed(&name, kind, None);
                        continue;
                    }
                    State::Fail(fail) => {
                        let cause = fail.cause.clone().unwrap_or_else(|| fail.error.clone());
                        execution.fail(&name, kind, &fail.error, cause, None);
                        continue;
                    }
                    _ => {}
                }

                let work = self.dispatch(&name, state, &execution.context, root_id, deadline, timeout);
                let result = match tokio::time::timeout_at(deadline, work).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(execution_id = %root_id, state = %name, "Deadline passed while in state");
                        execution.time_out(&name, kind, timeout);
                        break;
                    }
                };

                let failure = match result {
                    Ok(outcome) => {
                        self.apply(execution, &name, kind, outcome, root_id);
                        continue;
                    }
                    Err(failure) => failure,
                };

                for (path, value) in failure.writes {
                    if let Err(error) = execution.merge_output(path.as_deref(), value) {
                        warn!(execution_id = %root_id, state = %name, error = %error, "Failed to keep partial output");
                    }
                }

                match failure.error {
                    EngineError::WorkflowTimeout(_) => execution.time_out(&name, kind, timeout),
                    error => {
                        let detail = failure.detail;
                        warn!(
                            execution_id = %root_id,
                            state = %name,
                            code = error.code(),
                            error = %error,
                            "State failed"
                        );
                        execution.fail_with(&name, kind, &error, detail);
                    }
                }
            }
        }
        .boxed()
    }

    /// Merge a state's writes and move on.
    fn apply(
        &self,
        execution: &mut Execution,
        name: &str,
        kind: StateKind,
        outcome: StateResult,
        root_id: Uuid,
    ) {
        for (path, value) in outcome.writes {
            if let Err(error) = execution.merge_output(path.as_deref(), value) {
                execution.fail_with(name, kind, &error, outcome.detail);
                return;
            }
        }

        match outcome.next {
            Some(next) => {
                info!(execution_id = %root_id, from = %name, to = %next, "Transitioning to state");
                execution.transition(name, kind, &next, outcome.detail);
            }
            None => {
                info!(execution_id = %root_id, state = %name, "Reached end of branch");
                execution.succeed(name, kind, outcome.detail);
            }
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        state: &State,
        ctx: &Value,
        root_id: Uuid,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<StateResult, StateFailure> {
        match state {
            State::Task(task) => self.run_task(name, task, ctx, root_id).await,
            State::Choice(choice) => {
                let outcome = self.evaluator.evaluate(name, choice, ctx)?;
                let detail = match &outcome {
                    ChoiceOutcome::Matched { rule, .. } => json!({ "rule": rule }),
                    ChoiceOutcome::Default { .. } => json!({ "default": true }),
                };
                Ok(StateResult {
                    writes: Vec::new(),
                    next: Some(outcome.next().to_string()),
                    detail: Some(detail),
                })
            }
            State::Map(map) => self.run_map(name, map, ctx, root_id, deadline, timeout).await,
            State::Wait(wait) => {
                tokio::time::sleep(Duration::from_secs(wait.seconds)).await;
                Ok(StateResult {
                    writes: Vec::new(),
                    next: Some(wait.next.clone()),
                    detail: None,
                })
            }
            State::Poll(poll) => self.run_poll(name, poll, ctx).await,
            State::Succeed | State::Fail(_) => Err(EngineError::Internal(format!(
                "terminal state '{}' cannot be dispatched",
                name
            ))
            .into()),
        }
    }

    async fn run_task(
        &self,
        name: &str,
        task: &TaskState,
        ctx: &Value,
        root_id: Uuid,
    ) -> Result<StateResult, StateFailure> {
        let variables: HashMap<String, Value> = ctx
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let step_ctx = StepContext::new(root_id.to_string(), name, &task.step).with_variables(variables);

        let output = self
            .invoker
            .invoke(&task.step, &step_ctx)
            .await
            .map_err(|source| EngineError::StepInvocation {
                state: name.to_string(),
                step: task.step.clone(),
                source,
            })?;

        Ok(StateResult {
            detail: Some(json!({
                "step": task.step,
                "attempts": output.attempts,
                "duration_ms": output.duration_ms,
            })),
            writes: vec![(task.result_path.clone(), output.data)],
            next: task.next.clone(),
        })
    }

    async fn run_map(
        &self,
        name: &str,
        map: &MapState,
        ctx: &Value,
        root_id: Uuid,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<StateResult, StateFailure> {
        let items_path = parse_path(&map.items_path)?;
        let items = match items_path.get(ctx) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(EngineError::Validation(format!(
                    "Map state '{}': {} is not a list ({})",
                    name, map.items_path, other
                ))
                .into())
            }
        };

        let total = items.len();
        let item_contexts: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item_context(map, ctx, item, index, total))
            .collect();

        let max_concurrency = map
            .max_concurrency
            .unwrap_or(self.config.default_max_concurrency);
        info!(
            execution_id = %root_id,
            state = %name,
            items = total,
            max_concurrency,
            "Fanning out"
        );

        let iterator = Arc::new(map.iterator.clone());
        let outcome = FanOutMapper::new(max_concurrency)
            .map(item_contexts, Some(deadline), |index, item_ctx| {
                let orchestrator = self.clone();
                let iterator = iterator.clone();
                let label = item_label(name, index);
                async move {
                    orchestrator
                        .run_item(iterator, label, item_ctx, root_id, deadline, timeout)
                        .await
                }
            })
            .await;

        let failed = outcome.failed_indices();
        let detail = json!({
            "items": total,
            "failed": failed,
            "errors": outcome
                .results
                .iter()
                .filter_map(|r| r.error.as_ref().map(|e| json!({"index": r.index, "error": e})))
                .collect::<Vec<_>>(),
        });

        // Partial successes stay in the context next to the failure.
        if !outcome.is_success() {
            let results = serde_json::to_value(&outcome.results).map_err(EngineError::from)?;
            return Err(StateFailure {
                error: if outcome.interrupted() {
                    EngineError::WorkflowTimeout(timeout.as_secs())
                } else {
                    EngineError::MapItem {
                        state: name.to_string(),
                        total,
                        failed,
                    }
                },
                writes: vec![(Some(map.result_path().to_string()), results)],
                detail: Some(detail),
            });
        }

        Ok(StateResult {
            writes: vec![(
                Some(map.result_path().to_string()),
                Value::Array(outcome.outputs()),
            )],
            next: map.next.clone(),
            detail: Some(detail),
        })
    }

    /// Run the iterator graph for one item as its own execution.
    async fn run_item(
        self,
        iterator: Arc<StateGraph>,
        label: String,
        item_ctx: Value,
        root_id: Uuid,
        deadline: Instant,
        timeout: Duration,
    ) -> ItemResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut execution = Execution::new(&label, &iterator.start, item_ctx, remaining);

        self.drive(&iterator, &mut execution, root_id, deadline, timeout)
            .await;

        let error = execution
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.code, e.cause))
            .unwrap_or_default();

        debug!(
            execution_id = %root_id,
            item = %label,
            status = %execution.status,
            "Map item finished"
        );

        match execution.status {
            ExecutionStatus::Succeeded => ItemResult::succeeded(0, execution.context),
            ExecutionStatus::TimedOut => ItemResult::timed_out(0, error),
            ExecutionStatus::Failed | ExecutionStatus::Running => ItemResult::failed(0, error),
        }
    }

    async fn run_poll(
        &self,
        name: &str,
        poll: &PollState,
        ctx: &Value,
    ) -> Result<StateResult, StateFailure> {
        let client = self.jobs.get(&poll.job).ok_or_else(|| {
            EngineError::Validation(format!(
                "Poll state '{}' uses unregistered job client '{}'",
                name, poll.job
            ))
        })?;

        let input = match &poll.input_path {
            Some(path) => parse_path(path)?.get(ctx).cloned().unwrap_or(Value::Null),
            None => ctx.clone(),
        };

        let interval = Duration::from_secs(
            poll.interval_seconds
                .unwrap_or(self.config.poll_interval_secs),
        );
        let poll_loop = PollLoop::new(interval)
            .with_max_polls(Some(poll.max_polls.unwrap_or(self.config.max_polls)))
            .with_job_timeout(poll.job_timeout_seconds.map(Duration::from_secs));

        let outcome = poll_loop
            .run(client.as_ref(), &input)
            .await
            .map_err(|source| EngineError::StepInvocation {
                state: name.to_string(),
                step: poll.job.clone(),
                source,
            })?;

        let job = &outcome.job;
        let mut writes = vec![
            (Some(poll.job_id_path.clone()), json!(job.job_id)),
            (Some(poll.status_path.clone()), json!(job.status.as_str())),
        ];
        if let Some(location) = &job.result_location {
            writes.push((Some(poll.result_path.clone()), json!(location)));
        }

        let mut detail = json!({
            "jobId": job.job_id,
            "status": job.status.as_str(),
            "pollCount": job.poll_count,
            "waits": outcome.waits,
        });

        let error = match &outcome.end {
            PollEnd::Succeeded => {
                return Ok(StateResult {
                    writes,
                    next: poll.next.clone(),
                    detail: Some(detail),
                })
            }
            PollEnd::Failed { message } => EngineError::JobFailed {
                job_id: job.job_id.clone(),
                message: message.clone(),
            },
            PollEnd::ProtocolViolation { status } => EngineError::JobPollProtocol {
                job_id: job.job_id.clone(),
                status: status.clone(),
            },
            PollEnd::TimedOut => EngineError::JobTimeout {
                job_id: job.job_id.clone(),
                polls: job.poll_count,
            },
        };

        detail["error"] = json!({ "code": error.code(), "cause": error.to_string() });

        match &poll.failure {
            Some(failure) => {
                warn!(state = %name, next = %failure, error = %error, "Job did not succeed");
                Ok(StateResult {
                    writes,
                    next: Some(failure.clone()),
                    detail: Some(detail),
                })
            }
            None => Err(StateFailure {
                error,
                writes,
                detail: Some(detail),
            }),
        }
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("jobs", &self.jobs)
            .field("config", &self.config)
            .finish()
    }
}

/// Name of the sub-execution for one map item.
fn item_label(state: &str, index: usize) -> String {
    format!("{}[{}]", state, index)
}

fn parse_path(raw: &str) -> EngineResult<ContextPath> {
    ContextPath::parse(raw).map_err(|e| EngineError::Validation(e.to_string()))
}

/// Per-item context: the item's own fields, the shared parent fields named
/// by the map state, and the item's position.
fn item_context(map: &MapState, parent: &Value, item: Value, index: usize, total: usize) -> Value {
    let mut ctx = serde_json::Map::new();

    match item {
        Value::Object(fields) => ctx.extend(fields),
        other => {
            ctx.insert("item".to_string(), other);
        }
    }

    for field in &map.parameters {
        if let Some(value) = parent.get(field) {
            ctx.insert(field.clone(), value.clone());
        }
    }

    ctx.insert("_index".to_string(), json!(index));
    ctx.insert("_total".to_string(), json!(total));

    Value::Object(ctx)
}
