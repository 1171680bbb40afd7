//! Workflow YAML parser.
//!
//! Parses YAML definitions into [`Workflow`] and validates the state graph:
//! every transition resolves, choices are well formed, map and poll limits
//! are sane. Map iterators are validated recursively as their own graphs.

use crate::error::{EngineError, EngineResult};
use crate::workflow::path::ContextPath;
use crate::workflow::types::{Operator, State, StateGraph, Workflow, API_VERSION, KIND};

/// Parse a YAML string into a validated Workflow.
pub fn parse_workflow(yaml_content: &str) -> EngineResult<Workflow> {
    let workflow: Workflow =
        serde_yaml::from_str(yaml_content).map_err(|e| EngineError::Parse(e.to_string()))?;

    validate_workflow(&workflow)?;

    Ok(workflow)
}

/// Validate a parsed workflow.
pub fn validate_workflow(workflow: &Workflow) -> EngineResult<()> {
    if workflow.api_version != API_VERSION {
        return Err(EngineError::Validation(format!(
            "Unsupported API version: {}. Expected {}",
            workflow.api_version, API_VERSION
        )));
    }

    if workflow.kind != KIND {
        return Err(EngineError::Validation(format!(
            "Unsupported kind: {}. Expected {}",
            workflow.kind, KIND
        )));
    }

    if workflow.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "Workflow name must not be empty".to_string(),
        ));
    }

    if workflow.timeout_seconds == Some(0) {
        return Err(EngineError::Validation(
            "timeout_seconds must be at least 1".to_string(),
        ));
    }

    validate_graph(&workflow.graph, &workflow.name)
}

/// Validate one state graph. `scope` names the graph in error messages.
pub fn validate_graph(graph: &StateGraph, scope: &str) -> EngineResult<()> {
    if graph.states.is_empty() {
        return Err(EngineError::Validation(format!(
            "Workflow '{}' has no states",
            scope
        )));
    }

    if !graph.has_state(&graph.start) {
        return Err(EngineError::Validation(format!(
            "Workflow '{}' starts at unknown state '{}'",
            scope, graph.start
        )));
    }

    for (name, state) in &graph.states {
        for target in state.transitions() {
            if !graph.has_state(target) {
                return Err(EngineError::Validation(format!(
                    "State '{}' in '{}' references unknown state '{}'",
                    name, scope, target
                )));
            }
        }

        validate_state(name, state, scope)?;
    }

    Ok(())
}

fn validate_path(state: &str, field: &str, path: &str) -> EngineResult<()> {
    ContextPath::parse(path).map(|_| ()).map_err(|e| {
        EngineError::Validation(format!("State '{}' has invalid {}: {}", state, field, e))
    })
}

fn validate_state(name: &str, state: &State, scope: &str) -> EngineResult<()> {
    match state {
        State::Task(task) => {
            if task.step.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "Task state '{}' has no step",
                    name
                )));
            }
            if let Some(path) = &task.result_path {
                validate_path(name, "result_path", path)?;
            }
        }
        State::Choice(choice) => {
            if choice.choices.is_empty() {
                return Err(EngineError::Validation(format!(
                    "Choice state '{}' has no rules",
                    name
                )));
            }
            for (index, rule) in choice.choices.iter().enumerate() {
                if rule.when.is_empty() {
                    return Err(EngineError::Validation(format!(
                        "Choice state '{}' rule {} has no conditions",
                        name, index
                    )));
                }
                for condition in &rule.when {
                    validate_path(name, "condition variable", &condition.variable)?;
                    if condition.op.needs_value() && condition.value.is_none() {
                        return Err(EngineError::Validation(format!(
                            "Choice state '{}' rule {}: operator {:?} needs a value",
                            name, index, condition.op
                        )));
                    }
                    if condition.op == Operator::Matches {
                        let pattern = condition.value.as_ref().and_then(|v| v.as_str()).ok_or_else(
                            || {
                                EngineError::Validation(format!(
                                    "Choice state '{}' rule {}: matches needs a string pattern",
                                    name, index
                                ))
                            },
                        )?;
                        regex::Regex::new(pattern).map_err(|e| {
                            EngineError::Validation(format!(
                                "Choice state '{}' rule {}: invalid pattern: {}",
                                name, index, e
                            ))
                        })?;
                    }
                }
            }
            if choice.default.is_none() {
                tracing::warn!(
                    workflow = %scope,
                    state = %name,
                    "Choice state has no default; an unmatched context will fail the execution"
                );
            }
        }
        State::Map(map) => {
            if map.max_concurrency == Some(0) {
                return Err(EngineError::Validation(format!(
                    "Map state '{}' max_concurrency must be at least 1",
                    name
                )));
            }
            validate_path(name, "items_path", &map.items_path)?;
            validate_path(name, "result_path", map.result_path())?;
            validate_graph(&map.iterator, &format!("{}/{}", scope, name))?;
        }
        State::Wait(_) => {}
        State::Poll(poll) => {
            if poll.job.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "Poll state '{}' names no job client",
                    name
                )));
            }
            if poll.interval_seconds == Some(0) {
                return Err(EngineError::Validation(format!(
                    "Poll state '{}' interval_seconds must be at least 1",
                    name
                )));
            }
            if poll.max_polls == Some(0) {
                return Err(EngineError::Validation(format!(
                    "Poll state '{}' max_polls must be at least 1",
                    name
                )));
            }
            if let Some(path) = &poll.input_path {
                validate_path(name, "input_path", path)?;
            }
            validate_path(name, "status_path", &poll.status_path)?;
            validate_path(name, "result_path", &poll.result_path)?;
            validate_path(name, "job_id_path", &poll.job_id_path)?;
        }
        State::Succeed | State::Fail(_) => {}
    }

    Ok(())
}
