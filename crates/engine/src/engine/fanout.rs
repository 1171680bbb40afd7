//! Bounded fan-out over a list of items.
//!
//! At most `max_concurrency` items run at once. Results come back in input
//! order whatever the completion order, and a failing item never cancels its
//! siblings: failures are collected and reported together once every started
//! item has finished.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Final status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    /// Its own run hit the deadline.
    TimedOut,
    /// Never started because the deadline had passed.
    Skipped,
}

/// Result of one item, at its input position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn succeeded(index: usize, output: Value) -> Self {
        Self {
            index,
            status: ItemStatus::Succeeded,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: ItemStatus::Failed,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn timed_out(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: ItemStatus::TimedOut,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn skipped(index: usize) -> Self {
        Self {
            index,
            status: ItemStatus::Skipped,
            output: None,
            error: None,
        }
    }
}

/// Ordered results of a fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOutcome {
    pub results: Vec<ItemResult>,
}

impl MapOutcome {
    /// Indices of items that did not succeed.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| r.status != ItemStatus::Succeeded)
            .map(|r| r.index)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.status == ItemStatus::Succeeded)
    }

    /// True when the deadline cut the fan-out short.
    pub fn interrupted(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.status, ItemStatus::Skipped | ItemStatus::TimedOut))
    }

    /// Item outputs in input order; failed items contribute `null`.
    pub fn outputs(&self) -> Vec<Value> {
        self.results
            .iter()
            .map(|r| r.output.clone().unwrap_or(Value::Null))
            .collect()
    }
}

/// Runs one future per item under a concurrency bound.
///
/// Dropping the future returned by [`FanOutMapper::map`] aborts every item
/// still in flight.
#[derive(Debug, Clone)]
pub struct FanOutMapper {
    max_concurrency: usize,
}

impl FanOutMapper {
    /// `max_concurrency` below 1 is treated as 1.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `run_item(index, item)` for every item.
    ///
    /// Items are started in input order as slots free up. Once `deadline`
    /// has passed no further item is started; the rest are reported as
    /// [`ItemStatus::Skipped`].
    pub async fn map<F, Fut>(
        &self,
        items: Vec<Value>,
        deadline: Option<Instant>,
        run_item: F,
    ) -> MapOutcome
    where
        F: Fn(usize, Value) -> Fut,
        Fut: Future<Output = ItemResult> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut started = 0;

        for (index, item) in items.into_iter().enumerate() {
            // Wait for available slot
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(index, total, "Deadline passed, not starting remaining items");
                break;
            }

            tracing::debug!(index, total, "Starting map item");
            let fut = run_item(index, item);
            tasks.spawn(async move {
                // Keep permit until done
                let _permit = permit;
                (index, fut.await)
            });
            started = index + 1;
        }

        let mut slots: Vec<Option<ItemResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, mut result)) => {
                    result.index = index;
                    slots[index] = Some(result);
                }
                Err(e) => tracing::error!(error = %e, "Map item task aborted"),
            }
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(result) => result,
                None if index < started => ItemResult::failed(index, "item task aborted"),
                None => ItemResult::skipped(index),
            })
            .collect();

        MapOutcome { results }
    }
}
