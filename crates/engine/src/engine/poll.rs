//! Wait/poll loop for async jobs.
//!
//! A job is started exactly once. Its status is checked right away and then
//! once per interval for as long as it reports STARTED or IN_PROGRESS.
//! SUCCEEDED carries the result location out; FAILED and any status outside
//! the protocol end the loop at once. Nothing is retried here.

use docflow_steps::{AsyncJobClient, JobStatus, StepError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Terminal status of a polled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Succeeded,
    Failed,
    TimedOut,
}

/// Job handle tracked by the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncJob {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    pub poll_count: u32,
}

impl AsyncJob {
    fn started(job_id: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Started,
            result_location: None,
            poll_count: 0,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEnd {
    Succeeded,
    /// The service reported FAILED.
    Failed { message: String },
    /// The service reported a status outside the protocol.
    ProtocolViolation { status: String },
    /// The job's own poll budget ran out.
    TimedOut,
}

/// What the loop observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub job: AsyncJob,
    pub end: PollEnd,
    /// Intervals slept between status checks.
    pub waits: u32,
}

impl PollOutcome {
    pub fn terminal_status(&self) -> TerminalStatus {
        match self.end {
            PollEnd::Succeeded => TerminalStatus::Succeeded,
            PollEnd::Failed { .. } | PollEnd::ProtocolViolation { .. } => TerminalStatus::Failed,
            PollEnd::TimedOut => TerminalStatus::TimedOut,
        }
    }
}

/// Polling policy for one job.
#[derive(Debug, Clone)]
pub struct PollLoop {
    interval: Duration,
    max_polls: Option<u32>,
    job_timeout: Option<Duration>,
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_polls: None,
            job_timeout: None,
        }
    }

    /// Stop after this many status checks.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Stop when the next check would land past this budget.
    pub fn with_job_timeout(mut self, job_timeout: Option<Duration>) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Start the job once and poll it until it reaches a terminal status.
    pub async fn run(
        &self,
        client: &dyn AsyncJobClient,
        input: &serde_json::Value,
    ) -> Result<PollOutcome, StepError> {
        let job_id = client.start(input).await?;
        tracing::info!(job_id = %job_id, "Async job started");
        self.poll_until_terminal(client, job_id).await
    }

    /// Poll an already started job until it reaches a terminal status.
    pub async fn poll_until_terminal(
        &self,
        client: &dyn AsyncJobClient,
        job_id: String,
    ) -> Result<PollOutcome, StepError> {
        let started = Instant::now();
        let mut job = AsyncJob::started(job_id);
        let mut waits = 0;

        loop {
            let poll = client.poll(&job.job_id).await?;
            job.poll_count += 1;
            job.status = poll.status.clone();

            tracing::debug!(
                job_id = %job.job_id,
                poll_count = job.poll_count,
                status = %job.status,
                "Job status checked"
            );

            let end = match poll.status {
                JobStatus::Succeeded => {
                    job.result_location = poll.result_location;
                    PollEnd::Succeeded
                }
                JobStatus::Failed => PollEnd::Failed {
                    message: poll
                        .message
                        .unwrap_or_else(|| "job reported FAILED".to_string()),
                },
                JobStatus::Unknown(status) => {
                    tracing::warn!(job_id = %job.job_id, status = %status, "Job reported unknown status");
                    PollEnd::ProtocolViolation { status }
                }
                JobStatus::Started | JobStatus::InProgress => {
                    if self.budget_exhausted(job.poll_count, started.elapsed()) {
                        tracing::warn!(
                            job_id = %job.job_id,
                            poll_count = job.poll_count,
                            "Job poll budget exhausted"
                        );
                        PollEnd::TimedOut
                    } else {
                        tokio::time::sleep(self.interval).await;
                        waits += 1;
                        continue;
                    }
                }
            };

            return Ok(PollOutcome { job, end, waits });
        }
    }

    fn budget_exhausted(&self, polls: u32, elapsed: Duration) -> bool {
        if self.max_polls.is_some_and(|max| polls >= max) {
            return true;
        }
        self.job_timeout
            .is_some_and(|timeout| elapsed + self.interval > timeout)
    }
}
