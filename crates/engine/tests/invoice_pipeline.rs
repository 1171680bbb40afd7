//! End-to-end runs of the bundled invoice pipeline against scripted steps
//! and a scripted analysis job.

use async_trait::async_trait;
use docflow_engine::engine::Outcome;
use docflow_engine::pipeline::{self, Attachment, ExecutionRequest};
use docflow_engine::{EngineConfig, Execution, ExecutionStatus, WorkflowOrchestrator};
use docflow_steps::{
    AsyncJobClient, JobClientRegistry, JobPoll, JobStatus, StepContext, StepError, StepInvoker,
    StepOutput,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Answers every pipeline step and tracks how many attachment steps overlap.
#[derive(Default)]
struct PipelineSteps {
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl PipelineSteps {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepInvoker for PipelineSteps {
    async fn invoke(&self, step: &str, ctx: &StepContext) -> Result<StepOutput, StepError> {
        self.calls.lock().unwrap().push(step.to_string());

        let output = match step {
            "updateAccountAssignment" => json!({"accountsUpdated": 3}),
            "detectInvoice" => json!({"invoiceDetected": true}),
            "processAnalysisResults" => json!({"resultsKey": "results/m-1.csv"}),
            _ => {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);

                let message_id = ctx.get_variable_str("messageId").unwrap_or_default();
                let filename = ctx.get_variable_str("filename").unwrap_or_default();
                json!({"pdfKey": format!("invoices/{}/{}", message_id, filename)})
            }
        };
        Ok(StepOutput::success(output))
    }
}

/// Answers polls from a script, repeating the last answer.
struct AnalysisJob {
    script: Mutex<Vec<JobPoll>>,
    starts: AtomicU32,
    polls: AtomicU32,
}

impl AnalysisJob {
    fn new(script: Vec<JobPoll>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            starts: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl AsyncJobClient for AnalysisJob {
    async fn start(&self, _input: &Value) -> Result<String, StepError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok("analysis-1".to_string())
    }

    async fn poll(&self, _job_id: &str) -> Result<JobPoll, StepError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            Ok(script[0].clone())
        }
    }
}

fn in_progress() -> JobPoll {
    JobPoll::new(JobStatus::InProgress)
}

async fn run(
    steps: Arc<PipelineSteps>,
    job: Arc<AnalysisJob>,
    request: ExecutionRequest,
    timeout: Option<Duration>,
) -> Execution {
    let mut jobs = JobClientRegistry::new();
    jobs.register("analysis", job);

    let workflow = pipeline::invoice_pipeline().unwrap();
    let orchestrator = WorkflowOrchestrator::new(steps, Arc::new(jobs), EngineConfig::default());
    let input = request.into_context().unwrap();

    match timeout {
        Some(timeout) => orchestrator.run_with_timeout(&workflow, input, timeout).await,
        None => orchestrator.run(&workflow, input).await,
    }
}

fn request_with(filenames: &[&str]) -> ExecutionRequest {
    filenames.iter().fold(ExecutionRequest::new("m-1", "inbox"), |request, name| {
        request.with_attachment(Attachment::from_filename(*name))
    })
}

#[tokio::test(start_paused = true)]
async fn test_account_assignment_subject_short_circuits() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![JobPoll::succeeded("results/x")]);
    let request = request_with(&["a.pdf"]).with_subject("RE: UPDATED ACCOUNT ASSIGNMENTS");

    let execution = run(steps.clone(), job.clone(), request, None).await;

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        execution.visited_states(),
        vec!["CheckSubject", "UpdateAccountAssignment"]
    );
    assert_eq!(steps.calls(), vec!["updateAccountAssignment"]);
    assert_eq!(job.starts.load(Ordering::SeqCst), 0);
    assert_eq!(execution.context["accountsUpdated"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_attachments_skips_map() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![JobPoll::succeeded("results/x")]);

    let execution = run(steps.clone(), job.clone(), request_with(&[]), None).await;

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        execution.visited_states(),
        vec!["CheckSubject", "DetectInvoice", "CheckAttachments", "NoAttachments"]
    );
    assert_eq!(steps.calls(), vec!["detectInvoice"]);
    assert_eq!(job.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_twelve_attachments_at_most_five_at_once() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![JobPoll::succeeded("results/analysis-1.json")]);
    let filenames: Vec<String> = (0..12)
        .map(|i| match i % 4 {
            0 => format!("invoice-{}.pdf", i),
            1 => format!("ledger-{}.xlsx", i),
            2 => format!("memo-{}.docx", i),
            _ => format!("scan-{}.png", i),
        })
        .collect();
    let names: Vec<&str> = filenames.iter().map(String::as_str).collect();

    let execution = run(steps.clone(), job, request_with(&names), None).await;

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(steps.peak.load(Ordering::SeqCst), 5);

    let processed = execution.context["processedAttachments"].as_array().unwrap();
    assert_eq!(processed.len(), 12);
    for (index, item) in processed.iter().enumerate() {
        assert_eq!(item["_index"], index);
        assert_eq!(item["filename"], filenames[index]);
        assert_eq!(item["pdfKey"], format!("invoices/m-1/{}", filenames[index]));
    }

    let calls = steps.calls();
    for step in [
        "processPdfAttachment",
        "processExcelAttachment",
        "processDocAttachment",
        "processEmailBody",
    ] {
        assert_eq!(calls.iter().filter(|c| *c == step).count(), 3, "{}", step);
    }
}

#[tokio::test(start_paused = true)]
async fn test_analysis_succeeds_after_two_waits() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![
        in_progress(),
        in_progress(),
        JobPoll::succeeded("results/analysis-1.json"),
    ]);
    let started = Instant::now();

    let execution = run(steps.clone(), job.clone(), request_with(&["a.pdf"]), None).await;

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(job.starts.load(Ordering::SeqCst), 1);
    assert_eq!(job.polls.load(Ordering::SeqCst), 3);
    assert_eq!(execution.context["jobResultLocation"], "results/analysis-1.json");

    let analyze = execution
        .history
        .iter()
        .find(|h| h.state == "AnalyzeInvoices")
        .unwrap();
    assert_eq!(analyze.detail.as_ref().unwrap()["waits"], 2);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(started.elapsed() < Duration::from_secs(90));
    assert_eq!(steps.calls().last().map(String::as_str), Some("processAnalysisResults"));
}

#[tokio::test(start_paused = true)]
async fn test_analysis_failure_is_not_retried() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![in_progress(), JobPoll::new(JobStatus::Failed)]);

    let execution = run(steps.clone(), job.clone(), request_with(&["a.pdf"]), None).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.as_ref().unwrap().code, "AnalysisFailed");
    assert_eq!(job.starts.load(Ordering::SeqCst), 1);
    assert_eq!(job.polls.load(Ordering::SeqCst), 2);
    assert!(!steps.calls().iter().any(|c| c == "processAnalysisResults"));
    assert_eq!(
        execution.visited_states().last().copied(),
        Some("AnalysisFailed")
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_while_polling_times_out() {
    let steps = Arc::new(PipelineSteps::default());
    let job = AnalysisJob::new(vec![in_progress()]);

    let execution = run(
        steps.clone(),
        job,
        request_with(&["a.pdf"]),
        Some(Duration::from_secs(100)),
    )
    .await;

    assert_eq!(execution.status, ExecutionStatus::TimedOut);
    assert_eq!(execution.error.as_ref().unwrap().code, "WorkflowTimeoutError");

    let last = execution.history.last().unwrap();
    assert_eq!(last.state, "AnalyzeInvoices");
    assert_eq!(last.outcome, Outcome::TimedOut);
    assert!(!steps.calls().iter().any(|c| c == "processAnalysisResults"));
}

#[tokio::test(start_paused = true)]
async fn test_same_request_takes_same_path() {
    let first = run(
        Arc::new(PipelineSteps::default()),
        AnalysisJob::new(vec![JobPoll::succeeded("results/x")]),
        request_with(&["a.pdf", "b.xls"]),
        None,
    )
    .await;
    let second = run(
        Arc::new(PipelineSteps::default()),
        AnalysisJob::new(vec![JobPoll::succeeded("results/x")]),
        request_with(&["a.pdf", "b.xls"]),
        None,
    )
    .await;

    assert_eq!(first.visited_states(), second.visited_states());
    assert_eq!(first.context, second.context);
}
