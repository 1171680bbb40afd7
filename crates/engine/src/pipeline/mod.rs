//! Bundled pipelines and their intake.
//!
//! The invoice pipeline runs once per inbound message; the daily report
//! workflow runs once per trigger firing.

pub mod intake;

pub use intake::{subject_flag, Attachment, AttachmentType, ExecutionRequest, ACCOUNT_ASSIGNMENT_SUBJECT};

use crate::error::EngineResult;
use crate::workflow::{parse_workflow, Workflow};

const INVOICE_PIPELINE: &str = include_str!("../../workflows/invoice-pipeline.yaml");
const DAILY_REPORT: &str = include_str!("../../workflows/daily-report.yaml");

/// Per-message invoice processing workflow.
pub fn invoice_pipeline() -> EngineResult<Workflow> {
    parse_workflow(INVOICE_PIPELINE)
}

/// One-shot daily report workflow.
pub fn daily_report_workflow() -> EngineResult<Workflow> {
    parse_workflow(DAILY_REPORT)
}
