//! Daily report collection step.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::StepContext;
use crate::error::StepError;
use crate::registry::Step;
use crate::result::StepOutput;
use crate::storage::{ObjectRef, ObjectStore};

/// Daily report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReportConfig {
    /// Bucket holding the per-day CSV outputs.
    pub bucket: String,

    /// Offset of the business timezone from UTC, in hours.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_utc_offset_hours() -> i32 {
    -6
}

/// Collects the references of the day's invoice and log reports.
///
/// Reads `reportDate` (`YYYY-MM-DD`) from the context when present, otherwise
/// uses today's date in the configured offset.
pub struct DailyReportStep {
    config: DailyReportConfig,
    store: Arc<dyn ObjectStore>,
}

impl DailyReportStep {
    pub const NAME: &'static str = "sendDailyReport";

    pub fn new(config: DailyReportConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    fn report_date(&self, ctx: &StepContext) -> Result<NaiveDate, StepError> {
        if let Some(raw) = ctx.get_variable_str("reportDate") {
            return NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                StepError::failed("INVALID_REPORT_DATE", format!("{}: {}", raw, e))
            });
        }

        let offset = FixedOffset::east_opt(self.config.utc_offset_hours * 3600).ok_or_else(|| {
            StepError::Configuration(format!(
                "Invalid UTC offset: {} hours",
                self.config.utc_offset_hours
            ))
        })?;
        Ok(Utc::now().with_timezone(&offset).date_naive())
    }
}

/// Report keys produced for a given day.
pub fn report_keys(date: NaiveDate) -> [String; 2] {
    let day = date.format("%Y-%m-%d");
    [format!("{}_invoices.csv", day), format!("{}_logs.csv", day)]
}

#[async_trait]
impl Step for DailyReportStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let date = self.report_date(ctx)?;

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in report_keys(date) {
            let object = ObjectRef::new(&self.config.bucket, key);
            if self.store.exists(&object).await? {
                found.push(object);
            } else {
                missing.push(object.key);
            }
        }

        tracing::info!(
            report_date = %date,
            found = found.len(),
            missing = missing.len(),
            "Daily report collected"
        );

        let summary = if found.is_empty() {
            format!("No reports were produced on {}", date)
        } else {
            format!("{} report(s) available for {}", found.len(), date)
        };

        Ok(StepOutput::success(serde_json::json!({
            "reportDate": date.format("%Y-%m-%d").to_string(),
            "reports": found,
            "missingReports": missing,
            "summary": summary,
        })))
    }
}
