//! Runner configuration: which processors, job services and storage a
//! local run talks to.
//!
//! ```yaml
//! storage:
//!   root: ./data
//! steps:
//!   detectInvoice:
//!     url: http://localhost:9000/detect-invoice
//!     retry: { max_retries: 2 }
//! jobs:
//!   analysis:
//!     base_url: http://localhost:9100
//! report:
//!   bucket: results
//!   hour: 8
//!   utc_offset_hours: -6
//! ```

use anyhow::{Context, Result};
use docflow_engine::DailyTrigger;
use docflow_steps::jobs::HttpJobConfig;
use docflow_steps::steps::{DailyReportConfig, DailyReportStep, HttpStep, HttpStepConfig};
use docflow_steps::{
    FsStore, HttpJobClient, JobClientRegistry, MemoryStore, ObjectStore, RetryConfig, StepRegistry,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct StepEntry {
    #[serde(flatten)]
    pub http: HttpStepConfig,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    /// Buckets are directories under this root; in memory when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSection {
    pub bucket: String,
    #[serde(flatten)]
    pub trigger: DailyTrigger,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub steps: BTreeMap<String, StepEntry>,
    #[serde(default)]
    pub jobs: BTreeMap<String, HttpJobConfig>,
    #[serde(default)]
    pub report: Option<ReportSection>,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runner config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse runner config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        if let Some(report) = &config.report {
            report.trigger.validate()?;
        }
        Ok(config)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        match &self.storage.root {
            Some(root) => Arc::new(FsStore::new(root.clone())),
            None => Arc::new(MemoryStore::new()),
        }
    }

    /// Step registry with one HTTP step per configured processor, plus the
    /// daily report step when a report section is present.
    pub fn build_steps(&self) -> Result<StepRegistry> {
        let mut registry = StepRegistry::new();

        for (name, entry) in &self.steps {
            let step = HttpStep::new(name.clone(), entry.http.clone())
                .with_context(|| format!("Failed to build step '{}'", name))?;
            match &entry.retry {
                Some(retry) => registry.register_with_retry(step, retry.clone()),
                None => registry.register(step),
            }
        }

        if let Some(report) = &self.report {
            let config = DailyReportConfig {
                bucket: report.bucket.clone(),
                utc_offset_hours: report.trigger.utc_offset_hours,
            };
            registry.register_with_retry(DailyReportStep::new(config, self.store()), RetryConfig::none());
        }

        Ok(registry)
    }

    pub fn build_jobs(&self) -> Result<JobClientRegistry> {
        let mut registry = JobClientRegistry::new();
        for (name, config) in &self.jobs {
            let client = HttpJobClient::new(config.clone())
                .with_context(|| format!("Failed to build job client '{}'", name))?;
            registry.register(name.clone(), Arc::new(client));
        }
        Ok(registry)
    }

    pub fn trigger(&self) -> Option<DailyTrigger> {
        self.report.as_ref().map(|r| r.trigger)
    }
}
