//! Async job client boundary.
//!
//! Long-running analysis jobs are started once and then polled for status.
//! The engine drives the polling loop; clients here only translate the
//! remote protocol into [`JobStatus`] / [`JobPoll`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StepError;

/// Status reported by a job service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Started,
    InProgress,
    Succeeded,
    Failed,
    /// Anything the protocol does not define. Treated as a protocol violation.
    #[serde(untagged)]
    Unknown(String),
}

impl JobStatus {
    /// Parse a wire status string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STARTED" => JobStatus::Started,
            "IN_PROGRESS" => JobStatus::InProgress,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Started => "STARTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown(raw) => raw,
        }
    }

    /// Returns true while the job still has work to do.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Started | JobStatus::InProgress)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPoll {
    pub status: JobStatus,

    /// Where the result lives once the job has succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,

    /// Failure detail reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobPoll {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            result_location: None,
            message: None,
        }
    }

    pub fn succeeded(result_location: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            result_location: Some(result_location.into()),
            message: None,
        }
    }
}

/// Client for a start-then-poll job service.
#[async_trait]
pub trait AsyncJobClient: Send + Sync {
    /// Start a job for the given input reference and return its id.
    async fn start(&self, input: &serde_json::Value) -> Result<String, StepError>;

    /// Check the status of a previously started job.
    async fn poll(&self, job_id: &str) -> Result<JobPoll, StepError>;
}

/// Named job clients available to Poll states.
#[derive(Default, Clone)]
pub struct JobClientRegistry {
    clients: HashMap<String, Arc<dyn AsyncJobClient>>,
}

impl JobClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under a name.
    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn AsyncJobClient>) {
        self.clients.insert(name.into(), client);
    }

    /// Get a client by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AsyncJobClient>> {
        self.clients.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for JobClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobClientRegistry")
            .field("clients", &self.list())
            .finish()
    }
}

/// HTTP job client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJobConfig {
    /// Base URL of the job service.
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    result_location: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
}

/// Job client speaking `POST {base}/jobs` and `GET {base}/jobs/{id}`.
#[derive(Clone)]
pub struct HttpJobClient {
    client: reqwest::Client,
    config: HttpJobConfig,
}

impl HttpJobClient {
    pub fn new(config: HttpJobConfig) -> Result<Self, StepError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StepError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `{base}/jobs/{id}` with the id as one encoded path segment.
    fn job_url(&self, job_id: &str) -> Result<reqwest::Url, StepError> {
        let mut url = reqwest::Url::parse(&self.url("/jobs"))
            .map_err(|e| StepError::Configuration(format!("Invalid job service URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                StepError::Configuration(format!(
                    "Job service URL cannot take a path: {}",
                    self.config.base_url
                ))
            })?
            .push(job_id);
        Ok(url)
    }

    fn with_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        request
    }
}

#[async_trait]
impl AsyncJobClient for HttpJobClient {
    async fn start(&self, input: &serde_json::Value) -> Result<String, StepError> {
        let request = self
            .client
            .post(self.url("/jobs"))
            .json(&serde_json::json!({ "input": input }));

        let response = self.with_headers(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepError::failed(format!("HTTP_{}", status.as_u16()), body));
        }

        let started: StartResponse = response.json().await?;
        tracing::info!(job_id = %started.job_id, "Job started");
        Ok(started.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll, StepError> {
        let request = self.client.get(self.job_url(job_id)?);

        let response = self.with_headers(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepError::failed(format!("HTTP_{}", status.as_u16()), body));
        }

        let body: StatusResponse = response.json().await?;
        Ok(JobPoll {
            status: JobStatus::parse(&body.status),
            result_location: body.result_location,
            message: body.status_message,
        })
    }
}

impl std::fmt::Debug for HttpJobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(JobStatus::parse("IN_PROGRESS"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("SUCCEEDED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::parse("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("STARTED"), JobStatus::Started);
        assert_eq!(
            JobStatus::parse("PARTIAL_SUCCESS"),
            JobStatus::Unknown("PARTIAL_SUCCESS".to_string())
        );
    }

    #[test]
    fn test_status_pending() {
        assert!(JobStatus::Started.is_pending());
        assert!(JobStatus::InProgress.is_pending());
        assert!(!JobStatus::Succeeded.is_pending());
        assert!(!JobStatus::Unknown("?".into()).is_pending());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(JobStatus::Unknown("weird".into()).to_string(), "weird");
    }

    #[test]
    fn test_status_deserialize() {
        let poll: JobPoll =
            serde_json::from_str(r#"{"status":"SUCCEEDED","result_location":"results/j-1"}"#)
                .unwrap();
        assert_eq!(poll, JobPoll::succeeded("results/j-1"));

        let poll: JobPoll = serde_json::from_str(r#"{"status":"EXPIRED"}"#).unwrap();
        assert_eq!(poll.status, JobStatus::Unknown("EXPIRED".to_string()));
    }

    #[test]
    fn test_registry() {
        let mut registry = JobClientRegistry::new();
        let client = HttpJobClient::new(HttpJobConfig {
            base_url: "http://localhost:9000/".to_string(),
            timeout_seconds: 5,
            headers: HashMap::new(),
        })
        .unwrap();
        assert_eq!(client.url("/jobs"), "http://localhost:9000/jobs");

        registry.register("analysis", Arc::new(client));
        assert!(registry.has("analysis"));
        assert!(registry.get("other").is_none());
        assert_eq!(registry.list(), vec!["analysis"]);
    }

    mod wire {
        use super::*;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client_for(server: &MockServer) -> HttpJobClient {
            HttpJobClient::new(HttpJobConfig {
                base_url: server.uri(),
                timeout_seconds: 5,
                headers: HashMap::new(),
            })
            .unwrap()
        }

        #[tokio::test]
        async fn test_start_returns_job_id() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/jobs"))
                .and(body_json(serde_json::json!({"input": ["invoices/m-1/a.pdf"]})))
                .respond_with(
                    ResponseTemplate::new(202).set_body_json(serde_json::json!({"jobId": "job-7"})),
                )
                .expect(1)
                .mount(&server)
                .await;

            let job_id = client_for(&server)
                .start(&serde_json::json!(["invoices/m-1/a.pdf"]))
                .await
                .unwrap();
            assert_eq!(job_id, "job-7");
        }

        #[tokio::test]
        async fn test_start_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/jobs"))
                .respond_with(ResponseTemplate::new(500).set_body_string("down"))
                .mount(&server)
                .await;

            let err = client_for(&server)
                .start(&serde_json::Value::Null)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "HTTP_500");
        }

        #[tokio::test]
        async fn test_poll_succeeded() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/jobs/job-7"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "SUCCEEDED",
                    "resultLocation": "results/job-7.json"
                })))
                .mount(&server)
                .await;

            let poll = client_for(&server).poll("job-7").await.unwrap();
            assert_eq!(poll, JobPoll::succeeded("results/job-7.json"));
        }

        #[tokio::test]
        async fn test_poll_unknown_status() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/jobs/job-7"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "PARTIAL_SUCCESS",
                    "statusMessage": "2 of 3 pages"
                })))
                .mount(&server)
                .await;

            let poll = client_for(&server).poll("job-7").await.unwrap();
            assert_eq!(poll.status, JobStatus::Unknown("PARTIAL_SUCCESS".to_string()));
            assert_eq!(poll.message.as_deref(), Some("2 of 3 pages"));
        }

        #[tokio::test]
        async fn test_poll_encodes_job_id() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/jobs/a%2Fb%3Fc"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"status": "IN_PROGRESS"})),
                )
                .expect(1)
                .mount(&server)
                .await;

            let poll = client_for(&server).poll("a/b?c").await.unwrap();
            assert_eq!(poll.status, JobStatus::InProgress);
        }
    }

}
