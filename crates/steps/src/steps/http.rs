//! Remote processor step over HTTP.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::context::StepContext;
use crate::error::StepError;
use crate::registry::Step;
use crate::result::StepOutput;

/// HTTP method used to call a processor.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)] // HTTP methods are conventionally uppercase
pub enum HttpMethod {
    #[default]
    POST,
    PUT,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
        }
    }
}

/// Configuration of one remote processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStepConfig {
    /// Processor endpoint.
    pub url: String,

    /// HTTP method (default: POST).
    #[serde(default)]
    pub method: HttpMethod,

    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Step that posts the step context to a remote processor and returns the
/// JSON object it answers with.
pub struct HttpStep {
    name: String,
    config: HttpStepConfig,
    client: reqwest::Client,
}

impl HttpStep {
    /// Create a new HTTP step.
    pub fn new(name: impl Into<String>, config: HttpStepConfig) -> Result<Self, StepError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StepError::Configuration(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    /// Create an HTTP step with a custom client.
    pub fn with_client(
        name: impl Into<String>,
        config: HttpStepConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            client,
        }
    }
}

/// Turn a processor response body into a context fragment.
///
/// Processors report some failures in-band as `{"statusCode": 4xx/5xx, ...}`
/// with a 200 transport status. Those are failures, not fragments.
fn interpret_body(body: serde_json::Value) -> Result<serde_json::Value, StepError> {
    let in_band_status = body.get("statusCode").and_then(|s| s.as_u64());

    match in_band_status {
        Some(code) if !(200..300).contains(&code) => {
            let message = body
                .get("error")
                .or_else(|| body.get("body"))
                .map(|m| match m {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("processor reported status {}", code));
            Err(StepError::failed(format!("HTTP_{}", code), message))
        }
        _ => Ok(body),
    }
}

#[async_trait]
impl Step for HttpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let method: Method = self.config.method.clone().into();
        let mut request = self
            .client
            .request(method, &self.config.url)
            .header("X-Docflow-Invocation", ctx.invocation_id.to_string())
            .json(&ctx.to_payload());

        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        tracing::debug!(
            step = %self.name,
            url = %self.config.url,
            attempt = ctx.attempt,
            "Calling processor"
        );

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StepError::Timeout(self.config.timeout_seconds)
            } else {
                StepError::from(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            // Transport-level 5xx is retryable at the registry.
            return Err(StepError::Http(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        if !status.is_success() {
            return Err(StepError::failed(format!("HTTP_{}", status.as_u16()), text));
        }

        if text.trim().is_empty() {
            return Ok(StepOutput::empty());
        }

        let body: serde_json::Value = serde_json::from_str(&text)?;
        Ok(StepOutput::success(interpret_body(body)?))
    }
}

impl std::fmt::Debug for HttpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStep")
            .field("name", &self.name)
            .field("url", &self.config.url)
            .finish()
    }
}
