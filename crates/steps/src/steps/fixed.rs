//! Step that always returns the same fragment.

use async_trait::async_trait;

use crate::context::StepContext;
use crate::error::StepError;
use crate::registry::Step;
use crate::result::StepOutput;

/// Returns a fixed context fragment. Used for dry runs and local wiring.
#[derive(Debug, Clone)]
pub struct StaticStep {
    name: String,
    output: serde_json::Value,
}

impl StaticStep {
    pub fn new(name: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }

    /// A step that merges nothing.
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name, serde_json::Value::Null)
    }
}

#[async_trait]
impl Step for StaticStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        tracing::debug!(step = %self.name, state = %ctx.state, "Static step invoked");
        Ok(StepOutput::success(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_step() {
        let step = StaticStep::new("detectInvoice", serde_json::json!({"attachments": []}));
        assert_eq!(step.name(), "detectInvoice");

        let out = step.invoke(&StepContext::default()).await.unwrap();
        assert_eq!(out.data, serde_json::json!({"attachments": []}));
    }

    #[tokio::test]
    async fn test_noop_step() {
        let out = StaticStep::noop("updateAccountAssignment")
            .invoke(&StepContext::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
