//! Stateless request/response wrapper around the generation service.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

use crate::core::{ServiceRecord, StageName};
use crate::errors::GenerationError;
use crate::ports::{GenerationRequest, GenerationService};
use crate::utils::duration_ms;

/// Content produced for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    /// Stage the content belongs to.
    pub stage: StageName,
    /// Generated document.
    pub data: serde_json::Value,
    /// Wall time of the call.
    pub elapsed: Duration,
}

/// Calls the generation service for one stage of one service.
#[derive(Clone)]
pub struct GenerationClient {
    service: Arc<dyn GenerationService>,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient").finish_non_exhaustive()
    }
}

impl GenerationClient {
    /// Wraps a generation service.
    #[must_use]
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    /// Generates content for `stage`.
    ///
    /// Anything other than a JSON object is a validation failure.
    pub async fn generate(
        &self,
        stage: StageName,
        service: &ServiceRecord,
        prior_research: Option<&serde_json::Value>,
        custom_prompt: Option<&str>,
    ) -> Result<GeneratedContent, GenerationError> {
        let request = GenerationRequest {
            stage,
            service: service.clone(),
            prior_research: prior_research.cloned(),
            custom_prompt: custom_prompt.map(str::to_string),
        };

        let started = Instant::now();
        let data = self.service.generate(&request).await?;
        let elapsed = started.elapsed();

        validate(stage, &data)?;

        debug!(
            entity_id = %service.id,
            stage = %stage,
            elapsed_ms = duration_ms(elapsed),
            "Generated stage content"
        );

        Ok(GeneratedContent {
            stage,
            data,
            elapsed,
        })
    }

    /// Same as [`generate`](Self::generate) raced against `limit`.
    ///
    /// The in-flight call is dropped when the limit fires.
    pub async fn generate_with_timeout(
        &self,
        stage: StageName,
        service: &ServiceRecord,
        prior_research: Option<&serde_json::Value>,
        custom_prompt: Option<&str>,
        limit: Duration,
    ) -> Result<GeneratedContent, GenerationError> {
        match timeout(
            limit,
            self.generate(stage, service, prior_research, custom_prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                stage,
                after: limit,
            }),
        }
    }
}

fn validate(stage: StageName, data: &serde_json::Value) -> Result<(), GenerationError> {
    match data.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        Some(_) => Err(GenerationError::Validation {
            stage,
            message: "empty content".to_string(),
        }),
        None => Err(GenerationError::Validation {
            stage,
            message: format!("expected an object, got {}", json_kind(data)),
        }),
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockGenerationService;
    use serde_json::json;

    fn record() -> ServiceRecord {
        ServiceRecord::new("svc-1", "Tax filing")
    }

    #[tokio::test]
    async fn test_forwards_research_and_prompt() {
        let mut mock = MockGenerationService::new();
        mock.expect_generate()
            .withf(|req| {
                req.stage == StageName::Details
                    && req.prior_research == Some(json!({"market": "smb"}))
                    && req.custom_prompt.as_deref() == Some("be brief")
            })
            .times(1)
            .returning(|_| Ok(json!({"description": "Done for you"})));

        let client = GenerationClient::new(Arc::new(mock));
        let content = client
            .generate(
                StageName::Details,
                &record(),
                Some(&json!({"market": "smb"})),
                Some("be brief"),
            )
            .await
            .unwrap();

        assert_eq!(content.stage, StageName::Details);
        assert_eq!(content.data["description"], "Done for you");
    }

    #[tokio::test]
    async fn test_rejects_non_object() {
        let mut mock = MockGenerationService::new();
        mock.expect_generate().returning(|_| Ok(json!("plain text")));

        let client = GenerationClient::new(Arc::new(mock));
        let err = client
            .generate(StageName::Faqs, &record(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Validation { stage: StageName::Faqs, .. }));
    }

    #[tokio::test]
    async fn test_rejects_empty_object() {
        let mut mock = MockGenerationService::new();
        mock.expect_generate().returning(|_| Ok(json!({})));

        let client = GenerationClient::new(Arc::new(mock));
        let err = client
            .generate(StageName::Research, &record(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_passes_through_transport_error() {
        let mut mock = MockGenerationService::new();
        mock.expect_generate().returning(|req| {
            Err(GenerationError::Transport {
                stage: req.stage,
                message: "503".to_string(),
            })
        });

        let client = GenerationClient::new(Arc::new(mock));
        let err = client
            .generate(StageName::Disclaimer, &record(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_timeout_race() {
        let service = crate::testing::ScriptedGenerationService::new()
            .with_delay(StageName::Funnel, Duration::from_millis(500));
        let client = GenerationClient::new(Arc::new(service));

        let err = client
            .generate_with_timeout(
                StageName::Funnel,
                &record(),
                None,
                None,
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.stage(), StageName::Funnel);
    }
}
