//! SOAP note generation
//!
//! A request is tried against the primary model and, when that model is
//! throttled and fallback is enabled, once against the fallback model. A
//! request still throttled after both attempts fails with a retryable
//! [`PipelineError::Throttled`]; the caller decides whether to queue it.

pub mod prompt;
pub mod response;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use config_engine::PipelineConfig;
use error_common::{codes, PipelineError, PipelineResult};
use logger_redacted::log_excerpt;

use crate::model::{GeneratedSoap, GenerationRequest, NoteStatus, SoapNote, TokenUsage};
use crate::providers::bedrock::mentions_throttling;
use crate::providers::{ModelClient, ModelReply, ModelRequest, UsageStore};

/// Model selection for generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub primary_model: String,
    pub fallback_model: String,
    pub enable_fallback: bool,
    pub max_tokens: u32,
}

impl GeneratorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            primary_model: config.bedrock.primary_model.clone(),
            fallback_model: config.bedrock.fallback_model.clone(),
            enable_fallback: config.generation.enable_fallback,
            max_tokens: config.bedrock.max_tokens,
        }
    }

    /// Models to try, in order
    fn attempts(&self) -> Vec<(&str, bool)> {
        let mut attempts = vec![(self.primary_model.as_str(), false)];
        if self.enable_fallback {
            attempts.push((self.fallback_model.as_str(), true));
        }
        attempts
    }
}

/// Throttling either arrives typed from the adapter or only in the error text.
fn as_throttle(error: PipelineError) -> Result<PipelineError, PipelineError> {
    match error {
        PipelineError::Throttled { .. } => Ok(error),
        PipelineError::Collaborator { ref message, .. } if mentions_throttling(message) => {
            Ok(PipelineError::throttled(message.clone()))
        }
        other => Err(other),
    }
}

fn required<'a>(value: Option<&'a str>, code: &'static str, message: &str) -> PipelineResult<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PipelineError::validation(code, message))
}

pub struct SoapGenerator {
    model: Arc<dyn ModelClient>,
    usage: Option<Arc<dyn UsageStore>>,
    settings: GeneratorSettings,
}

impl SoapGenerator {
    pub fn new(model: Arc<dyn ModelClient>, settings: GeneratorSettings) -> Self {
        Self {
            model,
            usage: None,
            settings,
        }
    }

    /// Reports token usage of every successful generation.
    pub fn with_usage_store(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Generates a note for one request.
    ///
    /// # Errors
    ///
    /// - `Validation` for a missing session id, appointment id or transcript
    /// - `Throttled` when every attempted model refused
    /// - `MalformedOutput` when the answer has no usable JSON object
    /// - any other collaborator failure from the model call
    pub async fn generate(&self, request: &GenerationRequest) -> PipelineResult<GeneratedSoap> {
        let session_id = required(
            request.session_id.as_deref(),
            codes::validation::MISSING_SESSION_ID,
            "sessionId is required",
        )?;
        let appointment_id = required(
            request.appointment_id.as_deref(),
            codes::validation::MISSING_APPOINTMENT_ID,
            "appointmentId is required",
        )?;
        if request.transcript_text.trim().is_empty() {
            return Err(PipelineError::validation(
                codes::validation::EMPTY_TRANSCRIPT,
                "transcript cannot be empty",
            ));
        }

        let user_message = prompt::user_message(request);
        let mut last_throttle = None;

        for (model_id, is_fallback) in self.settings.attempts() {
            info!(
                session_id,
                appointment_id,
                model = model_id,
                fallback = is_fallback,
                transcript_chars = request.transcript_text.len(),
                retry_count = request.retry_count,
                "Generating SOAP note"
            );

            let model_request = ModelRequest {
                model_id: model_id.to_string(),
                system: Some(prompt::SYSTEM_PROMPT.to_string()),
                user_message: user_message.clone(),
                max_tokens: self.settings.max_tokens,
            };

            match self.model.invoke(&model_request).await.map_err(as_throttle) {
                Ok(reply) => {
                    return self
                        .complete(session_id, appointment_id, model_id, is_fallback, reply)
                        .await;
                }
                Err(Ok(throttle)) => {
                    warn!(session_id, model = model_id, error = %throttle, "Model throttled");
                    last_throttle = Some(throttle);
                }
                Err(Err(other)) => return Err(other),
            }
        }

        Err(last_throttle.unwrap_or_else(|| PipelineError::throttled("no model attempt succeeded")))
    }

    async fn complete(
        &self,
        session_id: &str,
        appointment_id: &str,
        model_id: &str,
        used_fallback: bool,
        reply: ModelReply,
    ) -> PipelineResult<GeneratedSoap> {
        let text = reply.text.as_deref().filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            PipelineError::malformed(
                codes::generation::INVALID_MODEL_RESPONSE,
                "model response missing content",
                "",
            )
        })?;

        let document = match response::extract_object(text) {
            Ok(map) => response::complete_document(map),
            Err(err) => {
                warn!(session_id, model = model_id, excerpt = %log_excerpt(text, 500), "Unparseable model output");
                return Err(PipelineError::malformed(
                    codes::generation::INVALID_JSON_RESPONSE,
                    format!("model returned invalid JSON: {err}"),
                    text,
                ));
            }
        };

        let note = SoapNote {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            appointment_id: appointment_id.to_string(),
            sections: response::soap_sections(&document),
            model: model_id.to_string(),
            generated_at: Utc::now(),
            status: NoteStatus::Draft,
        };
        let usage = TokenUsage {
            session_id: session_id.to_string(),
            appointment_id: appointment_id.to_string(),
            model: model_id.to_string(),
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
        };

        if let Some(store) = &self.usage {
            if let Err(err) = store.record_usage(&usage).await {
                warn!(session_id, error = %err, "Failed to record token usage");
            }
        }

        info!(
            session_id,
            model = model_id,
            fallback = used_fallback,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "SOAP note generated"
        );

        Ok(GeneratedSoap {
            note,
            document,
            usage,
            used_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockModelClient, MockUsageStore};
    use mockall::Sequence;

    const NOTE_JSON: &str = r#"{"chief_complaint":"Sore throat","subjective":{"hpi":"2 days"}}"#;

    fn settings(enable_fallback: bool) -> GeneratorSettings {
        GeneratorSettings {
            primary_model: "primary".to_string(),
            fallback_model: "fallback".to_string(),
            enable_fallback,
            max_tokens: 4096,
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            session_id: Some("s-1".to_string()),
            appointment_id: Some("a-1".to_string()),
            transcript_text: "Patient: sore throat for two days".to_string(),
            ..Default::default()
        }
    }

    fn reply(text: &str) -> ModelReply {
        ModelReply {
            text: Some(text.to_string()),
            input_tokens: 1200,
            output_tokens: 300,
        }
    }

    #[tokio::test]
    async fn test_primary_success_records_usage() {
        let mut model = MockModelClient::new();
        model
            .expect_invoke()
            .withf(|r| r.model_id == "primary" && r.system.is_some() && r.user_message.contains("a-1"))
            .times(1)
            .returning(|_| Ok(reply(NOTE_JSON)));

        let mut usage = MockUsageStore::new();
        usage
            .expect_record_usage()
            .withf(|u| u.model == "primary" && u.total() == 1500)
            .times(1)
            .returning(|_| Ok(()));

        let generator = SoapGenerator::new(Arc::new(model), settings(true)).with_usage_store(Arc::new(usage));
        let generated = generator.generate(&request()).await.unwrap();

        assert!(!generated.used_fallback);
        assert_eq!(generated.note.sections.chief_complaint, "Sore throat");
        assert_eq!(generated.note.status, NoteStatus::Draft);
        assert_eq!(generated.document["schema_version"], "1.0.0");
    }

    #[tokio::test]
    async fn test_throttled_primary_uses_fallback_exactly_once() {
        let mut seq = Sequence::new();
        let mut model = MockModelClient::new();
        model
            .expect_invoke()
            .withf(|r| r.model_id == "primary")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PipelineError::throttled("ThrottlingException: Rate exceeded")));
        model
            .expect_invoke()
            .withf(|r| r.model_id == "fallback")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(reply(NOTE_JSON)));

        let generator = SoapGenerator::new(Arc::new(model), settings(true));
        let generated = generator.generate(&request()).await.unwrap();
        assert!(generated.used_fallback);
        assert_eq!(generated.note.model, "fallback");
    }

    #[tokio::test]
    async fn test_throttled_everywhere_is_retryable() {
        let mut model = MockModelClient::new();
        model
            .expect_invoke()
            .times(2)
            .returning(|_| Err(PipelineError::model("Too many tokens per day, please wait")));

        let err = SoapGenerator::new(Arc::new(model), settings(true))
            .generate(&request())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), codes::generation::TOKEN_LIMIT_EXCEEDED);
        assert_eq!(err.status_code(), 429);
    }

    #[tokio::test]
    async fn test_fallback_disabled_makes_single_attempt() {
        let mut model = MockModelClient::new();
        model
            .expect_invoke()
            .times(1)
            .returning(|_| Err(PipelineError::throttled("ThrottlingException")));

        let err = SoapGenerator::new(Arc::new(model), settings(false))
            .generate(&request())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), codes::generation::BEDROCK_THROTTLED);
    }

    #[tokio::test]
    async fn test_other_model_errors_do_not_fall_back() {
        let mut model = MockModelClient::new();
        model
            .expect_invoke()
            .times(1)
            .returning(|_| Err(PipelineError::model("AccessDeniedException")));

        let err = SoapGenerator::new(Arc::new(model), settings(true))
            .generate(&request())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), codes::collaborator::MODEL_FAILED);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_model_call() {
        let generator = SoapGenerator::new(Arc::new(MockModelClient::new()), settings(true));

        let mut missing_session = request();
        missing_session.session_id = None;
        let err = generator.generate(&missing_session).await.unwrap_err();
        assert_eq!(err.error_code(), codes::validation::MISSING_SESSION_ID);

        let mut missing_appointment = request();
        missing_appointment.appointment_id = Some("  ".to_string());
        let err = generator.generate(&missing_appointment).await.unwrap_err();
        assert_eq!(err.error_code(), codes::validation::MISSING_APPOINTMENT_ID);

        let mut blank = request();
        blank.transcript_text = "\n\t ".to_string();
        let err = generator.generate(&blank).await.unwrap_err();
        assert_eq!(err.error_code(), codes::validation::EMPTY_TRANSCRIPT);
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_malformed_output_keeps_bounded_excerpt() {
        let garbage = "x".repeat(5000);
        let mut model = MockModelClient::new();
        let body = garbage.clone();
        model.expect_invoke().times(1).returning(move |_| Ok(reply(&body)));

        let err = SoapGenerator::new(Arc::new(model), settings(true))
            .generate(&request())
            .await
            .unwrap_err();
        match err {
            PipelineError::MalformedOutput { code, raw_excerpt, .. } => {
                assert_eq!(code, codes::generation::INVALID_JSON_RESPONSE);
                assert_eq!(raw_excerpt.chars().count(), 1000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let mut model = MockModelClient::new();
        model.expect_invoke().times(1).returning(|_| Ok(ModelReply::default()));

        let err = SoapGenerator::new(Arc::new(model), settings(true))
            .generate(&request())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), codes::generation::INVALID_MODEL_RESPONSE);
    }

    #[tokio::test]
    async fn test_usage_failure_is_not_fatal() {
        let mut model = MockModelClient::new();
        model.expect_invoke().times(1).returning(|_| Ok(reply(NOTE_JSON)));
        let mut usage = MockUsageStore::new();
        usage
            .expect_record_usage()
            .times(1)
            .returning(|_| Err(PipelineError::datastore("timeout")));

        let generated = SoapGenerator::new(Arc::new(model), settings(true))
            .with_usage_store(Arc::new(usage))
            .generate(&request())
            .await;
        assert!(generated.is_ok());
    }

    #[test]
    fn test_attempt_order() {
        assert_eq!(settings(true).attempts(), vec![("primary", false), ("fallback", true)]);
        assert_eq!(settings(false).attempts(), vec![("primary", false)]);
    }
}
