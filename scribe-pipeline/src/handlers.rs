//! Event handlers
//!
//! One handler per trigger. Each takes the raw JSON event and answers with a
//! `statusCode`/`body` envelope; failures are logged and reported through
//! [`ErrorReport`] rather than returned. The queue trigger is the exception:
//! it answers with the partial batch response the queue expects.

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use error_common::{codes, log_error, ErrorReport, PipelineError, PipelineResult};

use crate::callback::{CallbackOutcome, JobStateChange};
use crate::finalize::{FinalizedNote, NoteEvent};
use crate::model::{GeneratedSoap, GenerationRequest, QueuedRequest, TranscriptionJob, TranscriptionRequest};
use crate::retry::{BatchResponse, QueueBatch};
use crate::service::Pipeline;
use crate::usage::UsageReport;

/// Envelope returned by every request/response handler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl HandlerResponse {
    fn ok(context: &str, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status_code: 200,
                body: json!({"success": true, "data": data}),
            },
            Err(err) => Self::error(context, &PipelineError::from(err)),
        }
    }

    fn error(context: &str, error: &PipelineError) -> Self {
        log_error(context, error);
        let body = serde_json::to_value(ErrorReport::from(error)).unwrap_or_else(|_| {
            json!({"success": false, "error": error.error_code(), "message": error.to_string()})
        });
        Self {
            status_code: error.status_code(),
            body,
        }
    }

    fn from_result<T: Serialize>(context: &str, result: PipelineResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(context, data),
            Err(err) => Self::error(context, &err),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Reads the request from an API-style `body` string or the event itself.
fn payload<T: DeserializeOwned>(event: Value) -> PipelineResult<T> {
    let invalid = |err: serde_json::Error| {
        PipelineError::validation(codes::validation::INVALID_INPUT, format!("invalid request body: {err}"))
    };
    if let Some(body) = event.get("body").and_then(Value::as_str) {
        return serde_json::from_str(body).map_err(invalid);
    }
    serde_json::from_value(event).map_err(invalid)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(flatten)]
    generated: GeneratedSoap,
    #[serde(skip_serializing_if = "Option::is_none")]
    finalized: Option<FinalizedNote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest {
    #[serde(flatten)]
    generated: GeneratedSoap,
    provider_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsageQuery {
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl Pipeline {
    /// Starts transcription for a recorded call.
    pub async fn handle_route(&self, event: Value) -> HandlerResponse {
        HandlerResponse::from_result("route", self.route_event(event).await)
    }

    async fn route_event(&self, event: Value) -> PipelineResult<TranscriptionJob> {
        let request: TranscriptionRequest = payload(event)?;
        self.router.route(&request).await
    }

    /// Handles a transcription job state-change event.
    pub async fn handle_callback(&self, event: Value) -> HandlerResponse {
        HandlerResponse::from_result("callback", self.callback_event(&event).await)
    }

    async fn callback_event(&self, event: &Value) -> PipelineResult<CallbackOutcome> {
        let change = JobStateChange::from_event(event)?;
        self.callbacks
            .on_job_state_change(&change.job_name, &change.status)
            .await
    }

    /// Generates a note, storing it when the request names a provider.
    ///
    /// Throttled requests are queued for replay and answered with 429.
    pub async fn handle_generate(&self, event: Value) -> HandlerResponse {
        let request: GenerationRequest = match payload(event) {
            Ok(request) => request,
            Err(err) => return HandlerResponse::error("generate", &err),
        };
        let provider_id = non_blank(request.metadata.provider_id.as_deref()).map(str::to_string);
        let session_id = request.session_id.clone().unwrap_or_default();
        let appointment_id = request.appointment_id.clone().unwrap_or_default();

        match self.generator.generate(&request).await {
            Ok(generated) => {
                let finalized = match provider_id.as_deref() {
                    Some(provider_id) => match self.finalizer.finalize(&generated, provider_id).await {
                        Ok(finalized) => Some(finalized),
                        Err(err) => return HandlerResponse::error("generate", &err),
                    },
                    None => None,
                };
                HandlerResponse::ok("generate", GenerateResponse { generated, finalized })
            }
            Err(err) if err.is_retryable() => {
                let queued = self.enqueue_retry(request, &err).await;
                if let (true, Some(provider_id)) = (queued, provider_id.as_deref()) {
                    self.finalizer
                        .notify(provider_id, &session_id, &appointment_id, &NoteEvent::Pending)
                        .await;
                }
                let mut response = HandlerResponse::error("generate", &err);
                response.body["queued"] = Value::Bool(queued);
                response
            }
            Err(err) => {
                if let (false, Some(provider_id)) = (matches!(err, PipelineError::Validation { .. }), provider_id.as_deref()) {
                    self.finalizer
                        .notify(provider_id, &session_id, &appointment_id, &NoteEvent::Failed)
                        .await;
                }
                HandlerResponse::error("generate", &err)
            }
        }
    }

    async fn enqueue_retry(&self, request: GenerationRequest, error: &PipelineError) -> bool {
        let Some(queue) = &self.retry_queue else {
            warn!("No retry queue configured, throttled request not queued");
            return false;
        };
        let queued = QueuedRequest::for_retry(request, error.to_string());
        match queue.enqueue(&queued).await {
            Ok(()) => {
                info!(
                    session_id = queued.event.session_id.as_deref().unwrap_or_default(),
                    retry_count = queued.retry_count,
                    "Throttled request queued for retry"
                );
                true
            }
            Err(err) => {
                log_error("enqueue_retry", &err);
                false
            }
        }
    }

    /// Replays a batch from the retry queue.
    ///
    /// # Errors
    ///
    /// Fails only when the event is not a queue batch.
    pub async fn handle_process_queue(&self, event: Value) -> PipelineResult<BatchResponse> {
        let batch: QueueBatch = serde_json::from_value(event).map_err(|e| {
            PipelineError::validation(codes::validation::INVALID_EVENT, format!("not a queue batch: {e}"))
        })?;
        Ok(self.retry.process_batch(&batch).await.batch_response())
    }

    /// Reports the day's token usage against the budget.
    pub async fn handle_monitor_usage(&self, event: Value) -> HandlerResponse {
        HandlerResponse::from_result("monitor_usage", self.usage_event(event).await)
    }

    async fn usage_event(&self, event: Value) -> PipelineResult<UsageReport> {
        let query: UsageQuery = if event.is_null() { UsageQuery::default() } else { payload(event)? };
        let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
        self.usage.check(date).await
    }

    /// Stores a previously generated note for a provider.
    pub async fn handle_finalize(&self, event: Value) -> HandlerResponse {
        HandlerResponse::from_result("finalize", self.finalize_event(event).await)
    }

    async fn finalize_event(&self, event: Value) -> PipelineResult<FinalizedNote> {
        let request: FinalizeRequest = payload(event)?;
        self.finalizer.finalize(&request.generated, &request.provider_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_reads_body_string_or_event() {
        let direct: TranscriptionRequest = payload(json!({"s3_uri": "s3://a/b.mp3", "appointment_id": "x"})).unwrap();
        let wrapped: TranscriptionRequest =
            payload(json!({"body": r#"{"s3_uri": "s3://a/b.mp3", "appointment_id": "x"}"#})).unwrap();
        assert_eq!(direct.audio_location, wrapped.audio_location);

        let err = payload::<TranscriptionRequest>(json!({"body": "not json"})).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_error_envelope() {
        let response = HandlerResponse::error("generate", &PipelineError::throttled("Too many tokens per day"));
        assert_eq!(response.status_code, 429);
        assert_eq!(response.body["error"], "TokenLimitExceeded");
        assert_eq!(response.body["retryable"], true);
        assert!(!response.is_success());

        let envelope = serde_json::to_value(&response).unwrap();
        assert_eq!(envelope["statusCode"], 429);
    }

    #[test]
    fn test_success_envelope() {
        let response = HandlerResponse::ok("usage", json!({"level": "none"}));
        assert!(response.is_success());
        assert_eq!(response.body, json!({"success": true, "data": {"level": "none"}}));
    }
}
