//! Ports to external collaborators and their adapters
//!
//! Pipeline stages only see the traits below. The adapters in the submodules
//! bind them to AWS (speech, storage, queue, models), Supabase REST, an
//! OpenAI-compatible transcription endpoint and FCM.

pub mod bedrock;
pub mod documents;
pub mod fcm;
pub mod s3;
pub mod sqs;
pub mod supabase;
pub mod transcribe;
pub mod whisper;

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use error_common::{PipelineError, PipelineResult};

use crate::language::BackendKind;
use crate::media::ObjectLocation;
use crate::model::{
    CompletedTranscript, GeneratedSoap, InlineTranscript, JobStatus, QueuedRequest, SessionKey,
    TokenUsage, TranscriptionJob,
};

/// Loads shared AWS settings for one region.
pub async fn aws_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// HTTP client with a request timeout.
///
/// # Errors
///
/// Fails when the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> PipelineResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {e}")))
}

/// Parameters of an asynchronous medical transcription job
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalJobParams {
    pub job_name: String,
    pub media_uri: String,
    pub media_format: &'static str,
    pub language_code: String,
    pub specialty: &'static str,
    pub output: ObjectLocation,
    pub vocabulary: Option<String>,
    pub max_speakers: i32,
}

/// Parameters of an asynchronous standard transcription job
#[derive(Debug, Clone, PartialEq)]
pub struct StandardJobParams {
    pub job_name: String,
    pub media_uri: String,
    pub media_format: &'static str,
    pub language_code: String,
    pub output: ObjectLocation,
    pub vocabulary: Option<String>,
    pub max_speakers: i32,
    pub redacted_entities: Vec<&'static str>,
}

/// Job detail fetched when a completion event arrives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDescription {
    pub status: Option<JobStatus>,
    pub language_code: Option<String>,
    pub transcript_uri: Option<String>,
    pub failure_reason: Option<String>,
}

/// Audio handed to the synchronous backend
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
    /// ISO 639-1 hint; `None` lets the backend detect the language
    pub language: Option<String>,
}

/// One call to the generative model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model_id: String,
    pub system: Option<String>,
    pub user_message: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    /// First text block of the response, if any
    pub text: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Totals from the daily usage view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderContact {
    pub id: String,
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Notification shown to a provider and stored alongside the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderNotification {
    pub recipient_id: String,
    pub kind: &'static str,
    pub title: String,
    pub body: String,
    pub session_id: String,
    pub appointment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Client action the push opens, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

impl ProviderNotification {
    /// Data payload delivered with the push and stored with the record
    pub fn data(&self) -> serde_json::Value {
        let mut data = serde_json::json!({
            "type": self.kind,
            "appointmentId": self.appointment_id,
            "sessionId": self.session_id,
        });
        if let Some(note_id) = &self.note_id {
            data["soapNoteId"] = serde_json::Value::String(note_id.clone());
        }
        if let Some(action) = self.action {
            data["action"] = serde_json::Value::String(action.to_string());
        }
        data
    }
}

/// Asynchronous speech backends (medical and standard)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn start_medical_job(&self, params: &MedicalJobParams) -> PipelineResult<()>;

    async fn start_standard_job(&self, params: &StandardJobParams) -> PipelineResult<()>;

    async fn describe_job(&self, job_name: &str, backend: BackendKind) -> PipelineResult<JobDescription>;
}

/// Synchronous speech backend for languages the others do not cover
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenericSpeechBackend: Send + Sync {
    async fn transcribe(&self, upload: AudioUpload) -> PipelineResult<InlineTranscript>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, location: &ObjectLocation) -> PipelineResult<Vec<u8>>;

    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>, content_type: &str) -> PipelineResult<()>;
}

/// Downloads a document by URI, whatever scheme the backend reported
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> PipelineResult<Vec<u8>>;
}

/// Generative model endpoint. Rate or quota refusals surface as
/// `PipelineError::Throttled`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> PipelineResult<ModelReply>;
}

/// Transcription state on the session row
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn record_job(&self, key: &SessionKey, job: &TranscriptionJob) -> PipelineResult<()>;

    /// Keyed by job name so a redelivered event rewrites the same row.
    async fn upsert_transcript(&self, transcript: &CompletedTranscript) -> PipelineResult<()>;

    async fn mark_failed(&self, job_name: &str, appointment_id: &str, reason: &str) -> PipelineResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Upserts by session and returns the stored note id.
    async fn upsert_note(&self, generated: &GeneratedSoap, provider_id: &str) -> PipelineResult<String>;

    async fn record_token_tracking(&self, usage: &TokenUsage, note_id: &str) -> PipelineResult<()>;

    async fn link_note_to_session(&self, session_id: &str, note_id: &str) -> PipelineResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record_usage(&self, usage: &TokenUsage) -> PipelineResult<()>;

    async fn daily_summary(&self, date: NaiveDate) -> PipelineResult<Option<DailyUsage>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn provider_contact(&self, provider_id: &str) -> PipelineResult<Option<ProviderContact>>;

    async fn store_notification(&self, notification: &ProviderNotification) -> PipelineResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, device_token: &str, notification: &ProviderNotification) -> PipelineResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetryQueue: Send + Sync {
    async fn enqueue(&self, request: &QueuedRequest) -> PipelineResult<()>;
}
