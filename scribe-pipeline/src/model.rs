//! Records exchanged between pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::language::BackendKind;

/// Clinical specialty passed to the medical speech backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Specialty {
    #[default]
    PrimaryCare,
    Cardiology,
    Neurology,
    Oncology,
    Radiology,
    Urology,
}

impl Specialty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryCare => "PRIMARYCARE",
            Self::Cardiology => "CARDIOLOGY",
            Self::Neurology => "NEUROLOGY",
            Self::Oncology => "ONCOLOGY",
            Self::Radiology => "RADIOLOGY",
            Self::Urology => "UROLOGY",
        }
    }
}

/// Routing input, consumed once by the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    #[serde(default, rename = "s3_uri", alias = "audio_location")]
    pub audio_location: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub appointment_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default, rename = "medical_specialty")]
    pub specialty: Specialty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Maps speech backend status strings; queued jobs count as in progress.
    pub fn from_backend(status: &str) -> Option<Self> {
        match status.to_ascii_uppercase().as_str() {
            "QUEUED" | "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One diarized stretch of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(rename = "speaker")]
    pub speaker_label: String,
    #[serde(rename = "start_time")]
    pub start_offset: f64,
    #[serde(rename = "end_time")]
    pub end_offset: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Symptom,
    Diagnosis,
    Medication,
    Procedure,
    VitalSign,
    History,
    Allergy,
}

impl EntityType {
    /// Accepts model labels (`"SYMPTOMS"`, `"vital signs"`) and the
    /// categories reported by the medical speech backend.
    pub fn from_label(label: &str) -> Option<Self> {
        let key = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match key.as_str() {
            "SYMPTOM" | "SYMPTOMS" => Some(Self::Symptom),
            "DIAGNOSIS" | "DIAGNOSES" | "MEDICAL_CONDITION" | "CONDITION" => Some(Self::Diagnosis),
            "MEDICATION" | "MEDICATIONS" => Some(Self::Medication),
            "PROCEDURE" | "PROCEDURES" | "TEST_TREATMENT_PROCEDURE" | "TREATMENT" => Some(Self::Procedure),
            "VITAL_SIGN" | "VITAL_SIGNS" | "VITALS" => Some(Self::VitalSign),
            "HISTORY" | "MEDICAL_HISTORY" | "FAMILY_HISTORY" => Some(Self::History),
            "ALLERGY" | "ALLERGIES" => Some(Self::Allergy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOffsets {
    pub begin: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalEntity {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_en: Option<String>,
    #[serde(rename = "type")]
    pub canonical_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icd10_code: Option<String>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_offsets: Option<SourceOffsets>,
}

impl MedicalEntity {
    pub fn new(text: impl Into<String>, canonical_type: EntityType, confidence: f32) -> Self {
        Self {
            text: text.into(),
            text_en: None,
            canonical_type,
            icd10_code: None,
            confidence: clamp_confidence(confidence),
            context: None,
            source_offsets: None,
        }
    }
}

/// Confidence is kept within `[0, 1]`; NaN counts as no confidence.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Transcript produced synchronously by the generic backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineTranscript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
}

/// A transcription job as created by the router
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionJob {
    pub job_name: String,
    pub backend: BackendKind,
    pub status: JobStatus,
    pub language_code: String,
    pub output_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<InlineTranscript>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MedicalEntity>,
    pub started_at: DateTime<Utc>,
}

/// Column identifying the session row a router write targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKey {
    Session(String),
    Appointment(String),
}

impl SessionKey {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Session(_) => "id",
            Self::Appointment(_) => "appointment_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Session(value) | Self::Appointment(value) => value,
        }
    }
}

/// Outcome of a finished asynchronous job, upserted by job name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTranscript {
    pub job_name: String,
    pub appointment_id: String,
    pub backend: BackendKind,
    pub language_code: String,
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
    pub entities: Vec<MedicalEntity>,
    pub completed_at: DateTime<Utc>,
}

/// Encounter details that enrich the generation prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_language: Option<String>,
}

/// Input of SOAP generation, also the payload replayed from the retry queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default, rename = "transcript")]
    pub transcript_text: String,
    #[serde(flatten)]
    pub metadata: EncounterMetadata,
    #[serde(default, rename = "retry_count")]
    pub retry_count: u32,
    #[serde(default, rename = "original_queue_time", skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
}

/// Retry queue message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub event: GenerationRequest,
    pub reason: String,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl QueuedRequest {
    /// Wraps a throttled request; the stored count is one past the request's.
    pub fn for_retry(event: GenerationRequest, reason: impl Into<String>) -> Self {
        let retry_count = event.retry_count.saturating_add(1);
        Self {
            event,
            reason: reason.into(),
            queued_at: Utc::now(),
            retry_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    #[default]
    Draft,
    Final,
    Amended,
}

impl NoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Amended => "amended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapSections {
    pub chief_complaint: String,
    pub subjective: Value,
    pub objective: Value,
    pub assessment: Value,
    pub plan: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapNote {
    pub id: Uuid,
    pub session_id: String,
    pub appointment_id: String,
    pub sections: SoapSections,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub status: NoteStatus,
}

/// Token accounting for one successful model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub session_id: String,
    pub appointment_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Successful generation: the note, the schema-complete document and usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSoap {
    pub note: SoapNote,
    pub document: Value,
    pub usage: TokenUsage,
    #[serde(default)]
    pub used_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_request_wire_names() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "sessionId": "s-1",
            "appointmentId": "a-1",
            "transcript": "Doctor: hello",
            "providerName": "Dr. Ngono",
            "transcriptLanguage": "fr",
            "retry_count": 2,
            "original_queue_time": "2025-03-01T10:00:00.123456Z"
        }))
        .unwrap();

        assert_eq!(request.session_id.as_deref(), Some("s-1"));
        assert_eq!(request.transcript_text, "Doctor: hello");
        assert_eq!(request.metadata.provider_name.as_deref(), Some("Dr. Ngono"));
        assert_eq!(request.metadata.transcript_language.as_deref(), Some("fr"));
        assert_eq!(request.retry_count, 2);
        assert!(request.queued_at.is_some());
    }

    #[test]
    fn test_queued_request_increments_once() {
        let event = GenerationRequest {
            retry_count: 3,
            ..Default::default()
        };
        let queued = QueuedRequest::for_retry(event, "Bedrock throttling");
        assert_eq!(queued.retry_count, 4);
        assert_eq!(queued.event.retry_count, 3);

        let body = serde_json::to_value(&queued).unwrap();
        assert_eq!(body["retry_count"], 4);
        assert!(body["queued_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_transcription_request_defaults() {
        let request: TranscriptionRequest = serde_json::from_value(json!({
            "s3_uri": "s3://audio/visit.mp3",
            "appointment_id": "a-1"
        }))
        .unwrap();
        assert_eq!(request.specialty, Specialty::PrimaryCare);
        assert!(request.language_code.is_empty());
        assert!(request.session_id.is_none());
    }

    #[test]
    fn test_entity_labels() {
        assert_eq!(EntityType::from_label("vital signs"), Some(EntityType::VitalSign));
        assert_eq!(EntityType::from_label("MEDICAL_CONDITION"), Some(EntityType::Diagnosis));
        assert_eq!(EntityType::from_label("allergies"), Some(EntityType::Allergy));
        assert_eq!(EntityType::from_label("ANATOMY"), None);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(MedicalEntity::new("fever", EntityType::Symptom, 1.7).confidence, 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_job_status_mapping() {
        assert_eq!(JobStatus::from_backend("QUEUED"), Some(JobStatus::InProgress));
        assert_eq!(JobStatus::from_backend("completed"), Some(JobStatus::Completed));
        assert!(JobStatus::Failed.is_terminal());
        assert_eq!(JobStatus::from_backend("UNKNOWN"), None);
    }
}
