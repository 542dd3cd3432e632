//! Transcription routing
//!
//! A request is normalized, classified and turned into a [`TranscriptionPlan`]
//! before anything external is called. Medical and standard plans start an
//! asynchronous job whose result arrives through the callback handler; the
//! generic plan transcribes synchronously and completes in place.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use config_engine::PipelineConfig;
use error_common::{codes, PipelineError, PipelineResult};

use crate::entities::EntityExtractor;
use crate::job_name::JobName;
use crate::language::{self, BackendKind};
use crate::media::{media_format, mime_type, ObjectLocation};
use crate::model::{JobStatus, SessionKey, TranscriptionJob, TranscriptionRequest};
use crate::providers::{
    AudioUpload, GenericSpeechBackend, MedicalJobParams, ObjectStore, SpeechBackend, StandardJobParams,
    TranscriptStore,
};

/// Speakers expected in a consultation
pub const MAX_SPEAKERS: i32 = 2;

/// PII categories redacted by the standard backend
pub const REDACTED_PII: &[&str] = &["NAME", "ADDRESS", "EMAIL", "PHONE", "SSN", "CREDIT_DEBIT_NUMBER"];

/// Output placement and vocabularies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    pub output_bucket: String,
    pub medical_vocabulary: Option<String>,
    pub standard_vocabulary: Option<String>,
}

impl RouterSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            output_bucket: config.aws.output_bucket.clone(),
            medical_vocabulary: config.aws.medical_vocabulary.clone(),
            standard_vocabulary: config.aws.standard_vocabulary.clone(),
        }
    }

    fn output_prefix(&self, appointment_id: &str) -> ObjectLocation {
        ObjectLocation::new(&self.output_bucket, format!("transcriptions/{appointment_id}/"))
    }
}

/// Everything needed to run one backend, decided before any call is made
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionPlan {
    Medical(MedicalJobParams),
    Standard(StandardJobParams),
    Generic {
        job_name: String,
        source: ObjectLocation,
        language_code: String,
        language_hint: Option<String>,
        output: ObjectLocation,
    },
}

impl TranscriptionPlan {
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Medical(_) => BackendKind::MedicalAsr,
            Self::Standard(_) => BackendKind::StandardAsr,
            Self::Generic { .. } => BackendKind::GenericAsr,
        }
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub struct TranscriptionRouter {
    speech: Arc<dyn SpeechBackend>,
    generic: Arc<dyn GenericSpeechBackend>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn TranscriptStore>,
    extractor: Arc<EntityExtractor>,
    settings: RouterSettings,
}

impl TranscriptionRouter {
    pub fn new(
        speech: Arc<dyn SpeechBackend>,
        generic: Arc<dyn GenericSpeechBackend>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn TranscriptStore>,
        extractor: Arc<EntityExtractor>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            speech,
            generic,
            objects,
            store,
            extractor,
            settings,
        }
    }

    /// Builds the plan for a request without side effects.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing or unparsable audio location
    /// and for a missing appointment id.
    pub fn plan(&self, request: &TranscriptionRequest) -> PipelineResult<TranscriptionPlan> {
        if blank(&request.audio_location) {
            return Err(PipelineError::validation(
                codes::validation::MISSING_AUDIO_LOCATION,
                "s3_uri is required",
            ));
        }
        if blank(&request.appointment_id) {
            return Err(PipelineError::validation(
                codes::validation::MISSING_APPOINTMENT_ID,
                "appointment_id is required",
            ));
        }

        let appointment_id = request.appointment_id.trim();
        let source = ObjectLocation::parse(request.audio_location.trim())?;
        let canonical = language::normalize(&request.language_code);
        let backend = language::classify(&canonical);
        let job_name = JobName::generate(backend, appointment_id).to_string();
        let output = self.settings.output_prefix(appointment_id);

        let plan = match backend {
            BackendKind::MedicalAsr => TranscriptionPlan::Medical(MedicalJobParams {
                job_name,
                media_uri: source.to_string(),
                media_format: media_format(source.file_name()),
                language_code: canonical,
                specialty: request.specialty.as_str(),
                output,
                vocabulary: self.settings.medical_vocabulary.clone(),
                max_speakers: MAX_SPEAKERS,
            }),
            BackendKind::StandardAsr => TranscriptionPlan::Standard(StandardJobParams {
                job_name,
                media_uri: source.to_string(),
                media_format: media_format(source.file_name()),
                language_code: canonical,
                output,
                vocabulary: self.settings.standard_vocabulary.clone(),
                max_speakers: MAX_SPEAKERS,
                redacted_entities: REDACTED_PII.to_vec(),
            }),
            BackendKind::GenericAsr => {
                if !language::is_declared(&canonical) {
                    warn!(language = %canonical, "Undeclared language, using generic backend");
                }
                TranscriptionPlan::Generic {
                    job_name,
                    language_hint: language::generic_language_hint(&canonical),
                    language_code: canonical,
                    output: ObjectLocation::new(
                        &self.settings.output_bucket,
                        format!("transcriptions/{appointment_id}/whisper-result.json"),
                    ),
                    source,
                }
            }
        };
        Ok(plan)
    }

    /// Starts (or, for the generic backend, performs) transcription and
    /// records the job on the session row.
    ///
    /// # Errors
    ///
    /// Validation errors from [`Self::plan`]; backend, storage and
    /// persistence failures propagate unchanged.
    pub async fn route(&self, request: &TranscriptionRequest) -> PipelineResult<TranscriptionJob> {
        let plan = self.plan(request)?;
        info!(
            appointment_id = %request.appointment_id,
            language = %request.language_code,
            backend = ?plan.backend(),
            "Routing transcription request"
        );

        let started_at = Utc::now();
        let job = match plan {
            TranscriptionPlan::Medical(params) => {
                self.speech.start_medical_job(&params).await?;
                TranscriptionJob {
                    job_name: params.job_name,
                    backend: BackendKind::MedicalAsr,
                    status: JobStatus::InProgress,
                    language_code: params.language_code,
                    output_location: Some(params.output.to_string()),
                    transcript: None,
                    entities: Vec::new(),
                    started_at,
                }
            }
            TranscriptionPlan::Standard(params) => {
                self.speech.start_standard_job(&params).await?;
                TranscriptionJob {
                    job_name: params.job_name,
                    backend: BackendKind::StandardAsr,
                    status: JobStatus::InProgress,
                    language_code: params.language_code,
                    output_location: Some(params.output.to_string()),
                    transcript: None,
                    entities: Vec::new(),
                    started_at,
                }
            }
            TranscriptionPlan::Generic {
                job_name,
                source,
                language_code,
                language_hint,
                output,
            } => {
                let bytes = self.objects.get_object(&source).await?;
                let file_name = source.file_name().to_string();
                let upload = AudioUpload {
                    bytes,
                    mime_type: mime_type(&file_name),
                    file_name,
                    language: language_hint,
                };
                let transcript = self.generic.transcribe(upload).await?;
                let entities = self.extractor.extract(&transcript.text, &language_code).await;

                let result = json!({
                    "job_name": job_name,
                    "language_code": language_code,
                    "service": BackendKind::GenericAsr.service_name(),
                    "transcript": transcript,
                    "entities": entities,
                    "completed_at": Utc::now(),
                });
                self.objects
                    .put_object(&output, serde_json::to_vec(&result)?, "application/json")
                    .await?;

                info!(
                    job_name = %job_name,
                    segments = transcript.segments.len(),
                    entities = entities.len(),
                    "Generic transcription completed"
                );

                TranscriptionJob {
                    job_name,
                    backend: BackendKind::GenericAsr,
                    status: JobStatus::Completed,
                    language_code,
                    output_location: Some(output.to_string()),
                    transcript: Some(transcript),
                    entities,
                    started_at,
                }
            }
        };

        let key = match request.session_id.as_deref().map(str::trim) {
            Some(session_id) if !session_id.is_empty() => SessionKey::Session(session_id.to_string()),
            _ => SessionKey::Appointment(request.appointment_id.trim().to_string()),
        };
        self.store.record_job(&key, &job).await?;

        Ok(job)
    }
}
