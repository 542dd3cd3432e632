//! AWS Transcribe and Transcribe Medical adapter

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_transcribe::error::DisplayErrorContext;
use aws_sdk_transcribe::types::{
    ContentRedaction, LanguageCode, Media, MediaFormat, MedicalContentIdentificationType,
    MedicalTranscriptionSetting, PiiEntityType, RedactionOutput, RedactionType, Settings, Specialty,
    Type,
};
use aws_sdk_transcribe::Client;
use tracing::{debug, info};

use error_common::{PipelineError, PipelineResult};

use super::{JobDescription, MedicalJobParams, SpeechBackend, StandardJobParams};
use crate::language::BackendKind;
use crate::model::JobStatus;

pub struct TranscribeBackend {
    client: Client,
}

impl TranscribeBackend {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_error(backend: BackendKind, err: impl std::error::Error) -> PipelineError {
    PipelineError::transcription(backend.service_name(), DisplayErrorContext(err).to_string())
}

#[async_trait]
impl SpeechBackend for TranscribeBackend {
    async fn start_medical_job(&self, params: &MedicalJobParams) -> PipelineResult<()> {
        let settings = MedicalTranscriptionSetting::builder()
            .show_speaker_labels(true)
            .max_speaker_labels(params.max_speakers)
            .set_vocabulary_name(params.vocabulary.clone())
            .build();

        self.client
            .start_medical_transcription_job()
            .medical_transcription_job_name(&params.job_name)
            .language_code(LanguageCode::from(params.language_code.as_str()))
            .media_format(MediaFormat::from(params.media_format))
            .media(Media::builder().media_file_uri(&params.media_uri).build())
            .output_bucket_name(&params.output.bucket)
            .output_key(&params.output.key)
            .specialty(Specialty::from(params.specialty))
            .r#type(Type::from("CONVERSATION"))
            .content_identification_type(MedicalContentIdentificationType::from("PHI"))
            .settings(settings)
            .send()
            .await
            .map_err(|e| sdk_error(BackendKind::MedicalAsr, e))?;

        info!(job_name = %params.job_name, language = %params.language_code, "Started medical transcription job");
        Ok(())
    }

    async fn start_standard_job(&self, params: &StandardJobParams) -> PipelineResult<()> {
        let settings = Settings::builder()
            .show_speaker_labels(true)
            .max_speaker_labels(params.max_speakers)
            .set_vocabulary_name(params.vocabulary.clone())
            .build();

        let redaction = ContentRedaction::builder()
            .redaction_type(RedactionType::from("PII"))
            .redaction_output(RedactionOutput::from("redacted_and_unredacted"))
            .set_pii_entity_types(Some(
                params
                    .redacted_entities
                    .iter()
                    .map(|entity| PiiEntityType::from(*entity))
                    .collect(),
            ))
            .build()
            .map_err(|e| sdk_error(BackendKind::StandardAsr, e))?;

        self.client
            .start_transcription_job()
            .transcription_job_name(&params.job_name)
            .language_code(LanguageCode::from(params.language_code.as_str()))
            .media_format(MediaFormat::from(params.media_format))
            .media(Media::builder().media_file_uri(&params.media_uri).build())
            .output_bucket_name(&params.output.bucket)
            .output_key(&params.output.key)
            .settings(settings)
            .content_redaction(redaction)
            .send()
            .await
            .map_err(|e| sdk_error(BackendKind::StandardAsr, e))?;

        info!(job_name = %params.job_name, language = %params.language_code, "Started standard transcription job");
        Ok(())
    }

    async fn describe_job(&self, job_name: &str, backend: BackendKind) -> PipelineResult<JobDescription> {
        debug!(job_name, backend = backend.service_name(), "Fetching job detail");

        let description = match backend {
            BackendKind::MedicalAsr => {
                let output = self
                    .client
                    .get_medical_transcription_job()
                    .medical_transcription_job_name(job_name)
                    .send()
                    .await
                    .map_err(|e| sdk_error(backend, e))?;
                let job = output
                    .medical_transcription_job()
                    .ok_or_else(|| PipelineError::NotFound(format!("medical job {job_name}")))?;
                JobDescription {
                    status: job
                        .transcription_job_status()
                        .and_then(|s| JobStatus::from_backend(s.as_str())),
                    language_code: job.language_code().map(|l| l.as_str().to_string()),
                    transcript_uri: job
                        .transcript()
                        .and_then(|t| t.transcript_file_uri())
                        .map(str::to_string),
                    failure_reason: job.failure_reason().map(str::to_string),
                }
            }
            BackendKind::StandardAsr | BackendKind::GenericAsr => {
                let output = self
                    .client
                    .get_transcription_job()
                    .transcription_job_name(job_name)
                    .send()
                    .await
                    .map_err(|e| sdk_error(backend, e))?;
                let job = output
                    .transcription_job()
                    .ok_or_else(|| PipelineError::NotFound(format!("transcription job {job_name}")))?;
                JobDescription {
                    status: job
                        .transcription_job_status()
                        .and_then(|s| JobStatus::from_backend(s.as_str())),
                    language_code: job.language_code().map(|l| l.as_str().to_string()),
                    transcript_uri: job
                        .transcript()
                        .and_then(|t| t.transcript_file_uri())
                        .map(str::to_string),
                    failure_reason: job.failure_reason().map(str::to_string),
                }
            }
        };

        Ok(description)
    }
}
