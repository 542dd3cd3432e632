//! Completion callbacks for asynchronous transcription jobs
//!
//! The speech backend emits a state-change event per job. Completed jobs have
//! their result document downloaded, reduced to text, segments and entities,
//! and upserted by job name, so a redelivered event rewrites the same row.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use error_common::{codes, PipelineError, PipelineResult};

use crate::entities::EntityExtractor;
use crate::job_name;
use crate::language::{self, BackendKind, DEFAULT_LANGUAGE};
use crate::model::{CompletedTranscript, JobStatus};
use crate::providers::{DocumentFetcher, SpeechBackend, TranscriptStore};
use crate::transcript::TranscriptDocument;

/// Failure reason recorded when the backend gives none
pub const UNKNOWN_FAILURE: &str = "Unknown";

/// Job name and status carried by a state-change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStateChange {
    pub job_name: String,
    pub status: String,
}

impl JobStateChange {
    /// Reads `detail` of an EventBridge event for either backend family.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEvent` when the job name or status is absent.
    pub fn from_event(event: &Value) -> PipelineResult<Self> {
        let detail = event.get("detail").unwrap_or(event);
        let field = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|name| detail.get(*name).and_then(Value::as_str))
                .map(str::to_string)
        };

        let job_name = field(["TranscriptionJobName", "MedicalTranscriptionJobName"]);
        let status = field(["TranscriptionJobStatus", "MedicalTranscriptionJobStatus"]);
        match (job_name, status) {
            (Some(job_name), Some(status)) => Ok(Self { job_name, status }),
            _ => Err(PipelineError::validation(
                codes::validation::INVALID_EVENT,
                "event detail has no transcription job name or status",
            )),
        }
    }
}

/// What a callback did with its event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Completed {
        job_name: String,
        appointment_id: String,
        segments: usize,
        entities: usize,
    },
    Failed {
        job_name: String,
        appointment_id: String,
        reason: String,
    },
    /// The job cannot be attributed to an appointment this pipeline owns
    Skipped { job_name: String, reason: String },
    /// Non-terminal status, nothing to do
    Ignored { job_name: String, status: String },
}

pub struct CallbackHandler {
    speech: Arc<dyn SpeechBackend>,
    documents: Arc<dyn DocumentFetcher>,
    store: Arc<dyn TranscriptStore>,
    extractor: Arc<EntityExtractor>,
}

impl CallbackHandler {
    pub fn new(
        speech: Arc<dyn SpeechBackend>,
        documents: Arc<dyn DocumentFetcher>,
        store: Arc<dyn TranscriptStore>,
        extractor: Arc<EntityExtractor>,
    ) -> Self {
        Self {
            speech,
            documents,
            store,
            extractor,
        }
    }

    /// # Errors
    ///
    /// Job lookup, download, parsing and persistence failures on the
    /// completed path; persistence failures on the failed path.
    pub async fn on_job_state_change(&self, job_name: &str, status: &str) -> PipelineResult<CallbackOutcome> {
        let Some(parsed) = job_name::parse(job_name) else {
            warn!(job_name, "Cannot attribute job name to an appointment");
            return Ok(CallbackOutcome::Skipped {
                job_name: job_name.to_string(),
                reason: "job name does not contain an appointment id".to_string(),
            });
        };
        let backend = match parsed.backend {
            Some(backend) if backend.is_async() => backend,
            _ => {
                warn!(job_name, prefix = parsed.prefix, "Job was not started by an asynchronous backend");
                return Ok(CallbackOutcome::Skipped {
                    job_name: job_name.to_string(),
                    reason: format!("unexpected job prefix {}", parsed.prefix),
                });
            }
        };
        let appointment_id = parsed.appointment_id;

        match JobStatus::from_backend(status) {
            Some(JobStatus::Completed) => self.completed(job_name, appointment_id, backend).await,
            Some(JobStatus::Failed) => self.failed(job_name, appointment_id, backend).await,
            _ => {
                info!(job_name, status, "Ignoring non-terminal job status");
                Ok(CallbackOutcome::Ignored {
                    job_name: job_name.to_string(),
                    status: status.to_string(),
                })
            }
        }
    }

    async fn completed(
        &self,
        job_name: &str,
        appointment_id: &str,
        backend: BackendKind,
    ) -> PipelineResult<CallbackOutcome> {
        let description = self.speech.describe_job(job_name, backend).await?;
        let transcript_uri = description.transcript_uri.ok_or_else(|| {
            PipelineError::transcription(backend.service_name(), format!("job {job_name} has no transcript location"))
        })?;

        let bytes = self.documents.fetch(&transcript_uri).await?;
        let document = TranscriptDocument::from_slice(&bytes)?;
        let full_text = document.full_text();
        let segments = document.segments();
        let language_code = description
            .language_code
            .map(|code| language::normalize(&code))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let entities = match backend {
            BackendKind::MedicalAsr => document.native_entities(),
            BackendKind::StandardAsr if !language::is_english(&language_code) => {
                self.extractor.extract(&full_text, &language_code).await
            }
            BackendKind::StandardAsr | BackendKind::GenericAsr => Vec::new(),
        };

        let completed = CompletedTranscript {
            job_name: job_name.to_string(),
            appointment_id: appointment_id.to_string(),
            backend,
            language_code,
            full_text,
            segments,
            entities,
            completed_at: Utc::now(),
        };
        self.store.upsert_transcript(&completed).await?;

        info!(
            job_name,
            appointment_id,
            segments = completed.segments.len(),
            entities = completed.entities.len(),
            "Transcript stored"
        );
        Ok(CallbackOutcome::Completed {
            job_name: completed.job_name,
            appointment_id: completed.appointment_id,
            segments: completed.segments.len(),
            entities: completed.entities.len(),
        })
    }

    async fn failed(&self, job_name: &str, appointment_id: &str, backend: BackendKind) -> PipelineResult<CallbackOutcome> {
        let reason = match self.speech.describe_job(job_name, backend).await {
            Ok(description) => description.failure_reason,
            Err(err) => {
                warn!(job_name, error = %err, "Could not fetch failure reason");
                None
            }
        }
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());

        self.store.mark_failed(job_name, appointment_id, &reason).await?;
        warn!(job_name, appointment_id, reason = %reason, "Transcription job failed");

        Ok(CallbackOutcome::Failed {
            job_name: job_name.to_string(),
            appointment_id: appointment_id.to_string(),
            reason,
        })
    }
}
