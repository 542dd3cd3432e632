/// OpenAI-compatible transcription endpoint
///
/// Used for languages the AWS backends do not cover. The call is synchronous:
/// the audio is uploaded and the transcript comes back in the response.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use error_common::{PipelineError, PipelineResult};

use super::{http_client, AudioUpload, GenericSpeechBackend};
use crate::language::BackendKind;
use crate::model::{InlineTranscript, TranscriptSegment};

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
}

impl From<VerboseTranscription> for InlineTranscript {
    fn from(response: VerboseTranscription) -> Self {
        Self {
            text: response.text.trim().to_string(),
            segments: response
                .segments
                .into_iter()
                .map(|segment| TranscriptSegment {
                    speaker_label: "Unknown".to_string(),
                    start_offset: segment.start,
                    end_offset: segment.end,
                    text: segment.text.trim().to_string(),
                })
                .collect(),
            duration_secs: response.duration,
            detected_language: response.language,
        }
    }
}

pub struct WhisperBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    model: String,
}

impl WhisperBackend {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.into(),
            api_key,
            model: model.into(),
        })
    }

    fn failure(message: String) -> PipelineError {
        PipelineError::transcription(BackendKind::GenericAsr.service_name(), message)
    }
}

#[async_trait]
impl GenericSpeechBackend for WhisperBackend {
    async fn transcribe(&self, upload: AudioUpload) -> PipelineResult<InlineTranscript> {
        let size = upload.bytes.len();
        let file = Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(upload.mime_type)
            .map_err(|e| Self::failure(format!("invalid audio MIME type: {e}")))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");
        if let Some(language) = &upload.language {
            form = form.text("language", language.clone());
        }

        debug!(file_name = %upload.file_name, size, language = ?upload.language, "Uploading audio for transcription");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::failure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::failure(format!("API error {status}: {error_text}")));
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| Self::failure(format!("response parse error: {e}")))?;

        info!(
            segments = transcription.segments.len(),
            detected_language = ?transcription.language,
            "Synchronous transcription finished"
        );
        Ok(transcription.into())
    }
}
