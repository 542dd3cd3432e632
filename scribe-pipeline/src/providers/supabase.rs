//! Supabase REST (PostgREST) adapter
//!
//! One client serves every store port. Rows are addressed with PostgREST
//! filters (`column=eq.value`); writes that may be repeated use PATCH on a
//! stable key or POST with `on_conflict` so redelivery rewrites the same row.
//! PostgREST answers a PATCH that matches nothing with success, so transcript
//! writes ask for the updated rows and treat an empty list as a missing
//! session.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use config_engine::SupabaseConfig;
use error_common::{truncate_chars, PipelineError, PipelineResult};

use super::{
    http_client, DailyUsage, NoteStore, NotificationStore, ProviderContact, ProviderNotification, TranscriptStore,
    UsageStore,
};
use crate::model::{CompletedTranscript, GeneratedSoap, JobStatus, SessionKey, TokenUsage, TranscriptionJob};

const SESSIONS: &str = "video_call_sessions";
const CLINICAL_NOTES: &str = "clinical_notes";
const TOKEN_USAGE: &str = "bedrock_token_usage";
const TOKEN_TRACKING: &str = "bedrock_token_tracking";
const DAILY_SUMMARY: &str = "bedrock_daily_token_summary";
const USERS: &str = "users";
const NOTIFICATIONS: &str = "call_notifications";

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    service_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct StoredId {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    #[serde(default)]
    total_input_tokens: Option<u64>,
    #[serde(default)]
    total_output_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    total_sessions: Option<u64>,
}

impl From<SummaryRow> for DailyUsage {
    fn from(row: SummaryRow) -> Self {
        let input_tokens = row.total_input_tokens.unwrap_or(0);
        let output_tokens = row.total_output_tokens.unwrap_or(0);
        Self {
            input_tokens,
            output_tokens,
            total_tokens: row
                .total_tokens
                .unwrap_or_else(|| input_tokens.saturating_add(output_tokens)),
            sessions: row.total_sessions.unwrap_or(0),
        }
    }
}

impl SupabaseClient {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, service_key: SecretString, timeout: Duration) -> PipelineResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
        })
    }

    /// # Errors
    ///
    /// Fails when the URL or service key is missing.
    pub fn from_config(config: &SupabaseConfig) -> PipelineResult<Self> {
        let (url, key) = config
            .credentials()
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        Self::new(
            url,
            SecretString::new(key.to_string()),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> PipelineResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::datastore(format!("{context}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::datastore(format!(
                "{context}: {status} {}",
                truncate_chars(&error_text, 200)
            )));
        }
        Ok(response)
    }

    async fn patch_sessions(&self, column: &str, value: &str, body: &Value, context: &str) -> PipelineResult<()> {
        let request = self
            .table(Method::PATCH, SESSIONS)
            .query(&[(column, format!("eq.{value}"))])
            .header("Prefer", "return=minimal")
            .json(body);
        self.send(request, context).await?;
        Ok(())
    }

    /// PATCH that must hit at least one session row.
    async fn patch_existing_sessions(
        &self,
        column: &str,
        value: &str,
        body: &Value,
        context: &str,
    ) -> PipelineResult<usize> {
        let request = self
            .table(Method::PATCH, SESSIONS)
            .query(&[(column, format!("eq.{value}")), ("select", "id".to_string())])
            .header("Prefer", "return=representation")
            .json(body);
        let response = self.send(request, context).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| PipelineError::datastore(format!("{context}: unreadable rows: {e}")))?;

        if rows.is_empty() {
            return Err(PipelineError::NotFound(format!("{context}: no session with {column} = {value}")));
        }
        Ok(rows.len())
    }

    async fn insert(&self, table: &str, body: &Value, context: &str) -> PipelineResult<()> {
        let request = self
            .table(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body);
        self.send(request, context).await?;
        Ok(())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        context: &str,
    ) -> PipelineResult<Vec<T>> {
        let request = self
            .table(Method::GET, table)
            .query(filters)
            .header("Accept", "application/json");
        let response = self.send(request, context).await?;
        response
            .json()
            .await
            .map_err(|e| PipelineError::datastore(format!("{context}: unreadable rows: {e}")))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn non_empty(value: &str) -> Value {
    if value.trim().is_empty() {
        Value::Null
    } else {
        Value::String(value.to_string())
    }
}

#[async_trait]
impl TranscriptStore for SupabaseClient {
    async fn record_job(&self, key: &SessionKey, job: &TranscriptionJob) -> PipelineResult<()> {
        let now = timestamp();
        let mut body = json!({
            "transcription_status": job.status.as_str(),
            "transcription_job_name": job.job_name,
            "transcription_output_uri": job.output_location,
            "transcription_language": job.language_code,
            "transcription_service": job.backend.service_name(),
            "transcription_started_at": job.started_at.to_rfc3339(),
            "updated_at": now,
        });

        if let Some(transcript) = &job.transcript {
            body["raw_transcript"] = Value::String(transcript.text.clone());
            body["transcript_segments"] = serde_json::to_value(&transcript.segments)?;
            body["medical_entities"] = serde_json::to_value(&job.entities)?;
            body["transcription_completed_at"] = Value::String(now);
        }

        self.patch_existing_sessions(key.column(), key.value(), &body, "record transcription job")
            .await?;
        info!(job_name = %job.job_name, filter = key.column(), "Stored transcription job on session");
        Ok(())
    }

    async fn upsert_transcript(&self, transcript: &CompletedTranscript) -> PipelineResult<()> {
        let body = json!({
            "transcription_status": JobStatus::Completed.as_str(),
            "transcription_completed_at": transcript.completed_at.to_rfc3339(),
            "raw_transcript": transcript.full_text,
            "transcript_segments": transcript.segments,
            "medical_entities": transcript.entities,
            "transcription_language": transcript.language_code,
            "transcription_service": transcript.backend.service_name(),
            "updated_at": timestamp(),
        });

        self.patch_existing_sessions("transcription_job_name", &transcript.job_name, &body, "store transcript")
            .await?;
        info!(
            job_name = %transcript.job_name,
            appointment_id = %transcript.appointment_id,
            segments = transcript.segments.len(),
            entities = transcript.entities.len(),
            "Stored completed transcript"
        );
        Ok(())
    }

    async fn mark_failed(&self, job_name: &str, appointment_id: &str, reason: &str) -> PipelineResult<()> {
        let body = json!({
            "transcription_status": JobStatus::Failed.as_str(),
            "transcription_error": reason,
            "updated_at": timestamp(),
        });
        self.patch_sessions("appointment_id", appointment_id, &body, "record transcription failure")
            .await?;
        info!(job_name, appointment_id, "Recorded transcription failure");
        Ok(())
    }
}

/// Clinical note row without `id`: on conflict the stored note keeps its key.
fn note_row(generated: &GeneratedSoap, provider_id: &str) -> Value {
    let note = &generated.note;
    json!({
        "session_id": note.session_id,
        "appointment_id": note.appointment_id,
        "provider_id": non_empty(provider_id),
        "note_type": "SOAP",
        "status": note.status.as_str(),
        "chief_complaint": note.sections.chief_complaint,
        "subjective": note.sections.subjective,
        "objective": note.sections.objective,
        "assessment": note.sections.assessment,
        "plan": note.sections.plan,
        "ai_raw_json": generated.document,
        "ai_model": note.model,
        "ai_generated_at": note.generated_at.to_rfc3339(),
        "updated_at": timestamp(),
    })
}

#[async_trait]
impl NoteStore for SupabaseClient {
    async fn upsert_note(&self, generated: &GeneratedSoap, provider_id: &str) -> PipelineResult<String> {
        let note = &generated.note;
        let request = self
            .table(Method::POST, CLINICAL_NOTES)
            .query(&[("on_conflict", "session_id"), ("select", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&note_row(generated, provider_id));
        let response = self.send(request, "upsert clinical note").await?;

        let stored: Vec<StoredId> = response
            .json()
            .await
            .map_err(|e| PipelineError::datastore(format!("upsert clinical note: unreadable rows: {e}")))?;
        let note_id = stored
            .into_iter()
            .next()
            .map(|row| match row.id {
                Value::String(id) => id,
                other => other.to_string(),
            })
            .ok_or_else(|| PipelineError::datastore("upsert clinical note: no row returned"))?;

        info!(session_id = %note.session_id, note_id = %note_id, "Stored clinical note");
        Ok(note_id)
    }

    async fn record_token_tracking(&self, usage: &TokenUsage, note_id: &str) -> PipelineResult<()> {
        let body = json!({
            "session_id": usage.session_id,
            "appointment_id": usage.appointment_id,
            "soap_note_id": note_id,
            "ai_model": usage.model,
            "input_tokens": usage.input_tokens,
            "output_tokens": usage.output_tokens,
            "total_tokens": usage.total(),
            "created_at": timestamp(),
        });
        self.insert(TOKEN_TRACKING, &body, "record token tracking").await
    }

    async fn link_note_to_session(&self, session_id: &str, note_id: &str) -> PipelineResult<()> {
        let body = json!({
            "soap_note_id": note_id,
            "finalization_status": "completed",
            "finalized_at": timestamp(),
        });
        self.patch_sessions("id", session_id, &body, "link note to session").await
    }
}

#[async_trait]
impl UsageStore for SupabaseClient {
    async fn record_usage(&self, usage: &TokenUsage) -> PipelineResult<()> {
        let body = json!({
            "session_id": usage.session_id,
            "appointment_id": usage.appointment_id,
            "timestamp": timestamp(),
            "input_tokens": usage.input_tokens,
            "output_tokens": usage.output_tokens,
            "model": usage.model,
        });
        self.insert(TOKEN_USAGE, &body, "record token usage").await?;
        debug!(session_id = %usage.session_id, tokens = usage.total(), "Recorded token usage");
        Ok(())
    }

    async fn daily_summary(&self, date: NaiveDate) -> PipelineResult<Option<DailyUsage>> {
        let rows: Vec<SummaryRow> = self
            .select(DAILY_SUMMARY, &[("usage_date", format!("eq.{date}"))], "read daily usage")
            .await?;
        Ok(rows.into_iter().next().map(DailyUsage::from))
    }
}

#[async_trait]
impl NotificationStore for SupabaseClient {
    async fn provider_contact(&self, provider_id: &str) -> PipelineResult<Option<ProviderContact>> {
        let rows: Vec<ProviderContact> = self
            .select(
                USERS,
                &[
                    ("id", format!("eq.{provider_id}")),
                    ("select", "id,fcm_token,display_name".to_string()),
                ],
                "read provider contact",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn store_notification(&self, notification: &ProviderNotification) -> PipelineResult<()> {
        let body = json!({
            "provider_id": notification.recipient_id,
            "soap_note_id": notification.note_id,
            "session_id": notification.session_id,
            "notification_type": notification.kind,
            "title": notification.title,
            "body": notification.body,
            "data": notification.data(),
            "status": "sent",
            "created_at": timestamp(),
        });
        self.insert(NOTIFICATIONS, &body, "store notification").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::BackendKind;
    use crate::model::{NoteStatus, SoapNote, SoapSections};
    use mockito::Matcher;
    use uuid::Uuid;

    fn client(server: &mockito::Server) -> SupabaseClient {
        SupabaseClient::new(
            server.url(),
            SecretString::new("service-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn generated() -> GeneratedSoap {
        GeneratedSoap {
            note: SoapNote {
                id: Uuid::nil(),
                session_id: "s-1".to_string(),
                appointment_id: "a-1".to_string(),
                sections: SoapSections {
                    chief_complaint: "Sore throat".to_string(),
                    subjective: json!({"hpi": "two days"}),
                    objective: json!({}),
                    assessment: json!({}),
                    plan: json!({}),
                },
                model: "primary".to_string(),
                generated_at: Utc::now(),
                status: NoteStatus::Draft,
            },
            document: json!({"schema_version": "1.0.0"}),
            usage: TokenUsage {
                session_id: "s-1".to_string(),
                appointment_id: "a-1".to_string(),
                model: "primary".to_string(),
                input_tokens: 10,
                output_tokens: 5,
            },
            used_fallback: false,
        }
    }

    #[tokio::test]
    async fn test_record_job_patches_by_session_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/video_call_sessions")
            .match_query(Matcher::UrlEncoded("appointment_id".into(), "eq.a-1".into()))
            .match_header("apikey", "service-key")
            .match_header("authorization", "Bearer service-key")
            .match_body(Matcher::PartialJson(json!({
                "transcription_status": "IN_PROGRESS",
                "transcription_job_name": "medical-a-1-0badc0de",
                "transcription_service": "aws_transcribe_medical"
            })))
            .with_status(200)
            .with_body(r#"[{"id":"s-1"}]"#)
            .create_async()
            .await;

        let job = TranscriptionJob {
            job_name: "medical-a-1-0badc0de".to_string(),
            backend: BackendKind::MedicalAsr,
            status: JobStatus::InProgress,
            language_code: "en-US".to_string(),
            output_location: Some("s3://out/transcriptions/a-1/".to_string()),
            transcript: None,
            entities: Vec::new(),
            started_at: Utc::now(),
        };
        client(&server)
            .record_job(&SessionKey::Appointment("a-1".to_string()), &job)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = SupabaseConfig {
            url: "https://project.supabase.co/".to_string(),
            ..SupabaseConfig::default()
        };
        let err = SupabaseClient::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "ConfigurationError");

        config.service_key = Some(SecretString::new("service-key".to_string()));
        let client = SupabaseClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://project.supabase.co");
    }

    fn completed(job_name: &str) -> CompletedTranscript {
        CompletedTranscript {
            job_name: job_name.to_string(),
            appointment_id: "ghost".to_string(),
            backend: BackendKind::StandardAsr,
            language_code: "fr-FR".to_string(),
            full_text: "Bonjour docteur".to_string(),
            segments: Vec::new(),
            entities: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_transcript_for_unknown_job_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/video_call_sessions")
            .match_query(Matcher::UrlEncoded(
                "transcription_job_name".into(),
                "eq.standard-ghost-0badc0de".into(),
            ))
            .match_header("prefer", "return=representation")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let err = client(&server)
            .upsert_transcript(&completed("standard-ghost-0badc0de"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().contains("standard-ghost-0badc0de"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transcript_for_tagged_session_is_stored() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/video_call_sessions")
            .match_query(Matcher::UrlEncoded(
                "transcription_job_name".into(),
                "eq.standard-a-1-0badc0de".into(),
            ))
            .match_body(Matcher::PartialJson(json!({
                "transcription_status": "COMPLETED",
                "raw_transcript": "Bonjour docteur"
            })))
            .with_status(200)
            .with_body(r#"[{"id":"s-1"}]"#)
            .create_async()
            .await;

        client(&server)
            .upsert_transcript(&completed("standard-a-1-0badc0de"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_job_for_missing_session_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/rest/v1/video_call_sessions")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.s-missing".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let job = TranscriptionJob {
            job_name: "standard-a-1-0badc0de".to_string(),
            backend: BackendKind::StandardAsr,
            status: JobStatus::InProgress,
            language_code: "fr-FR".to_string(),
            output_location: None,
            transcript: None,
            entities: Vec::new(),
            started_at: Utc::now(),
        };
        let err = client(&server)
            .record_job(&SessionKey::Session("s-missing".to_string()), &job)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_note_row_leaves_key_to_datastore() {
        let row = note_row(&generated(), "p-1");
        assert!(row.get("id").is_none());
        assert_eq!(row["session_id"], "s-1");
        assert_eq!(row["provider_id"], "p-1");
        assert_eq!(note_row(&generated(), "  ")["provider_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_upsert_note_without_rows_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server
            .mock("POST", "/rest/v1/clinical_notes")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body("[]")
            .create_async()
            .await;

        let err = client(&server).upsert_note(&generated(), "p-1").await.unwrap_err();
        assert_eq!(err.error_code(), "DatastoreError");
    }

    #[tokio::test]
    async fn test_upsert_note_unreadable_rows_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _garbled = server
            .mock("POST", "/rest/v1/clinical_notes")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = client(&server).upsert_note(&generated(), "p-1").await.unwrap_err();
        assert_eq!(err.error_code(), "DatastoreError");
        assert!(err.to_string().contains("unreadable rows"));
    }

    #[tokio::test]
    async fn test_upsert_note_returns_stored_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/clinical_notes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("on_conflict".into(), "session_id".into()),
                Matcher::UrlEncoded("select".into(), "id".into()),
            ]))
            .match_header("prefer", "resolution=merge-duplicates,return=representation")
            .match_body(Matcher::PartialJson(json!({"session_id": "s-1", "status": "draft", "provider_id": "p-1"})))
            .with_status(201)
            .with_body(r#"[{"id":"8d0e4c2a-0000-4000-8000-000000000001"}]"#)
            .create_async()
            .await;

        let note_id = client(&server).upsert_note(&generated(), "p-1").await.unwrap();
        assert_eq!(note_id, "8d0e4c2a-0000-4000-8000-000000000001");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_write_is_datastore_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/v1/bedrock_token_usage")
            .with_status(500)
            .with_body("relation does not exist")
            .create_async()
            .await;

        let err = client(&server).record_usage(&generated().usage).await.unwrap_err();
        assert_eq!(err.error_code(), "DatastoreError");
        assert!(err.to_string().contains("relation does not exist"));
    }

    #[tokio::test]
    async fn test_daily_summary_tolerates_nulls() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/v1/bedrock_daily_token_summary")
            .match_query(Matcher::UrlEncoded("usage_date".into(), "eq.2025-03-01".into()))
            .with_status(200)
            .with_body(r#"[{"total_input_tokens":600,"total_output_tokens":400,"total_tokens":null,"total_sessions":3}]"#)
            .create_async()
            .await;

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let usage = client(&server).daily_summary(date).await.unwrap().unwrap();
        assert_eq!(usage.total_tokens, 1000);
        assert_eq!(usage.sessions, 3);
    }

    #[tokio::test]
    async fn test_unknown_provider_has_no_contact() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.p-404".into()),
                Matcher::UrlEncoded("select".into(), "id,fcm_token,display_name".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        assert!(client(&server).provider_contact("p-404").await.unwrap().is_none());
    }
}
