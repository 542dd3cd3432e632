//! Persisting generated notes and telling the provider
//!
//! Only the note upsert is critical. Token tracking, the session link and the
//! provider notification are logged and swallowed on failure so a stored note
//! is never reported as a failed generation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use error_common::{codes, PipelineError, PipelineResult};

use crate::model::GeneratedSoap;
use crate::providers::{NoteStore, NotificationStore, ProviderNotification, PushGateway};

/// Chief complaint placeholder for notifications without a note
const GENERIC_SUBJECT: &str = "the consultation";

/// Provider-facing notification kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    Generated { note_id: String, chief_complaint: String },
    Pending,
    Failed,
}

impl NoteEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "soap_generated",
            Self::Pending => "soap_pending",
            Self::Failed => "soap_error",
        }
    }

    fn action(&self) -> Option<&'static str> {
        match self {
            Self::Generated { .. } => Some("review_soap"),
            Self::Pending => None,
            Self::Failed => Some("retry_soap"),
        }
    }

    fn title_and_body(&self) -> (&'static str, String) {
        match self {
            Self::Generated { chief_complaint, .. } => {
                let subject = if chief_complaint.trim().is_empty() {
                    GENERIC_SUBJECT
                } else {
                    chief_complaint.trim()
                };
                (
                    "SOAP Note Ready",
                    format!("Your clinical SOAP note for {subject} is ready for review"),
                )
            }
            Self::Pending => (
                "SOAP Generation In Progress",
                format!("Generating clinical SOAP note for {GENERIC_SUBJECT}..."),
            ),
            Self::Failed => (
                "SOAP Generation Failed",
                format!("Failed to generate SOAP note for {GENERIC_SUBJECT}. Please try again."),
            ),
        }
    }

    fn note_id(&self) -> Option<String> {
        match self {
            Self::Generated { note_id, .. } => Some(note_id.clone()),
            Self::Pending | Self::Failed => None,
        }
    }
}

/// Result of a finalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedNote {
    pub note_id: String,
    pub session_id: String,
    pub notified: bool,
}

struct Notifier {
    store: Arc<dyn NotificationStore>,
    push: Option<Arc<dyn PushGateway>>,
}

pub struct NoteFinalizer {
    notes: Arc<dyn NoteStore>,
    notifier: Option<Notifier>,
}

impl NoteFinalizer {
    pub fn new(notes: Arc<dyn NoteStore>) -> Self {
        Self { notes, notifier: None }
    }

    /// Enables provider notifications; without a push gateway they are only stored.
    pub fn with_notifications(mut self, store: Arc<dyn NotificationStore>, push: Option<Arc<dyn PushGateway>>) -> Self {
        self.notifier = Some(Notifier { store, push });
        self
    }

    /// Stores the note for its session and runs the non-critical follow-ups.
    ///
    /// # Errors
    ///
    /// Fails on a blank provider id or when the note upsert fails.
    pub async fn finalize(&self, generated: &GeneratedSoap, provider_id: &str) -> PipelineResult<FinalizedNote> {
        if provider_id.trim().is_empty() {
            return Err(PipelineError::validation(
                codes::validation::INVALID_INPUT,
                "providerId is required to store a note",
            ));
        }

        let note = &generated.note;
        let note_id = self.notes.upsert_note(generated, provider_id).await?;
        info!(session_id = %note.session_id, note_id = %note_id, model = %note.model, "Clinical note stored");

        if let Err(err) = self.notes.record_token_tracking(&generated.usage, &note_id).await {
            warn!(session_id = %note.session_id, error = %err, "Token tracking not recorded");
        }
        if let Err(err) = self.notes.link_note_to_session(&note.session_id, &note_id).await {
            warn!(session_id = %note.session_id, error = %err, "Note not linked to session");
        }

        let event = NoteEvent::Generated {
            note_id: note_id.clone(),
            chief_complaint: note.sections.chief_complaint.clone(),
        };
        let notified = self
            .notify(provider_id, &note.session_id, &note.appointment_id, &event)
            .await;

        Ok(FinalizedNote {
            note_id,
            session_id: note.session_id.clone(),
            notified,
        })
    }

    /// Best-effort provider notification; returns whether a push was sent.
    pub async fn notify(&self, provider_id: &str, session_id: &str, appointment_id: &str, event: &NoteEvent) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };

        let contact = match notifier.store.provider_contact(provider_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                warn!(provider_id, "Provider not found, skipping notification");
                return false;
            }
            Err(err) => {
                warn!(provider_id, error = %err, "Provider lookup failed, skipping notification");
                return false;
            }
        };

        let (title, body) = event.title_and_body();
        let notification = ProviderNotification {
            recipient_id: contact.id.clone(),
            kind: event.kind(),
            title: title.to_string(),
            body,
            session_id: session_id.to_string(),
            appointment_id: appointment_id.to_string(),
            note_id: event.note_id(),
            action: event.action(),
        };

        if let Err(err) = notifier.store.store_notification(&notification).await {
            warn!(provider_id, kind = notification.kind, error = %err, "Notification record not stored");
        }

        let (Some(push), Some(token)) = (&notifier.push, contact.fcm_token.as_deref().filter(|t| !t.is_empty())) else {
            debug!(provider_id, "No push channel for provider");
            return false;
        };
        match push.send(token, &notification).await {
            Ok(()) => true,
            Err(err) => {
                warn!(provider_id, kind = notification.kind, error = %err, "Push notification failed");
                false
            }
        }
    }
}
