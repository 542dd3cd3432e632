//! Replay of throttled generation requests
//!
//! Messages are read from the retry queue in batches. Each record ends in one
//! of three buckets: succeeded, dropped (removed without success) or still
//! queued (reported back as a batch item failure so the queue redelivers it
//! after its visibility timeout). The processor never writes to the queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use error_common::PipelineResult;
use logger_redacted::log_excerpt;

use crate::finalize::NoteFinalizer;
use crate::generation::SoapGenerator;
use crate::model::{GeneratedSoap, QueuedRequest};

/// Batch event delivered by the queue trigger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    #[serde(default)]
    pub receipt_handle: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: RecordAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordAttributes {
    #[serde(rename = "ApproximateReceiveCount", default)]
    pub approximate_receive_count: Option<String>,
}

impl QueueRecord {
    /// Deliveries so far, at least one
    pub fn receive_count(&self) -> u32 {
        self.attributes
            .approximate_receive_count
            .as_deref()
            .and_then(|count| count.trim().parse().ok())
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Succeeded,
    Dropped,
    StillQueued,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub dropped: Vec<String>,
    pub still_queued: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial batch response understood by the queue trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchReport {
    fn record(&mut self, message_id: String, disposition: Disposition) {
        match disposition {
            Disposition::Succeeded => self.succeeded.push(message_id),
            Disposition::Dropped => self.dropped.push(message_id),
            Disposition::StillQueued => self.still_queued.push(message_id),
        }
    }

    /// Only still-queued records are returned to the queue.
    pub fn batch_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .still_queued
                .iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.clone(),
                })
                .collect(),
        }
    }
}

pub struct RetryProcessor {
    generator: Arc<SoapGenerator>,
    finalizer: Option<Arc<NoteFinalizer>>,
    max_attempts: u32,
}

impl RetryProcessor {
    pub fn new(generator: Arc<SoapGenerator>, max_attempts: u32) -> Self {
        Self {
            generator,
            finalizer: None,
            max_attempts,
        }
    }

    pub fn with_finalizer(mut self, finalizer: Arc<NoteFinalizer>) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    /// Processes records one after another.
    pub async fn process_batch(&self, batch: &QueueBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for record in &batch.records {
            let disposition = self.process_record(record).await;
            report.record(record.message_id.clone(), disposition);
        }

        info!(
            records = batch.records.len(),
            succeeded = report.succeeded.len(),
            dropped = report.dropped.len(),
            still_queued = report.still_queued.len(),
            "Retry batch processed"
        );
        report
    }

    async fn process_record(&self, record: &QueueRecord) -> Disposition {
        let message_id = record.message_id.as_str();
        let queued: QueuedRequest = match serde_json::from_str(&record.body) {
            Ok(queued) => queued,
            Err(err) => {
                error!(message_id, error = %err, body = %log_excerpt(&record.body, 200), "Unreadable retry message, dropping");
                return Disposition::Dropped;
            }
        };

        let receive_count = record.receive_count();
        let attempts = queued.retry_count.saturating_add(receive_count.saturating_sub(1));
        let session_id = queued.event.session_id.clone().unwrap_or_default();
        if attempts >= self.max_attempts {
            error!(
                message_id,
                session_id = %session_id,
                retry_count = queued.retry_count,
                receive_count,
                max_attempts = self.max_attempts,
                "Retry limit reached, dropping request"
            );
            return Disposition::Dropped;
        }

        info!(
            message_id,
            session_id = %session_id,
            attempt = attempts,
            reason = %queued.reason,
            "Replaying queued generation request"
        );

        let mut request = queued.event;
        request.retry_count = queued.retry_count;
        request.queued_at = request.queued_at.or(Some(queued.queued_at));

        let outcome = match self.generator.generate(&request).await {
            Ok(generated) => self.finalize(&generated, request.metadata.provider_id.as_deref()).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                info!(message_id, session_id = %session_id, "Queued request succeeded");
                Disposition::Succeeded
            }
            Err(err) if err.is_permanent() => {
                error!(message_id, session_id = %session_id, error_code = err.error_code(), error = %err, "Queued request failed permanently, dropping");
                Disposition::Dropped
            }
            Err(err) => {
                warn!(
                    message_id,
                    session_id = %session_id,
                    error_code = err.error_code(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Queued request not completed, leaving on queue"
                );
                Disposition::StillQueued
            }
        }
    }

    async fn finalize(&self, generated: &GeneratedSoap, provider_id: Option<&str>) -> PipelineResult<()> {
        let Some(finalizer) = &self.finalizer else {
            return Ok(());
        };
        match provider_id.filter(|id| !id.trim().is_empty()) {
            Some(provider_id) => finalizer.finalize(generated, provider_id).await.map(|_| ()),
            None => {
                warn!(session_id = %generated.note.session_id, "No provider id on request, note not stored");
                Ok(())
            }
        }
    }
}
