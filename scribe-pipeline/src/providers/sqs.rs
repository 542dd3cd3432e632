//! Retry queue on SQS

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use tracing::info;

use error_common::{PipelineError, PipelineResult};

use super::RetryQueue;
use crate::model::QueuedRequest;

pub struct SqsRetryQueue {
    client: Client,
    queue_url: String,
}

impl SqsRetryQueue {
    pub fn new(sdk_config: &SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl RetryQueue for SqsRetryQueue {
    async fn enqueue(&self, request: &QueuedRequest) -> PipelineResult<()> {
        let body = serde_json::to_string(request)?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| PipelineError::queue(DisplayErrorContext(e).to_string()))?;

        info!(
            message_id = output.message_id().unwrap_or_default(),
            session_id = request.event.session_id.as_deref().unwrap_or_default(),
            retry_count = request.retry_count,
            "Queued generation request for retry"
        );
        Ok(())
    }
}
