//! Object storage on S3

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use error_common::{PipelineError, PipelineResult};

use super::ObjectStore;
use crate::media::ObjectLocation;

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, location: &ObjectLocation) -> PipelineResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| PipelineError::storage(format!("get {location}: {}", DisplayErrorContext(e))))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::storage(format!("read {location}: {e}")))?
            .into_bytes();

        debug!(location = %location, size = bytes.len(), "Downloaded object");
        Ok(bytes.to_vec())
    }

    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| PipelineError::storage(format!("put {location}: {}", DisplayErrorContext(e))))?;

        debug!(location = %location, size, "Uploaded object");
        Ok(())
    }
}
