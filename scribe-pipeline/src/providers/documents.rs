//! Result document download
//!
//! Backends report their output either as an object storage URI or as an
//! HTTP(S) link. Object storage links go through [`ObjectStore`] so they are
//! fetched with the pipeline's credentials; any other link is fetched
//! directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use error_common::{PipelineError, PipelineResult};

use super::{http_client, DocumentFetcher, ObjectStore};
use crate::media::ObjectLocation;

pub struct StorageFetcher {
    objects: Arc<dyn ObjectStore>,
    http: reqwest::Client,
}

impl StorageFetcher {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(objects: Arc<dyn ObjectStore>) -> PipelineResult<Self> {
        Ok(Self {
            objects,
            http: http_client(Duration::from_secs(60))?,
        })
    }
}

#[async_trait]
impl DocumentFetcher for StorageFetcher {
    async fn fetch(&self, uri: &str) -> PipelineResult<Vec<u8>> {
        if let Ok(location) = ObjectLocation::parse(uri) {
            return self.objects.get_object(&location).await;
        }

        if !(uri.starts_with("https://") || uri.starts_with("http://")) {
            return Err(PipelineError::storage(format!("unsupported document URI: {uri}")));
        }

        debug!(uri, "Fetching document over HTTP");
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| PipelineError::storage(format!("document request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::storage(format!("document download returned {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::storage(format!("document body unreadable: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockObjectStore;

    #[tokio::test]
    async fn test_object_uris_use_object_store() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_get_object()
            .withf(|location| location.bucket == "medzen-transcriptions" && location.key == "transcriptions/a1/doc.json")
            .times(1)
            .returning(|_| Ok(b"{}".to_vec()));

        let fetcher = StorageFetcher::new(Arc::new(objects)).unwrap();
        let body = fetcher
            .fetch("https://s3.eu-central-1.amazonaws.com/medzen-transcriptions/transcriptions/a1/doc.json")
            .await
            .unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_other_links_use_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/signed/doc.json")
            .with_status(200)
            .with_body(r#"{"results":{}}"#)
            .create_async()
            .await;

        let fetcher = StorageFetcher::new(Arc::new(MockObjectStore::new())).unwrap();
        let body = fetcher.fetch(&format!("{}/signed/doc.json", server.url())).await.unwrap();
        assert_eq!(body, br#"{"results":{}}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_download_is_storage_error() {
        let mut server = mockito::Server::new_async().await;
        let _expired = server.mock("GET", "/expired.json").with_status(403).create_async().await;

        let fetcher = StorageFetcher::new(Arc::new(MockObjectStore::new())).unwrap();
        let err = fetcher.fetch(&format!("{}/expired.json", server.url())).await.unwrap_err();
        assert_eq!(err.error_code(), "StorageError");

        let err = fetcher.fetch("ftp://host/doc.json").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
