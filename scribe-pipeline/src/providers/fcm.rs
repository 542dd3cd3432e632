//! Firebase Cloud Messaging push gateway (legacy HTTP API)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use error_common::{truncate_chars, PipelineError, PipelineResult};

use super::{http_client, ProviderNotification, PushGateway};

pub struct FcmGateway {
    http: reqwest::Client,
    url: String,
    server_key: SecretString,
    android_channel_id: String,
}

impl FcmGateway {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        server_key: SecretString,
        android_channel_id: impl Into<String>,
    ) -> PipelineResult<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(10))?,
            url: url.into(),
            server_key,
            android_channel_id: android_channel_id.into(),
        })
    }

    fn payload(&self, device_token: &str, notification: &ProviderNotification) -> Value {
        let title = &notification.title;
        let body = &notification.body;
        json!({
            "to": device_token,
            "notification": {
                "title": title,
                "body": body,
                "sound": "default",
                "click_action": "FLUTTER_NOTIFICATION_CLICK"
            },
            "data": notification.data(),
            "android": {
                "priority": "high",
                "notification": {
                    "title": title,
                    "body": body,
                    "sound": "default",
                    "click_action": "FLUTTER_NOTIFICATION_CLICK",
                    "channel_id": self.android_channel_id
                }
            },
            "apns": {
                "headers": {"apns-priority": "10"},
                "payload": {
                    "aps": {
                        "alert": {"title": title, "body": body},
                        "sound": "default",
                        "badge": 1
                    }
                }
            }
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, device_token: &str, notification: &ProviderNotification) -> PipelineResult<()> {
        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("key={}", self.server_key.expose_secret()))
            .json(&self.payload(device_token, notification))
            .send()
            .await
            .map_err(|e| PipelineError::notification(format!("push request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::notification(format!(
                "push rejected {status}: {}",
                truncate_chars(&error_text, 200)
            )));
        }

        debug!(kind = notification.kind, recipient = %notification.recipient_id, "Push notification sent");
        Ok(())
    }
}
