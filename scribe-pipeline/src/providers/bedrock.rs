//! Anthropic models on AWS Bedrock

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use error_common::{codes, PipelineError, PipelineResult};

use super::{ModelClient, ModelReply, ModelRequest};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

const THROTTLING_MARKERS: &[&str] = &["throttlingexception", "too many tokens per day", "quota exceeded"];

/// True when an error text reports rate limiting or an exhausted quota.
pub fn mentions_throttling(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    THROTTLING_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn request_body(request: &ModelRequest) -> Value {
    let mut body = json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": request.max_tokens,
        "messages": [
            {"role": "user", "content": request.user_message}
        ]
    });
    if let Some(system) = &request.system {
        body["system"] = Value::String(system.clone());
    }
    body
}

fn parse_reply(raw: &[u8]) -> PipelineResult<ModelReply> {
    let response: MessagesResponse = serde_json::from_slice(raw).map_err(|e| {
        PipelineError::malformed(
            codes::generation::INVALID_MODEL_RESPONSE,
            format!("model response is not a messages payload: {e}"),
            &String::from_utf8_lossy(raw),
        )
    })?;

    Ok(ModelReply {
        text: response.content.into_iter().find_map(|block| block.text),
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    })
}

pub struct BedrockModelClient {
    client: Client,
}

impl BedrockModelClient {
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
impl ModelClient for BedrockModelClient {
    async fn invoke(&self, request: &ModelRequest) -> PipelineResult<ModelReply> {
        let body = serde_json::to_vec(&request_body(request))?;
        debug!(model = %request.model_id, prompt_chars = request.user_message.len(), "Invoking model");

        let output = match self
            .client
            .invoke_model()
            .model_id(&request.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let refused = err
                    .as_service_error()
                    .is_some_and(|e| e.is_throttling_exception() || e.is_service_quota_exceeded_exception());
                let message = DisplayErrorContext(err).to_string();
                if refused || mentions_throttling(&message) {
                    warn!(model = %request.model_id, "Model call throttled");
                    return Err(PipelineError::throttled(message));
                }
                return Err(PipelineError::model(message));
            }
        };

        parse_reply(output.body().as_ref())
    }
}
