//! Pipeline assembly
//!
//! [`Pipeline::from_config`] binds every port to its production adapter.
//! [`Pipeline::from_ports`] takes the ports ready-made, which is how tests and
//! alternative deployments supply their own collaborators.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::{info, warn};

use config_engine::PipelineConfig;
use error_common::PipelineResult;

use crate::callback::CallbackHandler;
use crate::entities::EntityExtractor;
use crate::finalize::NoteFinalizer;
use crate::generation::{GeneratorSettings, SoapGenerator};
use crate::providers::bedrock::BedrockModelClient;
use crate::providers::documents::StorageFetcher;
use crate::providers::fcm::FcmGateway;
use crate::providers::s3::S3ObjectStore;
use crate::providers::sqs::SqsRetryQueue;
use crate::providers::supabase::SupabaseClient;
use crate::providers::transcribe::TranscribeBackend;
use crate::providers::whisper::WhisperBackend;
use crate::providers::{
    aws_sdk_config, DocumentFetcher, GenericSpeechBackend, ModelClient, NoteStore, NotificationStore, ObjectStore,
    PushGateway, RetryQueue, SpeechBackend, TranscriptStore, UsageStore,
};
use crate::retry::RetryProcessor;
use crate::router::{RouterSettings, TranscriptionRouter};
use crate::usage::UsageMonitor;

/// One implementation per collaborator
#[derive(Clone)]
pub struct PipelinePorts {
    pub speech: Arc<dyn SpeechBackend>,
    pub generic_speech: Arc<dyn GenericSpeechBackend>,
    pub objects: Arc<dyn ObjectStore>,
    pub documents: Arc<dyn DocumentFetcher>,
    pub model: Arc<dyn ModelClient>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub notes: Arc<dyn NoteStore>,
    pub usage: Arc<dyn UsageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    /// `None` stores notifications without pushing them
    pub push: Option<Arc<dyn PushGateway>>,
    /// `None` reports throttled requests without queueing them
    pub retry_queue: Option<Arc<dyn RetryQueue>>,
}

/// Every stage, wired and ready to handle events
pub struct Pipeline {
    pub router: TranscriptionRouter,
    pub callbacks: CallbackHandler,
    pub generator: Arc<SoapGenerator>,
    pub finalizer: Arc<NoteFinalizer>,
    pub retry: RetryProcessor,
    pub usage: UsageMonitor,
    pub(crate) retry_queue: Option<Arc<dyn RetryQueue>>,
}

impl Pipeline {
    pub fn from_ports(ports: PipelinePorts, config: &PipelineConfig) -> Self {
        let extractor = Arc::new(EntityExtractor::from_config(Arc::clone(&ports.model), config));

        let generator = Arc::new(
            SoapGenerator::new(Arc::clone(&ports.model), GeneratorSettings::from_config(config))
                .with_usage_store(Arc::clone(&ports.usage)),
        );

        let mut finalizer = NoteFinalizer::new(Arc::clone(&ports.notes));
        if config.notifications.enabled {
            finalizer = finalizer.with_notifications(Arc::clone(&ports.notifications), ports.push.clone());
        }
        let finalizer = Arc::new(finalizer);

        Self {
            router: TranscriptionRouter::new(
                Arc::clone(&ports.speech),
                ports.generic_speech,
                ports.objects,
                Arc::clone(&ports.transcripts),
                Arc::clone(&extractor),
                RouterSettings::from_config(config),
            ),
            callbacks: CallbackHandler::new(ports.speech, ports.documents, ports.transcripts, extractor),
            retry: RetryProcessor::new(Arc::clone(&generator), config.generation.max_retry_attempts)
                .with_finalizer(Arc::clone(&finalizer)),
            generator,
            finalizer,
            usage: UsageMonitor::new(ports.usage, config.usage.clone()),
            retry_queue: ports.retry_queue,
        }
    }

    /// Builds the production adapters.
    ///
    /// # Errors
    ///
    /// Fails when the datastore credentials are missing or an HTTP client
    /// cannot be built.
    pub async fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let aws = aws_sdk_config(&config.aws.region).await;
        let bedrock = if config.bedrock.region == config.aws.region {
            aws.clone()
        } else {
            aws_sdk_config(&config.bedrock.region).await
        };

        let supabase = Arc::new(SupabaseClient::from_config(&config.supabase)?);
        let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&aws));

        let whisper_key = config.whisper.api_key.clone().unwrap_or_else(|| {
            warn!("whisper.api_key not set, generic transcription will be rejected");
            SecretString::new(String::new())
        });
        let generic_speech = Arc::new(WhisperBackend::new(
            &config.whisper.api_url,
            whisper_key,
            &config.whisper.model,
            Duration::from_secs(config.whisper.timeout_secs),
        )?);

        let push: Option<Arc<dyn PushGateway>> = match &config.notifications.fcm_server_key {
            Some(key) if config.notifications.enabled => Some(Arc::new(FcmGateway::new(
                &config.notifications.fcm_url,
                key.clone(),
                &config.notifications.android_channel_id,
            )?)),
            _ => None,
        };

        let retry_queue: Option<Arc<dyn RetryQueue>> = match config.queue.retry_queue_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Some(Arc::new(SqsRetryQueue::new(&aws, url))),
            _ => {
                warn!("queue.retry_queue_url not set, throttled requests will not be queued");
                None
            }
        };

        info!(
            region = %config.aws.region,
            bedrock_region = %config.bedrock.region,
            push = push.is_some(),
            "Pipeline adapters initialized"
        );

        let ports = PipelinePorts {
            speech: Arc::new(TranscribeBackend::new(&aws)),
            generic_speech,
            documents: Arc::new(StorageFetcher::new(Arc::clone(&objects))?),
            objects,
            model: Arc::new(BedrockModelClient::new(&bedrock)),
            transcripts: supabase.clone(),
            notes: supabase.clone(),
            usage: supabase.clone(),
            notifications: supabase,
            push,
            retry_queue,
        };
        Ok(Self::from_ports(ports, config))
    }
}
