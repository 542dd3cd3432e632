// Pipeline settings, one struct per collaborator
use logger_redacted::LoggerConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Immutable configuration shared by every pipeline stage
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub supabase: SupabaseConfig,
    pub aws: AwsConfig,
    pub whisper: WhisperConfig,
    pub bedrock: BedrockConfig,
    pub generation: GenerationConfig,
    pub queue: QueueConfig,
    pub usage: UsageConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggerConfig,
}

/// Supabase REST access
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: Option<SecretString>,
    pub timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_key: None,
            timeout_secs: 10,
        }
    }
}

impl SupabaseConfig {
    /// # Errors
    ///
    /// Fails when the URL or service key is not configured.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingSetting("supabase.url"));
        }
        let key = self
            .service_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingSetting("supabase.service_key"))?;
        Ok((self.url.trim_end_matches('/'), key))
    }
}

/// AWS speech and storage settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    /// Bucket receiving transcription output
    pub output_bucket: String,
    pub medical_vocabulary: Option<String>,
    pub standard_vocabulary: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "eu-central-1".to_string(),
            output_bucket: "medzen-transcriptions".to_string(),
            medical_vocabulary: None,
            standard_vocabulary: None,
        }
    }
}

/// Generic speech backend (Whisper-compatible HTTP API)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Generative model settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    pub primary_model: String,
    pub fallback_model: String,
    /// Model used for entity extraction side calls
    pub extraction_model: String,
    pub max_tokens: u32,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            primary_model: "us.anthropic.claude-opus-4-5-20251101-v1:0".to_string(),
            fallback_model: "us.anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            extraction_model: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enable_fallback: bool,
    /// Replays at or beyond this count are dropped
    pub max_retry_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            max_retry_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub retry_queue_url: Option<String>,
}

/// Daily token budget, thresholds are fractions of the limit
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub daily_token_limit: u64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            daily_token_limit: 10_000_000,
            warning_threshold: 0.80,
            critical_threshold: 0.95,
        }
    }
}

/// Push notifications to providers
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub fcm_url: String,
    pub fcm_server_key: Option<SecretString>,
    pub android_channel_id: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fcm_url: "https://fcm.googleapis.com/fcm/send".to_string(),
            fcm_server_key: None,
            android_channel_id: "medzen_default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{providers::{Env, Format, Toml}, Figment, Jail};

    use crate::providers::{sources, ENV_PREFIX};

    #[test]
    fn test_defaults_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = PipelineConfig::from_figment(&Figment::new()).map_err(|e| e.to_string())?;
            assert!(config.generation.enable_fallback);
            assert_eq!(config.generation.max_retry_attempts, 5);
            assert_eq!(config.usage.daily_token_limit, 10_000_000);
            assert_eq!(config.aws.output_bucket, "medzen-transcriptions");
            assert_eq!(config.supabase.timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scribe.toml",
                r#"
                [generation]
                enable_fallback = true
                max_retry_attempts = 3

                [supabase]
                url = "https://example.supabase.co/"
                service_key = "file-key"
                "#,
            )?;
            jail.set_env("SCRIBE_GENERATION__ENABLE_FALLBACK", "false");
            jail.set_env("SCRIBE_QUEUE__RETRY_QUEUE_URL", "https://sqs.example/queue");

            let config = PipelineConfig::load(Some("scribe.toml".as_ref())).map_err(|e| e.to_string())?;
            assert!(!config.generation.enable_fallback);
            assert_eq!(config.generation.max_retry_attempts, 3);
            assert_eq!(config.queue.retry_queue_url.as_deref(), Some("https://sqs.example/queue"));

            let (url, key) = config.supabase.credentials().map_err(|e| e.to_string())?;
            assert_eq!(url, "https://example.supabase.co");
            assert_eq!(key, "file-key");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_is_supported() {
        Jail::expect_with(|jail| {
            jail.create_file("scribe.yaml", "usage:\n  daily_token_limit: 2000\n")?;
            let config = PipelineConfig::from_figment(&sources(Some("scribe.yaml".as_ref())))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.usage.daily_token_limit, 2000);
            Ok(())
        });
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let config = PipelineConfig::default();
        assert!(matches!(
            config.supabase.credentials(),
            Err(ConfigError::MissingSetting("supabase.url"))
        ));
    }

    #[test]
    fn test_secrets_are_not_printed() {
        Jail::expect_with(|jail| {
            jail.set_env("SCRIBE_WHISPER__API_KEY", "sk-very-secret");
            let figment = Figment::new()
                .merge(Toml::string(""))
                .merge(Env::prefixed(ENV_PREFIX).split("__"));
            let config = PipelineConfig::from_figment(&figment).map_err(|e| e.to_string())?;
            assert!(!format!("{config:?}").contains("sk-very-secret"));
            Ok(())
        });
    }
}
