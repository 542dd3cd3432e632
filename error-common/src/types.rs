use thiserror::Error;

use crate::codes;

/// Upper bound on the raw collaborator output kept for diagnostics.
pub const MAX_EXCERPT_CHARS: usize = 1000;

/// Failure taxonomy shared by every pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or missing caller input
    #[error("Validation error: {message}")]
    Validation { code: &'static str, message: String },

    /// Rate or quota refusal from the generative model
    #[error("Throttled: {message}")]
    Throttled { code: &'static str, message: String },

    /// A collaborator answered with something we cannot use
    #[error("Malformed output: {message}")]
    MalformedOutput {
        code: &'static str,
        message: String,
        raw_excerpt: String,
    },

    /// A call to an external collaborator failed
    #[error("{service} error: {message}")]
    Collaborator {
        code: &'static str,
        service: &'static str,
        message: String,
    },

    /// A record the stage depends on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Builds a throttling error, distinguishing daily token exhaustion from
    /// plain request-rate throttling.
    pub fn throttled(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = if message.to_lowercase().contains("too many tokens per day") {
            codes::generation::TOKEN_LIMIT_EXCEEDED
        } else {
            codes::generation::BEDROCK_THROTTLED
        };
        Self::Throttled { code, message }
    }

    pub fn malformed(code: &'static str, message: impl Into<String>, raw: &str) -> Self {
        Self::MalformedOutput {
            code,
            message: message.into(),
            raw_excerpt: truncate_chars(raw, MAX_EXCERPT_CHARS),
        }
    }

    pub fn datastore(message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::DATASTORE_FAILED, "supabase", message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::STORAGE_FAILED, "s3", message)
    }

    pub fn transcription(service: &'static str, message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::TRANSCRIPTION_FAILED, service, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::MODEL_FAILED, "bedrock", message)
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::QUEUE_FAILED, "sqs", message)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::collaborator(codes::collaborator::NOTIFICATION_FAILED, "fcm", message)
    }

    fn collaborator(code: &'static str, service: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            code,
            service,
            message: message.into(),
        }
    }

    /// HTTP-style status reported by handler responses
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Throttled { .. } => 429,
            Self::MalformedOutput { .. }
            | Self::Collaborator { .. }
            | Self::ConfigError(_)
            | Self::Serialization(_)
            | Self::Other(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. }
            | Self::Throttled { code, .. }
            | Self::MalformedOutput { code, .. }
            | Self::Collaborator { code, .. } => *code,
            Self::NotFound(_) => codes::system::NOT_FOUND,
            Self::ConfigError(_) => codes::system::CONFIGURATION,
            Self::Serialization(_) => codes::system::SERIALIZATION,
            Self::Other(_) => codes::system::INTERNAL,
        }
    }

    /// Only throttling is worth replaying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Errors that will fail identically on every replay.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::MalformedOutput { .. } | Self::NotFound(_)
        )
    }
}

/// Truncates on character boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            PipelineError::validation(codes::validation::EMPTY_TRANSCRIPT, "empty").status_code(),
            400
        );
        assert_eq!(PipelineError::throttled("slow down").status_code(), 429);
        assert_eq!(PipelineError::datastore("timeout").status_code(), 500);
        assert_eq!(PipelineError::NotFound("session".into()).status_code(), 404);
    }

    #[test]
    fn test_only_throttling_is_retryable() {
        assert!(PipelineError::throttled("ThrottlingException").is_retryable());
        assert!(!PipelineError::model("boom").is_retryable());
        assert!(!PipelineError::malformed(codes::generation::INVALID_JSON_RESPONSE, "bad", "x").is_retryable());
    }

    #[test]
    fn test_daily_token_exhaustion_gets_its_own_code() {
        let err = PipelineError::throttled("Too many tokens per day, please wait");
        assert_eq!(err.error_code(), codes::generation::TOKEN_LIMIT_EXCEEDED);

        let err = PipelineError::throttled("ThrottlingException: rate exceeded");
        assert_eq!(err.error_code(), codes::generation::BEDROCK_THROTTLED);
    }

    #[test]
    fn test_malformed_excerpt_is_bounded() {
        let raw = "é".repeat(MAX_EXCERPT_CHARS + 250);
        match PipelineError::malformed(codes::generation::INVALID_JSON_RESPONSE, "bad json", &raw) {
            PipelineError::MalformedOutput { raw_excerpt, .. } => {
                assert_eq!(raw_excerpt.chars().count(), MAX_EXCERPT_CHARS);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_permanent_errors() {
        assert!(PipelineError::validation(codes::validation::INVALID_INPUT, "x").is_permanent());
        assert!(!PipelineError::queue("down").is_permanent());
        assert!(!PipelineError::throttled("slow").is_permanent());
    }
}
