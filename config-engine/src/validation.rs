// Range checks run after extraction
use crate::error::{ConfigError, Result};
use crate::settings::PipelineConfig;

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let usage = &self.usage;
        if usage.daily_token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "usage.daily_token_limit must be positive".to_string(),
            ));
        }
        let thresholds_ordered = 0.0 < usage.warning_threshold
            && usage.warning_threshold < usage.critical_threshold
            && usage.critical_threshold <= 1.0;
        if !thresholds_ordered {
            return Err(ConfigError::ValidationError(format!(
                "usage thresholds must satisfy 0 < warning ({}) < critical ({}) <= 1",
                usage.warning_threshold, usage.critical_threshold
            )));
        }
        if self.generation.max_retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.bedrock.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "bedrock.max_tokens must be positive".to_string(),
            ));
        }
        if self.aws.output_bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "aws.output_bucket must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let mut config = PipelineConfig::default();
        config.usage.warning_threshold = 0.97;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_percent_style_threshold_is_rejected() {
        let mut config = PipelineConfig::default();
        config.usage.critical_threshold = 95.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_budget_is_rejected() {
        let mut config = PipelineConfig::default();
        config.generation.max_retry_attempts = 0;
        assert!(config.validate().is_err());
    }
}
