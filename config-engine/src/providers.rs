// Configuration sources
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};

use crate::error::Result;
use crate::settings::PipelineConfig;

pub const ENV_PREFIX: &str = "SCRIBE_";

/// Builds the layered source stack without extracting it.
pub fn sources(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new();

    if let Some(path) = path {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        figment = if is_yaml {
            figment.merge(Yaml::file(path))
        } else {
            figment.merge(Toml::file(path))
        };
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

impl PipelineConfig {
    /// Loads and validates configuration from defaults, an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] on unparsable values or failed validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&sources(path))
    }

    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] on unparsable values or failed validation.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        tracing::debug!(
            region = %config.aws.region,
            output_bucket = %config.aws.output_bucket,
            enable_fallback = config.generation.enable_fallback,
            max_retry_attempts = config.generation.max_retry_attempts,
            "Configuration loaded"
        );
        Ok(config)
    }
}
