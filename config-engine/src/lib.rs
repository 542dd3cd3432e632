//! Layered configuration for the clinical scribe pipeline
//!
//! Configuration is read once at startup into an immutable [`PipelineConfig`]
//! and handed to each component at construction. Sources, lowest precedence
//! first:
//!
//! - **Defaults**: every setting has a working default except credentials
//! - **File**: an optional TOML or YAML file
//! - **Environment**: `SCRIBE_`-prefixed variables, `__` separates sections
//!   (`SCRIBE_GENERATION__ENABLE_FALLBACK=false`)
//!
//! Credentials are held as [`secrecy::SecretString`] and never appear in
//! `Debug` output.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::PipelineConfig;
//!
//! # fn main() -> Result<(), config_engine::ConfigError> {
//! let config = PipelineConfig::load(Some("scribe.toml".as_ref()))?;
//! assert!(config.generation.max_retry_attempts > 0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod providers;
pub mod settings;
pub mod validation;

pub use error::*;
pub use settings::*;
