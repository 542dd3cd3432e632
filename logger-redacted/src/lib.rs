//! Structured logging with PHI/PII redaction
//!
//! Transcripts and model output routinely contain patient names, phone numbers
//! and record numbers. Anything derived from them goes through [`log_excerpt`]
//! (or a [`PiiRedactor`]) before it reaches a log line. Everything else is
//! logged with plain `tracing` structured fields.
//!
//! # Detected Data Types
//!
//! - **Email Addresses**: `EMAIL[hash]`
//! - **Phone Numbers**: `PHONE[hash]`
//! - **SSN**: `SSN[hash]`
//! - **Credit Cards**: `CC[hash]`
//! - **IP Addresses**: `IP[hash]`
//! - **Medical Record Numbers**: `MRN[hash]`
//!
//! Hashes are the first bytes of a SHA-256 digest so the same value can be
//! correlated across log lines without being revealed.
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_tracing, log_excerpt, LoggerConfig};
//!
//! init_tracing(&LoggerConfig::default()).ok();
//! tracing::info!(excerpt = %log_excerpt("Call me at (555) 123-4567", 80), "Transcript received");
//! ```

pub mod config;
pub mod redactor;
pub mod subscriber;

pub use config::*;
pub use redactor::*;
pub use subscriber::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid redaction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}
