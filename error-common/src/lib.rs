//! Common error handling for the clinical scribe pipeline
//!
//! Every pipeline stage reports failures through [`PipelineError`]. The variants
//! follow the pipeline's failure taxonomy rather than the collaborator that
//! produced them:
//!
//! - **Validation**: malformed or missing input, never retried (400)
//! - **Throttled**: the generative model refused for rate or quota reasons, the
//!   only retryable class (429)
//! - **MalformedOutput**: a collaborator answered but the answer is unusable,
//!   carries a bounded excerpt for diagnosis (500)
//! - **Collaborator**: a database, storage, speech or push call failed (500)
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, PipelineError, PipelineResult};
//!
//! fn require_session(session_id: Option<&str>) -> PipelineResult<&str> {
//!     session_id
//!         .filter(|id| !id.trim().is_empty())
//!         .ok_or_else(|| PipelineError::validation(codes::validation::MISSING_SESSION_ID, "sessionId is required"))
//! }
//!
//! let err = require_session(None).unwrap_err();
//! assert_eq!(err.status_code(), 400);
//! assert!(!err.is_retryable());
//! ```

pub mod codes;
pub mod reporting;
pub mod types;

pub use reporting::*;
pub use types::*;
