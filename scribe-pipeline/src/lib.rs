//! Clinical scribe pipeline
//!
//! Turns recorded telemedicine calls into draft SOAP notes:
//!
//! 1. [`router`] normalizes the caller's language, picks a speech backend and
//!    starts (or for the generic backend, performs) transcription.
//! 2. [`callback`] reacts to asynchronous job completion, extracts segments
//!    and medical entities and stores the transcript.
//! 3. [`generation`] prompts the generative model for a structured note,
//!    falling back to a second model once when the first is throttled.
//! 4. [`retry`] replays throttled requests from the retry queue, bounded by
//!    a maximum attempt count.
//!
//! [`finalize`] and [`usage`] cover note persistence, provider notifications
//! and daily token budgets. [`handlers`] exposes each stage as a JSON event
//! handler, and [`service::Pipeline`] wires everything from a
//! [`config_engine::PipelineConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::PipelineConfig;
//! use scribe_pipeline::service::Pipeline;
//! use serde_json::json;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PipelineConfig::load(None)?;
//! let pipeline = Pipeline::from_config(&config).await?;
//!
//! let response = pipeline
//!     .handle_route(json!({
//!         "s3_uri": "s3://recordings/appointments/visit.webm",
//!         "appointment_id": "5b0c1f7e-2d4a-4f8e-9a61-3c2b7d9e0f11",
//!         "language_code": "Fulfulde"
//!     }))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod entities;
pub mod finalize;
pub mod generation;
pub mod handlers;
pub mod job_name;
pub mod language;
pub mod media;
pub mod model;
pub mod providers;
pub mod retry;
pub mod router;
pub mod service;
pub mod transcript;
pub mod usage;

pub use error_common::{PipelineError, PipelineResult};
pub use handlers::HandlerResponse;
pub use service::{Pipeline, PipelinePorts};
