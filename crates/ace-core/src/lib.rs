//! Data model, closed error type, configuration, credential-store seam,
//! metrics, and the small text helpers shared by every other ACE crate.
//!
//! This crate has no I/O of its own beyond config-file and metrics
//! exposition; it is the vocabulary the rest of the orchestrator shares.

pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod model;
pub mod refusal;
pub mod text;

pub use config::AceConfig;
pub use error::AceError;
