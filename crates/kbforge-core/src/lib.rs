//! kbforge Core Library
//!
//! This crate provides the domain models, error types and configuration that are
//! shared across the ingestion pipeline, the content library and the CLI.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::IngestConfig;
pub use error::{ErrorMetadata, LogLevel, PipelineError};
