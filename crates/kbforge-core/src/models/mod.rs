//! Data models for the ingestion pipeline and the content library
//!
//! Each sub-module represents one feature area; everything is re-exported here.

mod content;
mod library;
mod mail;
mod upload;

// Re-export all models for convenient imports
pub use content::*;
pub use library::*;
pub use mail::*;
pub use upload::*;
