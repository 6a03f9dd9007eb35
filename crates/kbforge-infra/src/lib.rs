//! KBForge Infrastructure Library
//!
//! Shared infrastructure used by the KBForge binaries:
//! - Telemetry initialization
//! - Notification gateway for terminal pipeline events

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod notify;

#[cfg(feature = "observability-basic")]
pub use telemetry::init_telemetry;

pub use notify::{
    GenerationEvent, LogNotifier, Notification, NotificationCapability, NotificationCategory,
    NotificationGateway, NotificationPermission, NotifyOutcome,
};
