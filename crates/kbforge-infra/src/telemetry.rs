use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter, which is `debug` for the KBForge
/// crates and `warn` for everything else.
pub fn init_telemetry(service_name: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,kbforge=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(feature = "observability-json")]
    registry
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;

    #[cfg(not(feature = "observability-json"))]
    registry
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    tracing::info!(service = service_name, "Telemetry initialized");
    Ok(())
}
