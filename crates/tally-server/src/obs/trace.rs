//! Log output and optional span export.
//!
//! Spans are plain `tracing` spans. The request middleware and the store
//! decorator tag them with `otel.name`, `otel.kind` and `otel.status_code`,
//! which the OpenTelemetry layer maps onto exported spans and the log
//! formatter simply prints.
//!
//! [`install`] always sets up the `fmt` layer under an `EnvFilter`
//! (`RUST_LOG`, default `info`). The OTLP layer is added only when the `otlp`
//! feature is compiled in and a collector endpoint is configured; otherwise no
//! export layer exists and spans cost what any `tracing` span costs.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TracingSection;

/// `otel.kind` of the span opened around each HTTP request.
pub const KIND_SERVER: &str = "server";
/// `otel.kind` of the spans opened around store calls.
pub const KIND_CLIENT: &str = "client";

/// `otel.status_code` values understood by the export layer.
pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

/// Handle on the installed export pipeline. Flushes on [`Telemetry::shutdown`].
#[derive(Default)]
pub struct Telemetry {
    #[cfg(feature = "otlp")]
    provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl Telemetry {
    /// Flush buffered spans; called once on graceful shutdown.
    pub async fn shutdown(self) {
        #[cfg(feature = "otlp")]
        if let Some(provider) = self.provider {
            crate::obs::otlp::shutdown(provider).await;
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for this process.
///
/// `cfg` is `None` when configuration failed to load; logging still comes up
/// so the failure can be reported.
pub fn install(cfg: Option<&TracingSection>) -> Telemetry {
    let target = cfg.and_then(|c| c.active_endpoint().map(|endpoint| (c, endpoint)));
    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer());

    #[cfg(feature = "otlp")]
    {
        let built = target.map(|(cfg, endpoint)| {
            (
                endpoint,
                cfg,
                crate::obs::otlp::tracer_provider(endpoint, cfg),
            )
        });
        let provider = match &built {
            Some((_, _, Ok(provider))) => Some(provider.clone()),
            _ => None,
        };
        registry
            .with(provider.as_ref().map(crate::obs::otlp::layer))
            .init();

        match built {
            Some((endpoint, cfg, Ok(_))) => tracing::info!(
                endpoint,
                service = %cfg.service_name,
                environment = %cfg.environment,
                "span export enabled"
            ),
            Some((endpoint, _, Err(e))) => {
                tracing::warn!(endpoint, error = %e, "span exporter setup failed; spans stay local")
            }
            None => tracing::debug!("span export disabled (no collector endpoint or OTEL_ENABLED off)"),
        }
        Telemetry { provider }
    }

    #[cfg(not(feature = "otlp"))]
    {
        registry.init();
        match target {
            Some((_, endpoint)) => {
                tracing::debug!(endpoint, "span export not compiled in (feature `otlp`)")
            }
            None => tracing::debug!("span export disabled (no collector endpoint or OTEL_ENABLED off)"),
        }
        Telemetry::default()
    }
}
