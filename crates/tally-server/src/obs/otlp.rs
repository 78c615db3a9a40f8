//! OTLP/HTTP span export.
//!
//! A `tracing-opentelemetry` layer feeds finished spans into an SDK batch
//! processor, which ships protobuf batches to `{endpoint}/v1/traces` from a
//! background tokio task. Handlers never wait on the collector: when the
//! queue is full, spans are dropped by the processor.

use std::time::Duration;

use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;

use crate::config::TracingSection;

/// Queue depth between span close and the export task.
pub const MAX_QUEUE_SIZE: usize = 2048;

/// Spans per export request.
pub const MAX_EXPORT_BATCH: usize = 512;

/// Time between scheduled exports.
pub const SCHEDULE_DELAY: Duration = Duration::from_secs(5);

const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the final flush during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

const SCOPE_NAME: &str = "tally-server";

/// `{endpoint}/v1/traces`, tolerating a trailing slash.
pub fn traces_url(endpoint: &str) -> String {
    format!("{}/v1/traces", endpoint.trim_end_matches('/'))
}

/// Identity attached to every exported span.
pub fn resource(cfg: &TracingSection) -> Resource {
    Resource::new([
        KeyValue::new("service.name", cfg.service_name.clone()),
        KeyValue::new("deployment.environment", cfg.environment.clone()),
    ])
}

/// Batch pipeline to the collector at `endpoint`. Needs a tokio runtime.
pub fn tracer_provider(endpoint: &str, cfg: &TracingSection) -> Result<TracerProvider, TraceError> {
    let exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(traces_url(endpoint))
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    let batch = BatchConfigBuilder::default()
        .with_max_queue_size(MAX_QUEUE_SIZE)
        .with_max_export_batch_size(MAX_EXPORT_BATCH)
        .with_scheduled_delay(SCHEDULE_DELAY)
        .build();
    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch)
        .build();

    Ok(TracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource(cfg))
        .build())
}

/// `tracing` layer that turns closed spans into OpenTelemetry spans.
pub fn layer<S>(provider: &TracerProvider) -> OpenTelemetryLayer<S, Tracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(SCOPE_NAME))
}

/// Flush and stop the pipeline. The SDK call blocks, so it runs off the
/// async workers.
pub async fn shutdown(provider: TracerProvider) {
    let flush = tokio::task::spawn_blocking(move || provider.shutdown());
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, flush).await {
        Ok(Ok(Ok(()))) => tracing::debug!("span exporter flushed"),
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "span exporter shutdown failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "span exporter shutdown task failed"),
        Err(_) => tracing::warn!("span exporter did not finish flushing before shutdown timeout"),
    }
}
