//! Per-request instrumentation middleware.
//!
//! Every request, including `/metrics` itself and unmatched paths, is timed
//! and counted under (method, endpoint, status). The endpoint label is the
//! matched route template so arbitrary paths cannot blow up label cardinality;
//! requests that match no route are counted as `unmatched`.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{field, Instrument};

use crate::app_state::AppState;
use crate::obs::trace::{KIND_SERVER, STATUS_ERROR};

pub const UNMATCHED_ENDPOINT: &str = "unmatched";

pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().as_str().to_owned();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_owned());

    let span = tracing::info_span!(
        "request",
        otel.name = %format!("{method} {endpoint}"),
        otel.kind = KIND_SERVER,
        http.method = %method,
        http.route = %endpoint,
        http.status_code = field::Empty,
        otel.status_code = field::Empty,
    );

    let response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    state
        .metrics()
        .record_request(&method, &endpoint, status.as_u16(), started.elapsed());

    span.record("http.status_code", i64::from(status.as_u16()));
    if status.is_server_error() {
        span.record("otel.status_code", STATUS_ERROR);
    }

    tracing::debug!(
        parent: &span,
        %method,
        %endpoint,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    response
}

#[cfg(all(test, feature = "otlp"))]
mod tests {
    use std::sync::Arc;

    use axum_test::TestServer;
    use opentelemetry::trace::{SpanId, SpanKind, Status};
    use opentelemetry::Value;
    use tally_core::store::CounterStore;
    use tally_core::MemoryCounterStore;

    use crate::config::ServiceConfig;
    use crate::obs::otlp::testing::{attr, Capture};
    use crate::router::build_router;

    use super::*;

    #[tokio::test]
    async fn request_and_store_spans_share_a_trace() {
        let capture = Capture::install();
        let store = Arc::new(MemoryCounterStore::new());
        store.initialize().await.expect("init");
        let state = AppState::new(ServiceConfig::default(), store, "memory");
        let server = TestServer::new(build_router(state)).expect("test server");

        server.post("/api/counter").await.assert_status_ok();

        let root = capture.span("POST /api/counter");
        let child = capture.span("counter_store.increment");

        assert_eq!(root.span_kind, SpanKind::Server);
        assert_eq!(root.parent_span_id, SpanId::INVALID);
        assert_eq!(attr(&root, "http.status_code"), Some(Value::I64(200)));
        assert_eq!(child.span_kind, SpanKind::Client);
        assert_eq!(child.span_context.trace_id(), root.span_context.trace_id());
        assert_eq!(child.parent_span_id, root.span_context.span_id());
    }

    #[tokio::test]
    async fn failed_requests_mark_the_server_span() {
        let capture = Capture::install();
        let store = Arc::new(MemoryCounterStore::new());
        let state = AppState::new(ServiceConfig::default(), store, "memory");
        let server = TestServer::new(build_router(state)).expect("test server");

        // Counter never initialized: the read fails with a store error.
        server.get("/api/counter").await;

        let root = capture.span("GET /api/counter");
        assert!(matches!(root.status, Status::Error { .. }));
        assert_eq!(attr(&root, "http.status_code"), Some(Value::I64(500)));
    }

    #[tokio::test]
    async fn unmatched_paths_name_the_span_generically() {
        let capture = Capture::install();
        let state = AppState::new(
            ServiceConfig::default(),
            Arc::new(MemoryCounterStore::new()),
            "memory",
        );
        let server = TestServer::new(build_router(state)).expect("test server");

        server
            .get("/no/such/path")
            .await
            .assert_status(axum::http::StatusCode::NOT_FOUND);

        let root = capture.span("GET unmatched");
        assert_eq!(root.status, Status::Unset);
    }
}
