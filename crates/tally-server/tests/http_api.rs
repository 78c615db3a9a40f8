#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeSet;
use std::future::IntoFuture;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tally_core::store::CounterStore;
use tally_core::MemoryCounterStore;
use tally_server::{app_state::AppState, config::ServiceConfig, router};

struct Harness {
    server: TestServer,
    store: Arc<MemoryCounterStore>,
    state: AppState,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryCounterStore::new());
    store.initialize().await.expect("init");
    let state = AppState::new(ServiceConfig::default(), store.clone(), "memory");
    let server = TestServer::new(router::build_router(state.clone())).expect("test server");
    Harness { server, store, state }
}

/// Value of one `http_requests_total` series in a `/metrics` body.
fn request_count(metrics: &str, method: &str, endpoint: &str, status: u16) -> Option<u64> {
    let series = format!(
        "http_requests_total{{endpoint=\"{endpoint}\",method=\"{method}\",status=\"{status}\"}} "
    );
    metrics
        .lines()
        .find_map(|l| l.strip_prefix(series.as_str()))
        .map(|v| v.trim().parse().expect("numeric sample"))
}

#[tokio::test]
async fn read_increment_read_scenario() {
    let h = harness().await;

    let r = h.server.get("/api/counter").await;
    r.assert_status_ok();
    assert_eq!(r.json::<Value>(), json!({ "value": 0 }));

    assert_eq!(h.server.post("/api/counter").await.json::<Value>(), json!({ "value": 1 }));
    assert_eq!(h.server.post("/api/counter").await.json::<Value>(), json!({ "value": 2 }));
    assert_eq!(h.server.get("/api/counter").await.json::<Value>(), json!({ "value": 2 }));

    assert_eq!(h.state.metrics().counter_value.get(), 2);
}

#[tokio::test]
async fn disconnected_store_returns_structured_500_and_degraded_health() {
    let h = harness().await;
    h.server.get("/healthz").await.assert_json(&json!({ "status": "ok" }));

    h.store.set_available(false);

    let r = h.server.get("/api/counter").await;
    assert_eq!(r.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = r.json::<Value>();
    assert_eq!(body["error"], "database error");
    assert!(!body["detail"].as_str().unwrap_or_default().is_empty());

    let r = h.server.post("/api/counter").await;
    assert_eq!(r.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(r.json::<Value>()["error"], "database error");

    let r = h.server.get("/healthz").await;
    assert_eq!(r.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(r.json::<Value>(), json!({ "status": "degraded" }));

    // Still serving, and recovers once the store is back.
    h.store.set_available(true);
    h.server.get("/healthz").await.assert_status_ok();
    assert_eq!(h.server.get("/api/counter").await.json::<Value>(), json!({ "value": 0 }));
}

#[tokio::test]
async fn fifty_concurrent_increments() {
    let h = harness().await;

    let responses = join_all((0..50).map(|_| h.server.post("/api/counter").into_future())).await;
    let values: BTreeSet<i64> = responses
        .iter()
        .map(|r| {
            r.assert_status_ok();
            r.json::<Value>()["value"].as_i64().expect("value")
        })
        .collect();

    assert_eq!(values, (1..=50).collect::<BTreeSet<i64>>());
    assert_eq!(h.server.get("/api/counter").await.json::<Value>(), json!({ "value": 50 }));
}

#[tokio::test]
async fn metrics_count_every_served_combination() {
    let h = harness().await;

    for _ in 0..3 {
        h.server.get("/api/counter").await;
    }
    h.server.post("/api/counter").await;
    h.store.set_available(false);
    h.server.get("/api/counter").await;
    h.server.get("/healthz").await;
    h.store.set_available(true);
    h.server.get("/healthz").await;
    h.server.get("/no/such/path").await;

    let r = h.server.get("/metrics").await;
    r.assert_status_ok();
    assert_eq!(
        r.header("content-type").to_str().unwrap(),
        "text/plain; version=0.0.4; charset=utf-8"
    );
    let text = r.text();

    assert_eq!(request_count(&text, "GET", "/api/counter", 200), Some(3));
    assert_eq!(request_count(&text, "POST", "/api/counter", 200), Some(1));
    assert_eq!(request_count(&text, "GET", "/api/counter", 500), Some(1));
    assert_eq!(request_count(&text, "GET", "/healthz", 500), Some(1));
    assert_eq!(request_count(&text, "GET", "/healthz", 200), Some(1));
    assert_eq!(request_count(&text, "GET", "unmatched", 404), Some(1));
    assert_eq!(request_count(&text, "POST", "/api/counter", 500), None);

    assert!(text.contains(
        "http_request_duration_seconds_count{endpoint=\"/api/counter\",method=\"GET\"} 4"
    ));
    assert!(text.contains("counter_value 1"));

    // The scrape itself is counted by the next scrape.
    let text = h.server.get("/metrics").await.text();
    assert_eq!(request_count(&text, "GET", "/metrics", 200), Some(1));
}

#[tokio::test]
async fn readyz_reports_draining_and_degraded() {
    let h = harness().await;
    h.server.get("/readyz").await.assert_json(&json!({ "status": "ready" }));

    h.store.set_available(false);
    let r = h.server.get("/readyz").await;
    assert_eq!(r.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(r.json::<Value>(), json!({ "status": "degraded" }));

    h.store.set_available(true);
    h.state.set_draining();
    let r = h.server.get("/readyz").await;
    assert_eq!(r.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(r.json::<Value>(), json!({ "status": "draining" }));
    assert!(h.server.get("/metrics").await.text().contains("tally_draining 1"));
}

#[tokio::test]
async fn uninitialized_store_is_a_database_error() {
    let store = Arc::new(MemoryCounterStore::new());
    let state = AppState::new(ServiceConfig::default(), store, "memory");
    let server = TestServer::new(router::build_router(state)).expect("test server");

    let r = server.post("/api/counter").await;
    assert_eq!(r.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(r.json::<Value>()["error"], "database error");
    // Health only needs a reachable store.
    server.get("/healthz").await.assert_status_ok();
}
