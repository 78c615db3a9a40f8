use std::future::Future;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tally_core::error::{Result, TallyError};
use tally_core::store::CounterStore;
use tracing::Instrument;

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterValue {
    pub value: i64,
}

/// Run a store operation on its own task.
///
/// A client that disconnects drops the handler future; the spawned operation
/// still runs to completion, so a started increment is never abandoned
/// half-way. The task stays inside the request span.
async fn detached<T, F, Fut>(state: &AppState, op: F) -> Result<T>
where
    F: FnOnce(Arc<dyn CounterStore>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let fut = op(state.store());
    tokio::spawn(fut.in_current_span())
        .await
        .map_err(|e| TallyError::Internal(format!("store task failed: {e}")))?
}

/// `GET /api/counter`
pub async fn get_counter(State(state): State<AppState>) -> std::result::Result<Json<CounterValue>, ApiError> {
    let value = detached(&state, |store| async move { store.read().await }).await?;
    state.metrics().set_counter_gauge(value);
    Ok(Json(CounterValue { value }))
}

/// `POST /api/counter`: add one, return the new value.
pub async fn post_counter(State(state): State<AppState>) -> std::result::Result<Json<CounterValue>, ApiError> {
    let value = detached(&state, |store| async move { store.increment().await }).await?;
    state.metrics().set_counter_gauge(value);
    tracing::debug!(value, "counter incremented");
    Ok(Json(CounterValue { value }))
}
