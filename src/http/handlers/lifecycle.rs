use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::core::types::OkResponse;
use crate::daemon::DaemonState;

pub async fn health() -> &'static str {
    "ok"
}

/// Reply first, then tear down: the shutdown signal is queued and the
/// graceful-shutdown path lets this response flush before the server stops.
pub async fn shutdown(State(daemon): State<Arc<DaemonState>>) -> Json<OkResponse> {
    let _ = daemon.shutdown_tx.send(()).await;
    Json(OkResponse::new())
}
