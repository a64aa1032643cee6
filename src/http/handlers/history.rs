use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::core::types::{HistoryEntry, OkResponse};
use crate::daemon::DaemonState;

pub async fn list(State(daemon): State<Arc<DaemonState>>) -> Json<Vec<HistoryEntry>> {
    Json(daemon.state.lock().await.history().to_vec())
}

pub async fn clear(State(daemon): State<Arc<DaemonState>>) -> Json<OkResponse> {
    daemon.state.lock().await.clear_history();
    Json(OkResponse::new())
}
