use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{ConsoleEntry, ConsoleKind, ConsoleQuery, OkResponse};
use crate::daemon::DaemonState;

/// Filtered view of the console ring. `type` takes a comma-separated list;
/// `clear=true` empties the ring after the snapshot is taken.
pub async fn list(
    State(daemon): State<Arc<DaemonState>>,
    Query(q): Query<ConsoleQuery>,
) -> ApiResult<Json<Vec<ConsoleEntry>>> {
    let kinds: Option<Vec<ConsoleKind>> = match &q.r#type {
        Some(raw) => {
            let parsed: Vec<ConsoleKind> = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    ConsoleKind::parse_str(s).ok_or_else(|| {
                        ApiError::bad_request(format!("unknown console type '{}'", s.trim()))
                    })
                })
                .collect::<Result<_, _>>()?;
            if parsed.is_empty() {
                None
            } else {
                Some(parsed)
            }
        }
        None => None,
    };

    let mut state = daemon.state.lock().await;
    let entries = state.console_snapshot(kinds.as_deref(), q.tab);
    if q.clear.unwrap_or(false) {
        state.clear_console();
    }
    Ok(Json(entries))
}

pub async fn clear(State(daemon): State<Arc<DaemonState>>) -> Json<OkResponse> {
    daemon.state.lock().await.clear_console();
    Json(OkResponse::new())
}
