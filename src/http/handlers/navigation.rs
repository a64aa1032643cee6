use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{GotoRequest, OkResponse, ReloadRequest, UrlResponse};
use crate::daemon::DaemonState;

pub async fn goto(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<GotoRequest>,
) -> ApiResult<Json<UrlResponse>> {
    if req.url.trim().is_empty() {
        return Err(ApiError::bad_request("missing url"));
    }
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    daemon.maybe_delay(200, 600).await;
    driver::goto(&page, &req.url).await.map_err(ApiError::from)?;
    daemon.maybe_delay(200, 600).await;

    // Navigation invalidates the logs the old document produced on this tab.
    {
        let mut state = daemon.state.lock().await;
        let active = state.active_index();
        state.drop_console_for_tab(active);
    }

    daemon.record("goto", json!({"url": req.url})).await;
    Ok(Json(UrlResponse {
        url: driver::current_url(&page).await,
    }))
}

pub async fn back(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<UrlResponse>> {
    history_move(daemon, -1, "back").await
}

pub async fn forward(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<UrlResponse>> {
    history_move(daemon, 1, "forward").await
}

async fn history_move(
    daemon: Arc<DaemonState>,
    delta: i32,
    action: &str,
) -> ApiResult<Json<UrlResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::history_go(&page, delta).await.map_err(ApiError::from)?;
    daemon.record(action, json!({})).await;
    Ok(Json(UrlResponse {
        url: driver::current_url(&page).await,
    }))
}

pub async fn reload(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<ReloadRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::reload(&page, req.hard).await.map_err(ApiError::from)?;
    daemon.record("reload", json!({"hard": req.hard})).await;
    Ok(Json(OkResponse::new()))
}

pub async fn clear_cache(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::clear_browser_cache(&page).await.map_err(ApiError::from)?;
    daemon.record("clear-cache", json!({})).await;
    Ok(Json(OkResponse::new()))
}
