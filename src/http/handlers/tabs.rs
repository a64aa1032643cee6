use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{
    CloseTabRequest, NewTabRequest, OkResponse, SwitchTabRequest, TabInfo, TabOpenedResponse,
};
use crate::daemon::DaemonState;

pub async fn list(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<Vec<TabInfo>>> {
    let _op = daemon.op_lock.lock().await;
    daemon.reconcile_tabs().await.map_err(ApiError::from)?;

    let (pages, active) = {
        let state = daemon.state.lock().await;
        let pages: Vec<_> = state.tabs().iter().map(|t| t.page.clone()).collect();
        (pages, state.active_index())
    };

    let mut infos = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        infos.push(TabInfo {
            index,
            title: driver::title(page).await,
            url: driver::current_url(page).await,
            is_active: index == active,
        });
    }
    Ok(Json(infos))
}

pub async fn switch(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SwitchTabRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    daemon.reconcile_tabs().await.map_err(ApiError::from)?;

    let page = {
        let mut state = daemon.state.lock().await;
        if !state.set_active_tab(req.index) {
            return Err(ApiError::bad_request(format!(
                "tab index {} out of range (have {})",
                req.index,
                state.tab_count()
            )));
        }
        state.active_page()
    };
    if let Some(page) = page {
        page.bring_to_front().await.ok();
    }
    daemon.record("switch-tab", json!({"index": req.index})).await;
    Ok(Json(OkResponse::new()))
}

pub async fn open(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<NewTabRequest>,
) -> ApiResult<Json<TabOpenedResponse>> {
    let _op = daemon.op_lock.lock().await;
    let url = req.url.as_deref().unwrap_or("about:blank").to_string();
    let page = daemon
        .driver
        .lock()
        .await
        .new_page(&url)
        .await
        .map_err(ApiError::from)?;
    daemon.attach_tab(page.clone()).await;

    let index = daemon.state.lock().await.active_index();
    daemon.record("new-tab", json!({"url": url})).await;
    Ok(Json(TabOpenedResponse {
        index,
        url: driver::current_url(&page).await,
    }))
}

pub async fn close(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<CloseTabRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    daemon.reconcile_tabs().await.map_err(ApiError::from)?;

    let removed = {
        let mut state = daemon.state.lock().await;
        let index = req.index.unwrap_or(state.active_index());
        if index >= state.tab_count() {
            return Err(ApiError::bad_request(format!(
                "tab index {} out of range (have {})",
                index,
                state.tab_count()
            )));
        }
        let handle = state.remove_tab(index).ok_or(ApiError::NoActiveTab)?;
        (index, handle)
    };
    let (index, handle) = removed;
    if let Err(e) = handle.page.close().await {
        tracing::warn!("Tab close error: {}", e);
    }
    daemon.record("close-tab", json!({"index": index})).await;
    Ok(Json(OkResponse::new()))
}
