use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{OkResponse, WaitRequest};
use crate::daemon::DaemonState;
use crate::selector;

const DEFAULT_WAIT_SECS: u64 = 30;
/// Quiet window for the DOM-stability wait.
const STABLE_QUIET_MS: u64 = 500;

/// Wait until the selector matches a visible element; default 30 s, a miss
/// past the deadline is an operational failure.
pub async fn wait_for_selector(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<WaitRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let timeout = Duration::from_secs(req.timeout.unwrap_or(DEFAULT_WAIT_SECS));

    let script = format!(
        "(() => {{ const el = {query}; if (!el) return false; \
         const rect = el.getBoundingClientRect(); \
         return rect.width > 0 && rect.height > 0; }})()",
        query = selector::js_query_one(&sel),
    );

    let start = std::time::Instant::now();
    loop {
        let hit = driver::evaluate(&page, &script)
            .await
            .map_err(ApiError::from)?
            .as_bool()
            .unwrap_or(false);
        if hit {
            return Ok(Json(OkResponse::new()));
        }
        if start.elapsed() >= timeout {
            return Err(ApiError::driver(format!(
                "timed out after {}s waiting for {}",
                timeout.as_secs(),
                req.selector
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub async fn wait_load(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::wait_for_load(&page, Duration::from_secs(DEFAULT_WAIT_SECS))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

/// DOM stability: an in-page MutationObserver bumps a counter; the wait ends
/// once the counter holds still for the quiet window, capped by the safety
/// timeout.
pub async fn wait_stable(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    driver::evaluate(
        &page,
        "(() => { if (window.__brMutations) return true; \
         window.__brMutations = {count: 0}; \
         new MutationObserver(() => window.__brMutations.count++) \
             .observe(document.documentElement, \
                      {subtree: true, childList: true, attributes: true, characterData: true}); \
         return true; })()",
    )
    .await
    .map_err(ApiError::from)?;

    let timeout = Duration::from_secs(DEFAULT_WAIT_SECS);
    let start = std::time::Instant::now();
    let mut last: u64 = u64::MAX;
    let mut quiet_since = std::time::Instant::now();
    loop {
        let count = driver::evaluate(&page, "window.__brMutations ? window.__brMutations.count : 0")
            .await
            .map_err(ApiError::from)?
            .as_u64()
            .unwrap_or(0);
        if count != last {
            last = count;
            quiet_since = std::time::Instant::now();
        } else if quiet_since.elapsed().as_millis() as u64 >= STABLE_QUIET_MS {
            return Ok(Json(OkResponse::new()));
        }
        if start.elapsed() >= timeout {
            return Ok(Json(OkResponse::new()));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub async fn wait_idle(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::wait_until_idle(&page, STABLE_QUIET_MS, Duration::from_secs(DEFAULT_WAIT_SECS))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}
