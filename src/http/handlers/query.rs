use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{AttrRequest, BoolResponse, CountResponse, SelectorRequest, ValueResponse};
use crate::daemon::DaemonState;
use crate::selector;

/// Negative results are 200s here — the CLI maps them to exit 1.
pub async fn exists(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<BoolResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let script = format!("({}) !== null", selector::js_query_one(&sel));
    let found = driver::evaluate(&page, &script)
        .await
        .map_err(ApiError::from)?
        .as_bool()
        .unwrap_or(false);
    Ok(Json(BoolResponse { result: found }))
}

pub async fn visible(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<BoolResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let script = format!(
        "(() => {{ const el = {query}; if (!el) return false; \
         const rect = el.getBoundingClientRect(); \
         const style = getComputedStyle(el); \
         return rect.width > 0 && rect.height > 0 \
             && style.visibility !== 'hidden' && style.display !== 'none'; }})()",
        query = selector::js_query_one(&sel),
    );
    let visible = driver::evaluate(&page, &script)
        .await
        .map_err(ApiError::from)?
        .as_bool()
        .unwrap_or(false);
    Ok(Json(BoolResponse { result: visible }))
}

pub async fn count(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<CountResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let script = format!("({}).length", selector::js_query_all(&sel));
    let count = driver::evaluate(&page, &script)
        .await
        .map_err(ApiError::from)?
        .as_u64()
        .unwrap_or(0) as usize;
    Ok(Json(CountResponse { count }))
}

pub async fn attr(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<AttrRequest>,
) -> ApiResult<Json<ValueResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let name = serde_json::to_string(&req.attribute).map_err(ApiError::driver)?;
    let value = common::evaluate_on_selector(
        &page,
        &sel,
        &req.selector,
        &format!("({{value: el.getAttribute({name})}})"),
    )
    .await?;
    match value.get("value").and_then(|v| v.as_str()) {
        Some(value) => Ok(Json(ValueResponse {
            value: value.to_string(),
        })),
        None => Err(ApiError::bad_request(format!(
            "attribute '{}' not present on {}",
            req.attribute, req.selector
        ))),
    }
}
