use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{
    FillRequest, FillSearchRequest, FillSearchResponse, FillSecretRequest, OkResponse,
    PressRequest, ScrollToRequest, SelectRequest, SelectorRequest, TypeRequest, ValueResponse,
};
use crate::daemon::DaemonState;
use crate::selector;

/// Ordered candidates for `/fill-search` when no selector is given; the
/// placeholder sniff and the searchbox-role fallback run in-page after these.
const SEARCH_CANDIDATES: &[&str] = &[
    "input[type=search]",
    "input[name=q]",
    "input[name=query]",
    "input[name=search]",
];

pub async fn scroll_into_view(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    common::evaluate_on_selector(&page, &sel, &req.selector, "el.scrollIntoView(), true").await?;
    daemon
        .record("scroll-into-view", json!({"selector": req.selector}))
        .await;
    Ok(Json(OkResponse::new()))
}

pub async fn scroll_to(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<ScrollToRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let pct = req.percentage.clamp(0.0, 100.0);
    driver::evaluate(
        &page,
        &format!("window.scrollTo(0, document.body.scrollHeight * {pct} / 100)"),
    )
    .await
    .map_err(ApiError::from)?;
    daemon.record("scroll-to", json!({"percentage": pct})).await;
    Ok(Json(OkResponse::new()))
}

pub async fn next_chunk(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    scroll_chunk(daemon, 1, "next-chunk").await
}

pub async fn prev_chunk(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<OkResponse>> {
    scroll_chunk(daemon, -1, "prev-chunk").await
}

async fn scroll_chunk(
    daemon: Arc<DaemonState>,
    direction: i32,
    action: &str,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::evaluate(
        &page,
        &format!("window.scrollBy(0, {direction} * window.innerHeight)"),
    )
    .await
    .map_err(ApiError::from)?;
    daemon.record(action, json!({})).await;
    Ok(Json(OkResponse::new()))
}

/// Set the field value in one step and fire the events frameworks listen to.
async fn fill_value(
    daemon: &Arc<DaemonState>,
    token: &str,
    text: &str,
) -> ApiResult<()> {
    let page = common::active_page(daemon).await?;
    let sel = common::classify(daemon, token).await?;
    let value = serde_json::to_string(text).map_err(ApiError::driver)?;
    common::evaluate_on_selector(
        &page,
        &sel,
        token,
        &format!(
            "(el.value = {value}, \
             el.dispatchEvent(new Event('input', {{bubbles: true}})), \
             el.dispatchEvent(new Event('change', {{bubbles: true}})), true)"
        ),
    )
    .await?;
    Ok(())
}

pub async fn fill(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<FillRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    fill_value(&daemon, &req.selector, &req.text).await?;
    daemon
        .record("fill", json!({"selector": req.selector, "text": req.text}))
        .await;
    Ok(Json(OkResponse::new()))
}

/// Same as `/fill`, but the value joins the masked-secret set and never
/// appears in history.
pub async fn fill_secret(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<FillSecretRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    fill_value(&daemon, &req.selector, &req.secret).await?;
    daemon.state.lock().await.add_secret(req.secret);
    daemon
        .record("fill-secret", json!({"selector": req.selector}))
        .await;
    Ok(Json(OkResponse::new()))
}

pub async fn type_text(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<TypeRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let el = common::find_element(&daemon, &page, &req.selector).await?;
    el.click().await.map_err(ApiError::driver)?;
    if daemon.opts.humanlike {
        let mut buf = [0u8; 4];
        for ch in req.text.chars() {
            el.type_str(ch.encode_utf8(&mut buf) as &str)
                .await
                .map_err(ApiError::driver)?;
            daemon.maybe_delay(30, 80).await;
        }
    } else {
        el.type_str(&req.text).await.map_err(ApiError::driver)?;
    }
    daemon
        .record("type", json!({"selector": req.selector, "text": req.text}))
        .await;
    Ok(Json(OkResponse::new()))
}

pub async fn press(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<PressRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    driver::press_key(&page, &req.key).await.map_err(ApiError::from)?;
    daemon.record("press", json!({"key": req.key})).await;
    Ok(Json(OkResponse::new()))
}

pub async fn click(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let el = common::find_element(&daemon, &page, &req.selector).await?;
    daemon.maybe_delay(100, 400).await;
    el.click().await.map_err(ApiError::driver)?;
    daemon.record("click", json!({"selector": req.selector})).await;
    Ok(Json(OkResponse::new()))
}

pub async fn fill_search(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<FillSearchRequest>,
) -> ApiResult<Json<FillSearchResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    let token = match &req.selector {
        Some(sel) => sel.clone(),
        None => {
            let candidates = serde_json::to_string(SEARCH_CANDIDATES).map_err(ApiError::driver)?;
            let probe = format!(
                r#"(() => {{
                    for (const sel of {candidates}) {{
                        if (document.querySelector(sel)) return sel;
                    }}
                    for (const el of document.querySelectorAll('input[placeholder]')) {{
                        if (/search|find|query/i.test(el.placeholder)) {{
                            return 'input[placeholder=' + JSON.stringify(el.placeholder) + ']';
                        }}
                    }}
                    if (document.querySelector('[role=searchbox]')) return '[role=searchbox]';
                    return null;
                }})()"#
            );
            let found = driver::evaluate(&page, &probe).await.map_err(ApiError::from)?;
            match found.as_str() {
                Some(sel) => sel.to_string(),
                None => {
                    return Err(ApiError::bad_request(
                        "no search input found on page; pass a selector",
                    ))
                }
            }
        }
    };

    let el = common::find_element(&daemon, &page, &token).await?;
    el.click().await.map_err(ApiError::driver)?;
    el.type_str(&req.query).await.map_err(ApiError::driver)?;
    driver::press_key(&page, "Enter").await.map_err(ApiError::from)?;

    daemon
        .record(
            "fill-search",
            json!({"query": req.query, "selector": token}),
        )
        .await;
    Ok(Json(FillSearchResponse { selector: token }))
}

pub async fn select_value(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectRequest>,
) -> ApiResult<Json<ValueResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let value = serde_json::to_string(&req.value).map_err(ApiError::driver)?;
    common::evaluate_on_selector(
        &page,
        &sel,
        &req.selector,
        &format!(
            "(el.value = {value}, \
             el.dispatchEvent(new Event('change', {{bubbles: true}})), el.value)"
        ),
    )
    .await?;
    daemon
        .record("select", json!({"selector": req.selector, "value": req.value}))
        .await;
    Ok(Json(ValueResponse { value: req.value }))
}

pub async fn submit(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult<Json<OkResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;
    let script = format!(
        "(() => {{ const el = {query}; if (!el) return 'missing'; \
         const form = el.tagName === 'FORM' ? el : el.closest('form'); \
         if (!form) return 'noform'; form.submit(); return 'ok'; }})()",
        query = selector::js_query_one(&sel),
    );
    let outcome = driver::evaluate(&page, &script).await.map_err(ApiError::from)?;
    match outcome.as_str() {
        Some("ok") => {}
        Some("noform") => {
            return Err(ApiError::bad_request(format!(
                "no enclosing form for selector: {}",
                req.selector
            )))
        }
        _ => {
            return Err(ApiError::ElementNotFound {
                token: req.selector,
            })
        }
    }
    daemon.record("submit", json!({"selector": req.selector})).await;
    Ok(Json(OkResponse::new()))
}
