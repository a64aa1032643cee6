//! Shared handler plumbing: active-page lookup, selector resolution against
//! the current ID→XPath map, element lookup with the caller-facing error.

use std::sync::Arc;

use chromiumoxide::page::Page;
use chromiumoxide::Element;

use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::daemon::DaemonState;
use crate::selector::{self, Selector};

/// The page tab-less endpoints act on. Fails recoverably when the tab list
/// is empty.
pub async fn active_page(daemon: &Arc<DaemonState>) -> ApiResult<Page> {
    daemon
        .state
        .lock()
        .await
        .active_page()
        .ok_or(ApiError::NoActiveTab)
}

/// Classify a selector token against the map from the latest tree view.
pub async fn classify(daemon: &Arc<DaemonState>, token: &str) -> ApiResult<Selector> {
    let state = daemon.state.lock().await;
    selector::classify(token, state.id_xpath_map())
}

/// Resolve a token all the way to an element handle; a query that matches
/// nothing is the caller's error and carries the original token.
pub async fn find_element(
    daemon: &Arc<DaemonState>,
    page: &Page,
    token: &str,
) -> ApiResult<Element> {
    let sel = classify(daemon, token).await?;
    match driver::try_find(page, &sel).await? {
        Some(el) => Ok(el),
        None => Err(ApiError::ElementNotFound {
            token: token.to_string(),
        }),
    }
}

/// Evaluate a script that resolves the selector in-page and returns whether
/// it matched; `false` becomes the element-not-found error.
pub async fn evaluate_on_selector(
    page: &Page,
    sel: &Selector,
    token: &str,
    body: &str,
) -> ApiResult<serde_json::Value> {
    let script = format!(
        "(() => {{ const el = {query}; if (!el) return null; return ({body}); }})()",
        query = selector::js_query_one(sel),
    );
    let value = driver::evaluate(page, &script).await?;
    if value.is_null() {
        return Err(ApiError::ElementNotFound {
            token: token.to_string(),
        });
    }
    Ok(value)
}
