use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::Json;
use serde_json::json;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{ExtractTextRequest, ExtractTextResponse, HtmlQuery, TreeResponse};
use crate::daemon::DaemonState;
use crate::selector;
use crate::tree;

/// Page source with every secret masked. The masking rule applies to this
/// endpoint only; everything else simply never echoes secrets.
pub async fn html(
    State(daemon): State<Arc<DaemonState>>,
    Query(q): Query<HtmlQuery>,
) -> ApiResult<Html<String>> {
    let _op = daemon.op_lock.lock().await;
    let page = match q.page {
        Some(index) => daemon
            .state
            .lock()
            .await
            .page_at(index)
            .ok_or_else(|| ApiError::bad_request(format!("tab index {index} out of range")))?,
        None => common::active_page(&daemon).await?,
    };
    let raw = page.content().await.map_err(ApiError::driver)?;
    let masked = daemon.state.lock().await.mask_secrets(&raw);
    Ok(Html(masked))
}

/// Build the joined accessibility/DOM view and install its id→XPath map as
/// the one numeric selectors resolve through.
pub async fn tree(State(daemon): State<Arc<DaemonState>>) -> ApiResult<Json<TreeResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let build = tree::build_tree(&page).await.map_err(ApiError::from)?;
    {
        let mut state = daemon.state.lock().await;
        state.replace_id_xpath_map(build.id_map);
        state.append_history("view-tree", json!({}));
    }
    Ok(Json(TreeResponse { tree: build.tree }))
}

/// Visible text of the matched elements (or the whole body). Capped at 1000
/// elements and a 5 s cap checked between batches; both caps fail
/// recoverably.
pub async fn extract_text(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<ExtractTextRequest>,
) -> ApiResult<Json<ExtractTextResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    let elements_expr = match &req.selector {
        Some(token) => {
            let sel = common::classify(&daemon, token).await?;
            selector::js_query_all(&sel)
        }
        None => "[document.body]".to_string(),
    };

    let script = format!(
        r#"(() => {{
            const els = {elements_expr};
            if (els.length === 0) return {{error: 'empty'}};
            if (els.length > 1000) return {{error: 'too_many', count: els.length}};
            const start = Date.now();
            const parts = [];
            for (let i = 0; i < els.length; i++) {{
                if (i % 50 === 0 && Date.now() - start > 5000) {{
                    return {{error: 'timeout'}};
                }}
                const t = els[i].innerText;
                if (t && t.trim()) parts.push(t.trim());
            }}
            return {{text: parts.join('\n\n')}};
        }})()"#
    );

    let value = driver::evaluate(&page, &script).await.map_err(ApiError::from)?;
    if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
        return Err(match err {
            "empty" => ApiError::ElementNotFound {
                token: req.selector.unwrap_or_else(|| "body".to_string()),
            },
            "too_many" => ApiError::bad_request(format!(
                "selector matched {} elements (limit 1000)",
                value.get("count").and_then(|v| v.as_u64()).unwrap_or(0)
            )),
            _ => ApiError::bad_request("text extraction exceeded the 5s cap"),
        });
    }
    let text = value
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(Json(ExtractTextResponse { text }))
}
