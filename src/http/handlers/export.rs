use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use base64::Engine;
use serde_json::json;
use url::Url;

use super::common;
use crate::browser::{challenge, driver};
use crate::core::config;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{DownloadRequest, DownloadResponse, PdfQuery, ScreenshotQuery};
use crate::daemon::DaemonState;

/// `shot-example.com-1712345678.png` — host folded into the filename so a
/// directory of captures stays navigable.
fn export_filename(prefix: &str, url: &str, ext: &str) -> String {
    let domain = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "page".to_string());
    let safe: String = domain
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{prefix}-{safe}-{}.{ext}", chrono::Utc::now().timestamp())
}

async fn resolve_output(path: Option<String>, default_name: String) -> ApiResult<PathBuf> {
    match path {
        Some(p) => Ok(PathBuf::from(p)),
        None => {
            let dir = config::output_dir();
            tokio::fs::create_dir_all(&dir).await.map_err(ApiError::driver)?;
            Ok(dir.join(default_name))
        }
    }
}

/// Capture a PNG. Modals are dismissed and the challenge bypass waited out
/// first so the shot shows the document, not an interstitial.
pub async fn screenshot(
    State(daemon): State<Arc<DaemonState>>,
    Query(q): Query<ScreenshotQuery>,
) -> ApiResult<String> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    challenge::dismiss_modals(&page).await.ok();
    challenge::wait_for_bypass(&page, challenge::BYPASS_TIMEOUT).await;

    let bytes = driver::screenshot(&page, q.full_page.unwrap_or(false))
        .await
        .map_err(ApiError::from)?;

    let url = driver::current_url(&page).await;
    let out = resolve_output(q.path, export_filename("shot", &url, "png")).await?;
    tokio::fs::write(&out, &bytes).await.map_err(ApiError::driver)?;

    let path = out.to_string_lossy().to_string();
    daemon.record("screenshot", json!({"path": path})).await;
    Ok(path)
}

pub async fn pdf(
    State(daemon): State<Arc<DaemonState>>,
    Query(q): Query<PdfQuery>,
) -> ApiResult<String> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;

    let format = q.format.unwrap_or_else(|| "Letter".to_string());
    let bytes = driver::pdf(&page, &format).await.map_err(ApiError::from)?;

    let url = driver::current_url(&page).await;
    let out = resolve_output(q.path, export_filename("page", &url, "pdf")).await?;
    tokio::fs::write(&out, &bytes).await.map_err(ApiError::driver)?;

    let path = out.to_string_lossy().to_string();
    daemon.record("pdf", json!({"path": path, "format": format})).await;
    Ok(path)
}

fn percent_decode(raw: &str) -> Vec<u8> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Decode the payload of a `data:` URL (base64 or percent-encoded).
fn decode_data_url(url: &str) -> ApiResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ApiError::bad_request("not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ApiError::bad_request("malformed data URL"))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ApiError::bad_request(format!("invalid base64 in data URL: {e}")))
    } else {
        Ok(percent_decode(payload))
    }
}

fn infer_filename(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// Resolve the element's `href`/`src` against the document base and pull the
/// bytes. `data:` URLs decode directly; everything else is fetched inside
/// the page context so cookies and auth ride along.
pub async fn download(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<DownloadRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let sel = common::classify(&daemon, &req.selector).await?;

    let attrs = common::evaluate_on_selector(
        &page,
        &sel,
        &req.selector,
        "({href: el.getAttribute('href'), src: el.getAttribute('src')})",
    )
    .await?;
    let source = ["href", "src"]
        .iter()
        .find_map(|key| {
            attrs
                .get(*key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            ApiError::bad_request(format!("element {} has no href or src", req.selector))
        })?;

    let base = driver::evaluate(&page, "document.baseURI")
        .await
        .map_err(ApiError::from)?
        .as_str()
        .unwrap_or_default()
        .to_string();
    let resolved = Url::parse(&base)
        .and_then(|b| b.join(&source))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| source.clone());

    let bytes = if resolved.starts_with("data:") {
        decode_data_url(&resolved)?
    } else {
        let url_json = serde_json::to_string(&resolved).map_err(ApiError::driver)?;
        let script = format!(
            r#"(async () => {{
                try {{
                    const res = await fetch({url_json});
                    if (!res.ok) return {{error: 'HTTP ' + res.status}};
                    const buf = new Uint8Array(await res.arrayBuffer());
                    let bin = '';
                    const chunk = 0x8000;
                    for (let i = 0; i < buf.length; i += chunk) {{
                        bin += String.fromCharCode.apply(null, buf.subarray(i, i + chunk));
                    }}
                    return {{data: btoa(bin)}};
                }} catch (e) {{
                    return {{error: String(e)}};
                }}
            }})()"#
        );
        let value = driver::evaluate_promise(&page, &script)
            .await
            .map_err(ApiError::from)?;
        if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
            return Err(ApiError::driver(format!("download failed: {err}")));
        }
        let encoded = value
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::driver("download returned no data"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(ApiError::driver)?
    };

    let out = match req.output {
        Some(path) => PathBuf::from(path),
        None => {
            let dir = config::output_dir();
            tokio::fs::create_dir_all(&dir).await.map_err(ApiError::driver)?;
            dir.join(infer_filename(&resolved))
        }
    };
    tokio::fs::write(&out, &bytes).await.map_err(ApiError::driver)?;

    daemon
        .record(
            "download",
            json!({"selector": req.selector, "path": out.to_string_lossy()}),
        )
        .await;
    Ok(Json(DownloadResponse {
        path: out.to_string_lossy().to_string(),
        size: bytes.len(),
        url: resolved,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_carry_domain_and_extension() {
        let name = export_filename("shot", "https://docs.example.com/a/b", "png");
        assert!(name.starts_with("shot-docs.example.com-"));
        assert!(name.ends_with(".png"));

        let fallback = export_filename("page", "not a url", "pdf");
        assert!(fallback.starts_with("page-page-"));
    }

    #[test]
    fn base64_data_url_decodes() {
        let bytes = decode_data_url("data:text/plain;base64,SGVsbG8gV29ybGQ=").unwrap();
        assert_eq!(bytes, b"Hello World");
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn percent_data_url_decodes() {
        let bytes = decode_data_url("data:text/plain,hello%20world%21").unwrap();
        assert_eq!(bytes, b"hello world!");
    }

    #[test]
    fn malformed_data_urls_are_caller_errors() {
        assert!(decode_data_url("data:text/plain;base64").is_err());
        assert!(decode_data_url("http://example.com").is_err());
    }

    #[test]
    fn filename_inference_uses_last_path_segment() {
        assert_eq!(
            infer_filename("https://example.com/files/report.pdf?x=1"),
            "report.pdf"
        );
        assert_eq!(infer_filename("https://example.com/"), "download");
        assert_eq!(infer_filename("data:text/plain;base64,xx"), "download");
    }
}
