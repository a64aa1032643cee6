//! Thin capability layer over the Chromium driver.
//!
//! This module is the single place that speaks to `chromiumoxide` directly:
//! executable discovery, persistent-context launch, navigation, evaluation,
//! element lookup, screenshots, PDF export, key dispatch. Everything above it
//! (router, tree builder, challenge helpers) works in terms of `Page` plus
//! the helpers here and never touches vendor configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCacheParams;
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, ReloadParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide::Element;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::core::config::{self, LaunchOptions};
use crate::selector::{self, Selector};

/// Default ceiling for navigation and history moves.
pub const NAV_TIMEOUT: Duration = Duration::from_secs(30);

/// Locate a Chromium-family executable.
///
/// Order: `CHROME_EXECUTABLE` override, then PATH, then well-known
/// per-platform install locations.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(exe) = config::chrome_executable_override() {
        return Some(exe);
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

fn build_config(exe: &str, opts: &LaunchOptions, user_data_dir: &Path) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(user_data_dir)
        .viewport(Viewport {
            width: opts.viewport_width,
            height: opts.viewport_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(opts.viewport_width, opts.viewport_height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled");

    if !opts.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Owner of the browser process and its CDP event pump. Dropping the adapter
/// (via [`Driver::close`]) releases child processes; the profile directory is
/// left on disk.
pub struct Driver {
    browser: Browser,
}

impl Driver {
    /// Launch a persistent browser context in `user_data_dir` and return the
    /// adapter plus a channel that fires once when the browser goes away.
    pub async fn launch(
        opts: &LaunchOptions,
        user_data_dir: &Path,
    ) -> Result<(Self, oneshot::Receiver<()>)> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE \
                 to an existing binary."
            )
        })?;

        tokio::fs::create_dir_all(user_data_dir)
            .await
            .context("Failed to create browser profile directory")?;

        info!(
            "Launching {} ({}x{}, headless={})",
            exe, opts.viewport_width, opts.viewport_height, opts.headless
        );

        let cfg = build_config(&exe, opts, user_data_dir)?;
        let (browser, mut handler) = Browser::launch(cfg)
            .await
            .with_context(|| format!("Failed to launch browser ({exe})"))?;

        // Drain CDP events; the stream ending means the browser process is gone.
        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
            let _ = disconnect_tx.send(());
        });

        Ok((Self { browser }, disconnect_rx))
    }

    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .context("Failed to open page")
    }

    /// All pages the browser currently holds, in creation order.
    pub async fn pages(&self) -> Result<Vec<Page>> {
        self.browser.pages().await.context("Failed to list pages")
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
    }
}

// ── Page-level helpers ───────────────────────────────────────────────────────

/// Navigate and wait for `domcontentloaded`, bounded by [`NAV_TIMEOUT`].
pub async fn goto(page: &Page, url: &str) -> Result<()> {
    tokio::time::timeout(NAV_TIMEOUT, async {
        page.goto(url)
            .await
            .with_context(|| format!("Navigation to {url} failed"))?;
        page.wait_for_navigation().await.ok();
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|_| anyhow!("Navigation to {url} timed out after {}s", NAV_TIMEOUT.as_secs()))?
}

/// Evaluate an expression in the page and return its JSON value
/// (`null` for undefined results).
pub async fn evaluate(page: &Page, script: &str) -> Result<serde_json::Value> {
    let result = page
        .evaluate(script)
        .await
        .context("Script evaluation failed")?;
    Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
}

/// Evaluate an expression that yields a promise, awaiting its settlement.
/// Used where plain [`evaluate`] would hand back the pending promise object
/// (in-page fetch for downloads).
pub async fn evaluate_promise(page: &Page, script: &str) -> Result<serde_json::Value> {
    use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;

    let params = EvaluateParams::builder()
        .expression(script)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(|e| anyhow!("Failed to build evaluate params: {:?}", e))?;
    let resp = page
        .execute(params)
        .await
        .context("Script evaluation failed")?;
    if let Some(details) = &resp.result.exception_details {
        return Err(anyhow!("Script threw: {}", details.text));
    }
    Ok(resp
        .result
        .result
        .value
        .clone()
        .unwrap_or(serde_json::Value::Null))
}

/// Transient attribute used to hand an XPath match over to the CSS-based
/// element lookup.
const MARK_ATTR: &str = "data-br-target";

/// Resolve a classified selector to an element handle. `Ok(None)` means the
/// query ran but matched nothing.
///
/// CSS goes straight through the driver. XPath (including resolved numeric
/// ids) is evaluated in-page, the match is marked with a transient attribute,
/// looked up by that attribute, and unmarked again — the handle stays valid
/// after the attribute is gone.
pub async fn try_find(page: &Page, selector: &Selector) -> Result<Option<Element>> {
    match selector {
        Selector::Css(css) => Ok(page.find_element(css.clone()).await.ok()),
        other => {
            let mark = format!(
                "(() => {{ const el = {query}; if (!el) return false; \
                 el.setAttribute('{MARK_ATTR}', ''); return true; }})()",
                query = selector::js_query_one(other),
            );
            let matched = evaluate(page, &mark).await?.as_bool().unwrap_or(false);
            if !matched {
                return Ok(None);
            }
            let element = page.find_element(format!("[{MARK_ATTR}]")).await.ok();
            evaluate(
                page,
                &format!(
                    "document.querySelectorAll('[{MARK_ATTR}]')\
                     .forEach(el => el.removeAttribute('{MARK_ATTR}'))"
                ),
            )
            .await
            .ok();
            Ok(element)
        }
    }
}

pub async fn current_url(page: &Page) -> String {
    page.url().await.ok().flatten().unwrap_or_default()
}

pub async fn title(page: &Page) -> String {
    page.get_title().await.ok().flatten().unwrap_or_default()
}

/// History move via the in-page API; the driver exposes no direct call.
pub async fn history_go(page: &Page, delta: i32) -> Result<()> {
    tokio::time::timeout(NAV_TIMEOUT, async {
        page.evaluate(format!("history.go({delta})"))
            .await
            .context("History move failed")?;
        page.wait_for_navigation().await.ok();
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|_| anyhow!("History move timed out"))?
}

/// Reload the page; a hard reload issues `Page.reload` with `ignoreCache`
/// and then awaits `domcontentloaded` like any navigation.
pub async fn reload(page: &Page, hard: bool) -> Result<()> {
    tokio::time::timeout(NAV_TIMEOUT, async {
        let mut params = ReloadParams::default();
        if hard {
            params.ignore_cache = Some(true);
        }
        page.execute(params).await.context("Reload failed")?;
        page.wait_for_navigation().await.ok();
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|_| anyhow!("Reload timed out"))?
}

pub async fn clear_browser_cache(page: &Page) -> Result<()> {
    page.execute(ClearBrowserCacheParams::default())
        .await
        .context("Failed to clear browser cache")?;
    Ok(())
}

/// Dispatch a raw key press (down + up) to the page.
pub async fn press_key(page: &Page, key: &str) -> Result<()> {
    for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        page.execute(
            DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .build()
                .map_err(|e| anyhow!("Failed to build key event: {:?}", e))?,
        )
        .await
        .context("Key dispatch failed")?;
    }
    Ok(())
}

pub async fn screenshot(page: &Page, full_page: bool) -> Result<Vec<u8>> {
    page.screenshot(ScreenshotParams::builder().full_page(full_page).build())
        .await
        .context("Screenshot capture failed")
}

/// Paper size in inches for a named PDF format. Unknown names fall back to
/// Letter, matching the endpoint default.
fn paper_size(format: &str) -> (f64, f64) {
    match format.trim().to_ascii_lowercase().as_str() {
        "a4" => (8.27, 11.7),
        "legal" => (8.5, 14.0),
        "tabloid" => (11.0, 17.0),
        "a3" => (11.7, 16.54),
        _ => (8.5, 11.0),
    }
}

pub async fn pdf(page: &Page, format: &str) -> Result<Vec<u8>> {
    let (width, height) = paper_size(format);
    let mut params = PrintToPdfParams::default();
    params.paper_width = Some(width);
    params.paper_height = Some(height);
    params.print_background = Some(true);
    page.pdf(params).await.context("PDF export failed")
}

/// Poll until the document readyState reaches `complete`.
pub async fn wait_for_load(page: &Page, timeout: Duration) -> Result<()> {
    let start = std::time::Instant::now();
    loop {
        let ready: bool = evaluate(page, "document.readyState === 'complete'")
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(anyhow!("Timed out waiting for load"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout` has elapsed.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms — a
/// networkidle heuristic that works without CDP Network events.
pub async fn wait_until_idle(page: &Page, quiet_ms: u64, timeout: Duration) -> Result<()> {
    let poll = Duration::from_millis(250);
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed() >= timeout {
            info!("wait_until_idle: timeout after {}ms", timeout.as_millis());
            return Ok(());
        }

        let count: u64 = evaluate(page, "performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let ready: bool = evaluate(page, "document.readyState === 'complete'")
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !ready || count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            return Ok(());
        }

        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_sizes_default_to_letter() {
        assert_eq!(paper_size("Letter"), (8.5, 11.0));
        assert_eq!(paper_size("a4"), (8.27, 11.7));
        assert_eq!(paper_size("LEGAL"), (8.5, 14.0));
        assert_eq!(paper_size("unknown"), (8.5, 11.0));
    }
}
