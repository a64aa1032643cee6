//! Bot-check interstitial detection and modal dismissal.
//!
//! Challenge pages (Cloudflare, SiteGround) render a placeholder instead of
//! the real document; the screenshot path waits out the interstitial before
//! capture. Modal dismissal is a best-effort sweep that never blocks
//! interactive commands — it is only invoked from the screenshot path too.

use std::time::Duration;

use anyhow::Result;
use chromiumoxide::page::Page;
use tracing::debug;

use super::driver;

/// Default ceiling for the challenge bypass poll.
pub const BYPASS_TIMEOUT: Duration = Duration::from_secs(8);
/// Ceiling for the modal-dismiss sweep.
const DISMISS_TIMEOUT: Duration = Duration::from_millis(2500);

const DETECT_SCRIPT: &str = r#"(() => {
    const title = document.title || '';
    const scripts = Array.from(document.scripts);
    const cfTitle = title === 'Just a moment...';
    if (cfTitle
        || window._cf_chl_opt !== undefined
        || scripts.some(s => (s.src || '').includes('/cdn-cgi/challenge-platform/'))
        || (cfTitle && document.querySelector('meta[http-equiv="refresh" i]') !== null)) {
        return 'cloudflare';
    }
    if (title === 'Robot Challenge Screen'
        || window.sgchallenge !== undefined
        || scripts.some(s => (s.textContent || '').includes('sgchallenge'))) {
        return 'siteground';
    }
    return false;
})()"#;

/// Visible close affordances of the usual modal/popup kits, in click order.
const CLOSE_SELECTORS: &[&str] = &[
    ".modal.show [data-bs-dismiss='modal']",
    ".modal.show .btn-close",
    "[data-dismiss='modal']",
    "[aria-label='Close']",
    "[aria-label='close']",
    "[aria-label='Dismiss']",
    ".modal-close",
    ".popup-close",
    ".overlay-close",
    ".close-button",
    "button.close",
];

/// Check the current document for challenge markers. Returns the vendor tag
/// (`cloudflare`, `siteground`) or `None` when the page looks clean.
pub async fn detect_challenge(page: &Page) -> Option<String> {
    let value = driver::evaluate(page, DETECT_SCRIPT).await.ok()?;
    value.as_str().map(str::to_string)
}

/// Poll [`detect_challenge`] every 100 ms until the page is clean or the
/// deadline fires. Returns `true` when the challenge cleared (or never was).
pub async fn wait_for_bypass(page: &Page, max: Duration) -> bool {
    let start = std::time::Instant::now();
    loop {
        match detect_challenge(page).await {
            None => return true,
            Some(tag) => {
                if start.elapsed() >= max {
                    debug!("Challenge ({}) still present after {:?}", tag, max);
                    return false;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Fire an Escape keypress, then sweep the close-selector list for anything
/// visible and click it. Click failures are ignored.
pub async fn dismiss_modals(page: &Page) -> Result<()> {
    driver::press_key(page, "Escape").await.ok();

    let selectors_json = serde_json::to_string(CLOSE_SELECTORS)?;
    let sweep = format!(
        r#"(() => {{
            const selectors = {selectors_json};
            for (const sel of selectors) {{
                for (const el of document.querySelectorAll(sel)) {{
                    const rect = el.getBoundingClientRect();
                    const style = getComputedStyle(el);
                    if (rect.width > 0 && rect.height > 0
                        && style.visibility !== 'hidden' && style.display !== 'none') {{
                        try {{ el.click(); }} catch (_) {{}}
                        return sel;
                    }}
                }}
            }}
            return null;
        }})()"#
    );

    let start = std::time::Instant::now();
    while start.elapsed() < DISMISS_TIMEOUT {
        let clicked = driver::evaluate(page, &sweep).await.ok();
        if let Some(sel) = clicked.as_ref().and_then(|v| v.as_str()) {
            debug!("Dismissed modal via {}", sel);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_script_mentions_both_vendors() {
        assert!(DETECT_SCRIPT.contains("Just a moment..."));
        assert!(DETECT_SCRIPT.contains("_cf_chl_opt"));
        assert!(DETECT_SCRIPT.contains("/cdn-cgi/challenge-platform/"));
        assert!(DETECT_SCRIPT.contains("Robot Challenge Screen"));
        assert!(DETECT_SCRIPT.contains("sgchallenge"));
    }

    #[test]
    fn close_selector_list_is_valid_json_payload() {
        let json = serde_json::to_string(CLOSE_SELECTORS).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), CLOSE_SELECTORS.len());
    }
}
