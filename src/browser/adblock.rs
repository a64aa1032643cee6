//! Ad-block filter activator.
//!
//! The daemon does not ship a filter engine; it keeps an Aho-Corasick
//! substring matcher built from a base pattern level plus any extra lists
//! (files or URLs, one pattern per line) and attaches it to pages through
//! CDP request interception. Matching requests are failed with
//! `BlockedByClient`, everything else continues untouched.

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::core::config::AdblockBase;

const AD_PATTERNS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googletagservices.com",
    "adservice.google.",
    "amazon-adsystem.com",
    "ads.twitter.com",
    "ads.linkedin.com",
    "advertising.com",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "moatads.com",
    "adnxs.com",
];

const TRACKER_PATTERNS: &[&str] = &[
    "googletagmanager.com",
    "google-analytics.com",
    "analytics.google.com",
    "segment.com/v1/t",
    "segment.io/v1",
    "mixpanel.com/track",
    "hotjar.com",
    "mouseflow.com",
    "fullstory.com",
    "newrelic.com/",
    "nr-data.net",
];

const WIDGET_PATTERNS: &[&str] = &[
    "connect.facebook.net",
    "platform.twitter.com/widgets",
    "cookielaw.org",
    "cookiebot.com",
    "onetrust.com",
];

fn base_patterns(base: AdblockBase) -> Vec<&'static str> {
    match base {
        AdblockBase::None => Vec::new(),
        AdblockBase::Ads => AD_PATTERNS.to_vec(),
        AdblockBase::AdsAndTrackers => {
            let mut v = AD_PATTERNS.to_vec();
            v.extend_from_slice(TRACKER_PATTERNS);
            v
        }
        AdblockBase::Full => {
            let mut v = AD_PATTERNS.to_vec();
            v.extend_from_slice(TRACKER_PATTERNS);
            v.extend_from_slice(WIDGET_PATTERNS);
            v
        }
    }
}

/// Parse one filter list: one substring pattern per line, `!` and `#`
/// comment lines and blanks skipped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('!') && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Fetch an extra list from a URL or read it from disk.
async fn load_list(source: &str) -> Result<Vec<String>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let body = reqwest::get(source)
            .await
            .with_context(|| format!("Failed to fetch filter list {source}"))?
            .text()
            .await
            .with_context(|| format!("Failed to read filter list {source}"))?;
        Ok(parse_list(&body))
    } else {
        let body = tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read filter list {source}"))?;
        Ok(parse_list(&body))
    }
}

pub struct AdBlocker {
    matcher: AhoCorasick,
    pattern_count: usize,
}

impl AdBlocker {
    /// Build the matcher from a base level plus extra list sources.
    pub async fn new(base: AdblockBase, extra_lists: &[String]) -> Result<Arc<Self>> {
        let mut patterns: Vec<String> =
            base_patterns(base).into_iter().map(str::to_string).collect();
        for source in extra_lists {
            let extra = load_list(source).await?;
            info!("Loaded {} patterns from {}", extra.len(), source);
            patterns.extend(extra);
        }
        if patterns.is_empty() {
            return Err(anyhow!("Ad-block enabled but no patterns configured"));
        }
        let matcher = AhoCorasick::new(&patterns).context("Invalid ad-block pattern set")?;
        info!(
            "Ad-blocker ready: {} patterns (base {})",
            patterns.len(),
            base.as_str()
        );
        Ok(Arc::new(Self {
            matcher,
            pattern_count: patterns.len(),
        }))
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    pub fn should_block(&self, url: &str) -> bool {
        self.matcher.is_match(url)
    }

    /// Attach interception to a page. Each intercepted request is either
    /// failed with `BlockedByClient` or continued as-is; the listener task
    /// lives as long as the page does.
    pub async fn attach(self: &Arc<Self>, page: &Page) -> Result<()> {
        page.execute(FetchEnableParams::default())
            .await
            .context("Failed to enable request interception")?;

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .context("Failed to listen for intercepted requests")?;

        let blocker = Arc::clone(self);
        let page = page.clone();
        tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let result = if blocker.should_block(&event.request.url) {
                    debug!("Blocked {}", event.request.url);
                    page.execute(FailRequestParams::new(
                        request_id,
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = result {
                    // Page navigated or closed mid-flight; the stream ends soon.
                    warn!("Request interception error: {}", e);
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn base_levels_nest() {
        let ads = AdBlocker::new(AdblockBase::Ads, &[]).await.unwrap();
        let trackers = AdBlocker::new(AdblockBase::AdsAndTrackers, &[]).await.unwrap();
        let full = AdBlocker::new(AdblockBase::Full, &[]).await.unwrap();

        assert!(ads.pattern_count() < trackers.pattern_count());
        assert!(trackers.pattern_count() < full.pattern_count());

        let ad_url = "https://ad.doubleclick.net/ddm/adj/x";
        let tracker_url = "https://www.google-analytics.com/collect?v=1";
        let widget_url = "https://connect.facebook.net/en_US/sdk.js";

        assert!(ads.should_block(ad_url));
        assert!(!ads.should_block(tracker_url));
        assert!(trackers.should_block(tracker_url));
        assert!(!trackers.should_block(widget_url));
        assert!(full.should_block(widget_url));
        assert!(!full.should_block("https://example.com/index.html"));
    }

    #[tokio::test]
    async fn none_base_without_lists_is_rejected() {
        assert!(AdBlocker::new(AdblockBase::None, &[]).await.is_err());
    }

    #[tokio::test]
    async fn extra_list_files_merge_in() {
        let dir = std::env::temp_dir();
        let path = dir.join("br-adblock-test-list.txt");
        tokio::fs::write(&path, "! comment\nexample-ads.test\n\n# another\nbad.cdn.test\n")
            .await
            .unwrap();
        let blocker = AdBlocker::new(
            AdblockBase::Ads,
            &[path.to_string_lossy().to_string()],
        )
        .await
        .unwrap();
        assert!(blocker.should_block("https://example-ads.test/banner.js"));
        assert!(blocker.should_block("https://bad.cdn.test/x"));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn list_parsing_skips_comments() {
        let parsed = parse_list("! c\n  \npattern.one\n# c2\npattern.two  \n");
        assert_eq!(parsed, vec!["pattern.one", "pattern.two"]);
    }
}
