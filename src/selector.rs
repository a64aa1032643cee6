//! Selector token classification.
//!
//! Agents address elements three ways: a numeric ID from the last tree view,
//! an XPath, or a CSS selector. Classification is deterministic, first match
//! wins, and numeric IDs are resolved against the ID→XPath map produced by
//! the most recent tree build.

use std::collections::HashMap;

use crate::core::error::ApiError;

/// A classified selector token. Numeric IDs carry the XPath they resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id { id: u64, xpath: String },
    Xpath(String),
    Css(String),
}

impl Selector {
    /// The driver-facing query string for this selector.
    pub fn query(&self) -> &str {
        match self {
            Self::Id { xpath, .. } => xpath,
            Self::Xpath(xpath) => xpath,
            Self::Css(css) => css,
        }
    }

    /// True when the query string must be evaluated as an XPath.
    pub fn is_xpath(&self) -> bool {
        matches!(self, Self::Id { .. } | Self::Xpath(_))
    }
}

/// Classify a raw token against the current ID→XPath map.
///
/// A token that parses as a decimal number is always an ID attempt; an ID
/// missing from the map is a caller error, not a CSS fallback — stale IDs
/// after DOM mutations surface here.
pub fn classify(token: &str, id_map: &HashMap<u64, String>) -> Result<Selector, ApiError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::bad_request("empty selector"));
    }

    if let Ok(id) = token.parse::<u64>() {
        return match id_map.get(&id) {
            Some(xpath) => Ok(Selector::Id {
                id,
                xpath: xpath.clone(),
            }),
            None => Err(ApiError::UnknownId { id }),
        };
    }

    if let Some(stripped) = token.strip_prefix("xpath=") {
        return Ok(Selector::Xpath(stripped.to_string()));
    }
    if token.starts_with('/') || token.starts_with('(') {
        return Ok(Selector::Xpath(token.to_string()));
    }

    Ok(Selector::Css(token.to_string()))
}

/// JavaScript expression resolving this selector to an array of elements
/// inside the page, using the query primitive that matches the
/// classification (XPath never goes through `querySelector`).
pub fn js_query_all(selector: &Selector) -> String {
    let query = serde_json::to_string(selector.query()).unwrap_or_else(|_| "\"\"".to_string());
    if selector.is_xpath() {
        format!(
            "(() => {{ const out = []; \
             const it = document.evaluate({query}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             for (let i = 0; i < it.snapshotLength; i++) out.push(it.snapshotItem(i)); \
             return out; }})()"
        )
    } else {
        format!("Array.from(document.querySelectorAll({query}))")
    }
}

/// Like [`js_query_all`] but resolving to the first match or `null`.
pub fn js_query_one(selector: &Selector) -> String {
    let query = serde_json::to_string(selector.query()).unwrap_or_else(|_| "\"\"".to_string());
    if selector.is_xpath() {
        format!(
            "document.evaluate({query}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        )
    } else {
        format!("document.querySelector({query})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(id: u64, xpath: &str) -> HashMap<u64, String> {
        let mut m = HashMap::new();
        m.insert(id, xpath.to_string());
        m
    }

    #[test]
    fn numeric_token_resolves_through_map() {
        let map = map_with(42, "/html/body");
        let sel = classify("42", &map).unwrap();
        assert_eq!(
            sel,
            Selector::Id {
                id: 42,
                xpath: "/html/body".into()
            }
        );
        assert_eq!(sel.query(), "/html/body");
        assert!(sel.is_xpath());
    }

    #[test]
    fn numeric_token_without_mapping_is_an_error() {
        let map = map_with(1, "/html");
        let err = classify("42", &map).unwrap_err();
        assert!(err.to_string().contains("XPath not found for ID 42"));
    }

    #[test]
    fn css_token_stays_css() {
        let sel = classify("button.submit", &HashMap::new()).unwrap();
        assert_eq!(sel, Selector::Css("button.submit".into()));
        assert!(!sel.is_xpath());
    }

    #[test]
    fn xpath_forms_are_detected() {
        let map = HashMap::new();
        assert_eq!(
            classify("//button[1]", &map).unwrap(),
            Selector::Xpath("//button[1]".into())
        );
        assert_eq!(
            classify("(//a)[2]", &map).unwrap(),
            Selector::Xpath("(//a)[2]".into())
        );
        assert_eq!(
            classify("xpath=//input", &map).unwrap(),
            Selector::Xpath("//input".into())
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(classify("  ", &HashMap::new()).is_err());
    }

    #[test]
    fn js_queries_pick_the_right_primitive() {
        let css = classify("#main a", &HashMap::new()).unwrap();
        assert!(js_query_all(&css).contains("querySelectorAll"));
        assert!(js_query_one(&css).contains("querySelector"));

        let xp = classify("/html/body/ul/li[2]", &HashMap::new()).unwrap();
        assert!(js_query_all(&xp).contains("document.evaluate"));
        assert!(js_query_one(&xp).contains("document.evaluate"));
    }
}
