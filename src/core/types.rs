use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Session state records ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    pub index: usize,
    pub title: String,
    pub url: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Log,
    Warning,
    Error,
    Info,
    Debug,
    Pageerror,
}

impl ConsoleKind {
    pub fn parse_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "log" => Some(Self::Log),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "pageerror" => Some(Self::Pageerror),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    #[serde(rename = "type")]
    pub kind: ConsoleKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    #[serde(rename = "tabIndex")]
    pub tab_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub args: Value,
    pub timestamp: DateTime<Utc>,
}

/// One node of the joined accessibility/DOM view. `tag` is wrapped in
/// angle brackets (`<ul>`) when the backing DOM element is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: u64,
    pub role: String,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub xpath: Option<String>,
    pub children: Vec<TreeNode>,
}

// ── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GotoRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Deserialize)]
pub struct SwitchTabRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct NewTabRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseTabRequest {
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SelectorRequest {
    pub selector: String,
}

#[derive(Debug, Deserialize)]
pub struct ScrollToRequest {
    pub percentage: f64,
}

#[derive(Debug, Deserialize)]
pub struct FillRequest {
    pub selector: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FillSecretRequest {
    pub selector: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct TypeRequest {
    pub selector: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PressRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct FillSearchRequest {
    pub query: String,
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub selector: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct AttrRequest {
    pub selector: String,
    pub attribute: String,
}

#[derive(Debug, Deserialize)]
pub struct WaitRequest {
    pub selector: String,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractTextRequest {
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub selector: String,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvalRequest {
    pub script: String,
}

#[derive(Debug, Deserialize)]
pub struct AssertRequest {
    pub script: String,
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsoleQuery {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub tab: Option<usize>,
    #[serde(default)]
    pub clear: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HtmlQuery {
    #[serde(default)]
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ScreenshotQuery {
    #[serde(default, rename = "fullPage")]
    pub full_page: Option<bool>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PdfQuery {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

// ── Response bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoolResponse {
    pub result: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FillSearchResponse {
    pub selector: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreeResponse {
    pub tree: TreeNode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractTextResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub path: String,
    pub size: usize,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvalResponse {
    pub result: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertResponse {
    pub pass: bool,
    pub actual: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TabOpenedResponse {
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}
