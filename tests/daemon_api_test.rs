//! End-to-end tests against the real router with a live Chromium.
//!
//! These need a Chrome/Chromium binary on the machine, so they are ignored
//! by default. Run with: cargo test -- --ignored

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

use br::browser::Driver;
use br::core::config::LaunchOptions;
use br::core::state::InstanceState;
use br::daemon::DaemonState;

struct TestDaemon {
    daemon: Arc<DaemonState>,
    router: Router,
    _profile: tempfile::TempDir,
}

async fn setup() -> TestDaemon {
    let opts = LaunchOptions {
        headless: true,
        ..LaunchOptions::default()
    };
    let profile = tempfile::TempDir::new().expect("temp profile dir");
    let (driver, _disconnect) = Driver::launch(&opts, profile.path())
        .await
        .expect("browser launch (is Chrome installed?)");

    let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
    let daemon = Arc::new(DaemonState {
        opts,
        driver: Mutex::new(driver),
        state: Mutex::new(InstanceState::new()),
        adblocker: None,
        op_lock: Mutex::new(()),
        shutdown_tx,
        shutting_down: AtomicBool::new(false),
    });

    daemon.reconcile_tabs().await.expect("initial reconcile");
    if daemon.state.lock().await.tab_count() == 0 {
        let page = daemon
            .driver
            .lock()
            .await
            .new_page("about:blank")
            .await
            .expect("initial tab");
        daemon.attach_tab(page).await;
    }

    let router = br::http::build_router(Arc::clone(&daemon));
    TestDaemon {
        daemon,
        router,
        _profile: profile,
    }
}

async fn post(router: &Router, path: &str, body: Value) -> (StatusCode, String) {
    let req = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

async fn get(router: &Router, path: &str) -> (StatusCode, String) {
    let req = Request::get(path).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

fn data_url(html: &str) -> String {
    format!("data:text/html,{}", html.replace('#', "%23"))
}

async fn navigate(td: &TestDaemon, html: &str) {
    let (status, body) = post(&td.router, "/goto", json!({"url": data_url(html)})).await;
    assert_eq!(status, StatusCode::OK, "goto failed: {body}");
}

#[tokio::test]
#[ignore]
async fn health_returns_ok() {
    let td = setup().await;
    let (status, body) = get(&td.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
#[ignore]
async fn download_decodes_data_urls() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body><a id="dl-link" href="data:text/plain;base64,SGVsbG8gV29ybGQ=">x</a></body></html>"#,
    )
    .await;

    let (status, body) = post(&td.router, "/download", json!({"selector": "#dl-link"})).await;
    assert_eq!(status, StatusCode::OK, "download failed: {body}");
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["size"], 11);
    assert_eq!(resp["url"], "data:text/plain;base64,SGVsbG8gV29ybGQ=");

    let path = resp["path"].as_str().unwrap();
    let contents = std::fs::read_to_string(path).unwrap();
    assert_eq!(contents, "Hello World");
}

#[tokio::test]
#[ignore]
async fn download_without_source_is_a_caller_error() {
    let td = setup().await;
    navigate(&td, r#"<html><body><span id="no-href">x</span></body></html>"#).await;

    let (status, body) = post(&td.router, "/download", json!({"selector": "#no-href"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("no href or src"), "body: {body}");
}

#[tokio::test]
#[ignore]
async fn secrets_are_masked_in_html_and_absent_from_history() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body><input id="pwd" type="text"></body></html>"#,
    )
    .await;

    let (status, _) = post(
        &td.router,
        "/fill-secret",
        json!({"selector": "#pwd", "secret": "hunter2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Reflect the value into the document so /html would otherwise echo it.
    let (status, _) = post(
        &td.router,
        "/eval",
        json!({"script": "document.getElementById('pwd').setAttribute('value', document.getElementById('pwd').value)"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, html) = get(&td.router, "/html").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!html.contains("hunter2"), "secret leaked: {html}");
    assert!(html.contains("***"));

    let (_, history) = get(&td.router, "/history").await;
    assert!(!history.contains("hunter2"));
}

#[tokio::test]
#[ignore]
async fn tree_assigns_sibling_indexed_xpaths() {
    let td = setup().await;
    navigate(&td, "<html><body><ul><li>a</li><li>b</li></ul></body></html>").await;

    let (status, body) = get(&td.router, "/tree").await;
    assert_eq!(status, StatusCode::OK, "tree failed: {body}");
    let resp: Value = serde_json::from_str(&body).unwrap();

    let mut xpaths = Vec::new();
    collect_xpaths(&resp["tree"], &mut xpaths);
    assert!(
        xpaths.iter().any(|x| x == "/html/body/ul/li[1]"),
        "xpaths: {xpaths:?}"
    );
    assert!(xpaths.iter().any(|x| x == "/html/body/ul/li[2]"));
}

fn collect_xpaths(node: &Value, out: &mut Vec<String>) {
    if let Some(x) = node["xpath"].as_str() {
        out.push(x.to_string());
    }
    if let Some(children) = node["children"].as_array() {
        for child in children {
            collect_xpaths(child, out);
        }
    }
}

#[tokio::test]
#[ignore]
async fn numeric_ids_resolve_like_their_xpath() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body><button onclick="this.dataset.hit = (+this.dataset.hit || 0) + 1">go</button></body></html>"#,
    )
    .await;

    let (status, body) = get(&td.router, "/tree").await;
    assert_eq!(status, StatusCode::OK);
    let resp: Value = serde_json::from_str(&body).unwrap();

    let button = find_node(&resp["tree"], "button").expect("button node in tree");
    let id = button["id"].as_u64().unwrap();
    let xpath = button["xpath"].as_str().unwrap().to_string();

    let (status, _) = post(&td.router, "/click", json!({"selector": id.to_string()})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&td.router, "/click", json!({"selector": xpath})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post(
        &td.router,
        "/eval",
        json!({"script": "document.querySelector('button').dataset.hit"}),
    )
    .await;
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["result"], "2");
}

fn find_node<'a>(node: &'a Value, role: &str) -> Option<&'a Value> {
    if node["role"].as_str() == Some(role) {
        return Some(node);
    }
    node["children"]
        .as_array()?
        .iter()
        .find_map(|c| find_node(c, role))
}

#[tokio::test]
#[ignore]
async fn stale_numeric_id_is_a_caller_error() {
    let td = setup().await;
    navigate(&td, "<html><body><p>text</p></body></html>").await;

    let (status, body) = post(&td.router, "/click", json!({"selector": "424242"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("XPath not found for ID 424242"), "body: {body}");
}

#[tokio::test]
#[ignore]
async fn assert_compares_stringified_results() {
    let td = setup().await;
    navigate(&td, "<html><body></body></html>").await;

    let (status, body) = post(
        &td.router,
        "/assert",
        json!({"script": "1+1", "expected": "2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["pass"], true);
    assert_eq!(resp["actual"], "2");
    assert_eq!(resp["expected"], "2");

    let (status, body) = post(
        &td.router,
        "/assert",
        json!({"script": "1+1", "expected": "3"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["pass"], false);
}

#[tokio::test]
#[ignore]
async fn exists_and_visible_report_without_erroring() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body><div id="shown">x</div><div id="hidden" style="display:none">y</div></body></html>"#,
    )
    .await;

    let (status, body) = post(&td.router, "/exists", json!({"selector": "#shown"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("true"));

    let (status, body) = post(&td.router, "/exists", json!({"selector": "#missing"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("false"));

    let (_, body) = post(&td.router, "/visible", json!({"selector": "#hidden"})).await;
    assert!(body.contains("false"));

    let (_, body) = post(&td.router, "/count", json!({"selector": "div"})).await;
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["count"], 2);
}

#[tokio::test]
#[ignore]
async fn console_capture_survives_until_navigation() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body><script>console.log('from page'); console.error('bad thing')</script></body></html>"#,
    )
    .await;

    // Console events arrive asynchronously from the CDP stream.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let (status, body) = get(&td.router, "/console").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("from page"), "console: {body}");
    assert!(body.contains("bad thing"));

    let (_, body) = get(&td.router, "/console?type=error").await;
    assert!(body.contains("bad thing"));
    assert!(!body.contains("from page"));

    // Navigating the tab clears its entries.
    navigate(&td, "<html><body>empty</body></html>").await;
    let (_, body) = get(&td.router, "/console").await;
    assert!(!body.contains("from page"), "console after nav: {body}");
}

#[tokio::test]
#[ignore]
async fn tab_lifecycle_compacts_indices() {
    let td = setup().await;
    navigate(&td, "<html><body>first</body></html>").await;

    let (status, body) = post(&td.router, "/tabs/new", json!({})).await;
    assert_eq!(status, StatusCode::OK, "tabs/new failed: {body}");
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["index"], 1);

    let (_, body) = get(&td.router, "/tabs").await;
    let tabs: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(tabs.as_array().unwrap().len(), 2);
    assert_eq!(tabs[1]["isActive"], true);

    let (status, _) = post(&td.router, "/tabs/close", json!({"index": 1})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&td.router, "/tabs").await;
    let tabs: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(tabs.as_array().unwrap().len(), 1);
    assert_eq!(tabs[0]["index"], 0);
    assert_eq!(tabs[0]["isActive"], true);

    let (status, body) = post(&td.router, "/tabs/switch", json!({"index": 5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("out of range"));

    // State cross-check through the daemon handle.
    assert_eq!(td.daemon.state.lock().await.tab_count(), 1);
}

#[tokio::test]
#[ignore]
async fn fill_and_select_round_trip_values() {
    let td = setup().await;
    navigate(
        &td,
        r#"<html><body>
            <input id="field" type="text">
            <select id="pick"><option value="a">A</option><option value="b">B</option></select>
        </body></html>"#,
    )
    .await;

    let (status, _) = post(
        &td.router,
        "/fill",
        json!({"selector": "#field", "text": "typed value"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post(
        &td.router,
        "/eval",
        json!({"script": "document.getElementById('field').value"}),
    )
    .await;
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["result"], "typed value");

    let (status, body) = post(
        &td.router,
        "/select",
        json!({"selector": "#pick", "value": "b"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["value"], "b");
}

#[tokio::test]
#[ignore]
async fn extract_text_returns_visible_text() {
    let td = setup().await;
    navigate(
        &td,
        "<html><body><main><p>alpha</p><p>beta</p></main></body></html>",
    )
    .await;

    let (status, body) = post(&td.router, "/extract-text", json!({"selector": "p"})).await;
    assert_eq!(status, StatusCode::OK);
    let resp: Value = serde_json::from_str(&body).unwrap();
    let text = resp["text"].as_str().unwrap();
    assert!(text.contains("alpha"));
    assert!(text.contains("beta"));
}
