//! Command-line front-end.
//!
//! Every subcommand is a thin forwarder to one daemon endpoint; the daemon
//! does the work and the CLI maps results to exit codes: 0 success, 1 for a
//! legitimately negative check (`exists`, `visible`, `assert`), 2 for
//! daemon-not-running, bad input, or an operational failure.

pub mod client;

use std::io::Write;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::core::config::{self, AdblockBase, LaunchOptions};
use crate::daemon;
use crate::registry::Registry;
use client::{CliError, DaemonClient};

#[derive(Parser)]
#[command(name = "br")]
#[command(about = "Browser-automation control daemon and CLI")]
#[command(version)]
pub struct Cli {
    /// Target instance name
    #[arg(long, global = true, default_value = "default")]
    pub name: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a daemon instance
    Start {
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
        /// Viewport size as WxH
        #[arg(long, default_value = "1280x720")]
        viewport: String,
        /// Enable the ad-blocker
        #[arg(long)]
        adblock: bool,
        /// Base filter level
        #[arg(long, default_value = "adsandtrackers")]
        adblock_base: String,
        /// Extra filter lists (comma-separated URLs or paths)
        #[arg(long)]
        adblock_lists: Option<String>,
        /// Stay in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
        /// Human-like pacing for navigation, clicks, and typing
        #[arg(long)]
        humanlike: bool,
    },

    /// Stop a daemon instance
    Stop {
        /// Stop every registered instance
        #[arg(long)]
        all: bool,
    },

    /// List registered instances
    #[command(alias = "ls")]
    List,

    /// Navigate the active tab
    Goto { url: String },
    /// History back
    Back,
    /// History forward
    Forward,
    /// Reload the active tab
    Reload {
        /// Bypass the cache
        #[arg(long)]
        hard: bool,
    },
    /// Clear the browser cache
    ClearCache,

    /// List tabs
    Tabs,
    /// Switch the active tab
    TabSwitch { index: usize },
    /// Open a new tab
    TabNew { url: Option<String> },
    /// Close a tab (active when no index given)
    TabClose { index: Option<usize> },

    /// Scroll an element into view
    ScrollIntoView { selector: String },
    /// Scroll to a page percentage (0-100)
    ScrollTo { percentage: f64 },
    /// Scroll down one viewport
    NextChunk,
    /// Scroll up one viewport
    PrevChunk,

    /// Set a field's value
    Fill { selector: String, text: String },
    /// Set a field's value and mask it in future HTML output
    FillSecret { selector: String, secret: String },
    /// Type into an element
    Type { selector: String, text: String },
    /// Press a key on the page
    Press { key: String },
    /// Click an element
    Click { selector: String },
    /// Find a search box, fill it, and submit
    FillSearch {
        query: String,
        #[arg(long)]
        selector: Option<String>,
    },
    /// Set a select's value
    Select { selector: String, value: String },
    /// Submit the enclosing form
    Submit { selector: String },

    /// Check element existence (exit 1 when absent)
    Exists { selector: String },
    /// Check element visibility (exit 1 when not visible)
    Visible { selector: String },
    /// Count matching elements
    Count { selector: String },
    /// Read an attribute value
    Attr { selector: String, attribute: String },

    /// Wait for a selector to become visible
    Wait {
        selector: String,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Wait for the load event
    WaitLoad,
    /// Wait for the DOM to stop mutating
    WaitStable,
    /// Wait for the network to go idle
    WaitIdle,

    /// Print the page HTML (secrets masked)
    Html {
        #[arg(long)]
        page: Option<usize>,
    },
    /// Print the joined accessibility/DOM tree
    Tree,
    /// Extract visible text
    ExtractText { selector: Option<String> },

    /// Capture a screenshot, print the file path
    Screenshot {
        #[arg(long)]
        full_page: bool,
        #[arg(long)]
        path: Option<String>,
    },
    /// Export a PDF, print the file path
    Pdf {
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
    /// Download the target of an element's href/src
    Download {
        selector: String,
        #[arg(long)]
        output: Option<String>,
    },

    /// Evaluate a script in the page
    Eval { script: String },
    /// Evaluate and assert on the result (exit 1 on failure)
    Assert {
        script: String,
        #[arg(long)]
        expected: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },

    /// Print captured console output
    Console {
        /// Comma-separated types (log,warning,error,info,debug,pageerror)
        #[arg(long)]
        r#type: Option<String>,
        /// Restrict to one tab index
        #[arg(long)]
        tab: Option<usize>,
        /// Clear after reading
        #[arg(long)]
        clear: bool,
    },
    /// Clear captured console output
    ConsoleClear,

    /// Print the action history
    History,
    /// Clear the action history
    HistoryClear,
}

/// stdout writes ignore EPIPE so `br html | head` exits clean.
fn print_line(line: &str) {
    let _ = writeln!(std::io::stdout(), "{line}");
}

fn print_json(value: &Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        print_line(&pretty);
    }
}

fn fail(err: &CliError) -> i32 {
    eprintln!("{err}");
    2
}

fn parse_viewport(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

pub async fn run(cli: Cli) -> i32 {
    let registry = Registry::open();
    let name = cli.name.clone();

    match cli.command {
        Commands::Start {
            headless,
            viewport,
            adblock,
            adblock_base,
            adblock_lists,
            foreground,
            humanlike,
        } => {
            cmd_start(
                &registry,
                &name,
                StartFlags {
                    headless,
                    viewport,
                    adblock,
                    adblock_base,
                    adblock_lists,
                    foreground,
                    humanlike,
                },
            )
            .await
        }
        Commands::Stop { all } => cmd_stop(&registry, &name, all).await,
        Commands::List => cmd_list(&registry),

        Commands::Goto { url } => forward_post(&registry, &name, "/goto", json!({"url": url})).await,
        Commands::Back => forward_post(&registry, &name, "/back", json!({})).await,
        Commands::Forward => forward_post(&registry, &name, "/forward", json!({})).await,
        Commands::Reload { hard } => {
            forward_post(&registry, &name, "/reload", json!({"hard": hard})).await
        }
        Commands::ClearCache => forward_post(&registry, &name, "/clear-cache", json!({})).await,

        Commands::Tabs => forward_get(&registry, &name, "/tabs", vec![]).await,
        Commands::TabSwitch { index } => {
            forward_post(&registry, &name, "/tabs/switch", json!({"index": index})).await
        }
        Commands::TabNew { url } => {
            forward_post(&registry, &name, "/tabs/new", json!({"url": url})).await
        }
        Commands::TabClose { index } => {
            forward_post(&registry, &name, "/tabs/close", json!({"index": index})).await
        }

        Commands::ScrollIntoView { selector } => {
            forward_post(&registry, &name, "/scroll-into-view", json!({"selector": selector})).await
        }
        Commands::ScrollTo { percentage } => {
            forward_post(&registry, &name, "/scroll-to", json!({"percentage": percentage})).await
        }
        Commands::NextChunk => forward_post(&registry, &name, "/next-chunk", json!({})).await,
        Commands::PrevChunk => forward_post(&registry, &name, "/prev-chunk", json!({})).await,

        Commands::Fill { selector, text } => {
            forward_post(&registry, &name, "/fill", json!({"selector": selector, "text": text}))
                .await
        }
        Commands::FillSecret { selector, secret } => {
            forward_post(
                &registry,
                &name,
                "/fill-secret",
                json!({"selector": selector, "secret": secret}),
            )
            .await
        }
        Commands::Type { selector, text } => {
            forward_post(&registry, &name, "/type", json!({"selector": selector, "text": text}))
                .await
        }
        Commands::Press { key } => {
            forward_post(&registry, &name, "/press", json!({"key": key})).await
        }
        Commands::Click { selector } => {
            forward_post(&registry, &name, "/click", json!({"selector": selector})).await
        }
        Commands::FillSearch { query, selector } => {
            forward_post(
                &registry,
                &name,
                "/fill-search",
                json!({"query": query, "selector": selector}),
            )
            .await
        }
        Commands::Select { selector, value } => {
            forward_post(
                &registry,
                &name,
                "/select",
                json!({"selector": selector, "value": value}),
            )
            .await
        }
        Commands::Submit { selector } => {
            forward_post(&registry, &name, "/submit", json!({"selector": selector})).await
        }

        Commands::Exists { selector } => {
            cmd_check(&registry, &name, "/exists", json!({"selector": selector})).await
        }
        Commands::Visible { selector } => {
            cmd_check(&registry, &name, "/visible", json!({"selector": selector})).await
        }
        Commands::Count { selector } => {
            forward_post(&registry, &name, "/count", json!({"selector": selector})).await
        }
        Commands::Attr { selector, attribute } => {
            forward_post(
                &registry,
                &name,
                "/attr",
                json!({"selector": selector, "attribute": attribute}),
            )
            .await
        }

        Commands::Wait { selector, timeout } => {
            forward_post(
                &registry,
                &name,
                "/wait",
                json!({"selector": selector, "timeout": timeout}),
            )
            .await
        }
        Commands::WaitLoad => forward_post(&registry, &name, "/wait-load", json!({})).await,
        Commands::WaitStable => forward_post(&registry, &name, "/wait-stable", json!({})).await,
        Commands::WaitIdle => forward_post(&registry, &name, "/wait-idle", json!({})).await,

        Commands::Html { page } => {
            let query = page.map(|p| ("page", p.to_string())).into_iter().collect();
            forward_get_text(&registry, &name, "/html", query).await
        }
        Commands::Tree => forward_get(&registry, &name, "/tree", vec![]).await,
        Commands::ExtractText { selector } => {
            match connect(&registry, &name) {
                Ok(client) => match client
                    .post_json("/extract-text", json!({"selector": selector}))
                    .await
                {
                    Ok(value) => {
                        print_line(value.get("text").and_then(|v| v.as_str()).unwrap_or_default());
                        0
                    }
                    Err(e) => fail(&e),
                },
                Err(e) => fail(&e),
            }
        }

        Commands::Screenshot { full_page, path } => {
            let mut query = vec![("fullPage", full_page.to_string())];
            if let Some(p) = path {
                query.push(("path", p));
            }
            forward_get_text(&registry, &name, "/screenshot", query).await
        }
        Commands::Pdf { format, path } => {
            let mut query = vec![];
            if let Some(f) = format {
                query.push(("format", f));
            }
            if let Some(p) = path {
                query.push(("path", p));
            }
            forward_get_text(&registry, &name, "/pdf", query).await
        }
        Commands::Download { selector, output } => {
            forward_post(
                &registry,
                &name,
                "/download",
                json!({"selector": selector, "output": output}),
            )
            .await
        }

        Commands::Eval { script } => {
            forward_post(&registry, &name, "/eval", json!({"script": script})).await
        }
        Commands::Assert {
            script,
            expected,
            message,
        } => cmd_assert(&registry, &name, script, expected, message).await,

        Commands::Console { r#type, tab, clear } => {
            let mut query = vec![];
            if let Some(t) = r#type {
                query.push(("type", t));
            }
            if let Some(t) = tab {
                query.push(("tab", t.to_string()));
            }
            if clear {
                query.push(("clear", "true".to_string()));
            }
            forward_get(&registry, &name, "/console", query).await
        }
        Commands::ConsoleClear => {
            forward_post(&registry, &name, "/console/clear", json!({})).await
        }
        Commands::History => forward_get(&registry, &name, "/history", vec![]).await,
        Commands::HistoryClear => {
            forward_post(&registry, &name, "/history/clear", json!({})).await
        }
    }
}

fn connect(registry: &Registry, name: &str) -> Result<DaemonClient, CliError> {
    DaemonClient::connect(registry, name)
}

async fn forward_post(registry: &Registry, name: &str, path: &str, body: Value) -> i32 {
    match connect(registry, name) {
        Ok(client) => match client.post_json(path, body).await {
            Ok(value) => {
                print_json(&value);
                0
            }
            Err(e) => fail(&e),
        },
        Err(e) => fail(&e),
    }
}

async fn forward_get(
    registry: &Registry,
    name: &str,
    path: &str,
    query: Vec<(&str, String)>,
) -> i32 {
    match connect(registry, name) {
        Ok(client) => match client.get_json(path, &query).await {
            Ok(value) => {
                print_json(&value);
                0
            }
            Err(e) => fail(&e),
        },
        Err(e) => fail(&e),
    }
}

async fn forward_get_text(
    registry: &Registry,
    name: &str,
    path: &str,
    query: Vec<(&str, String)>,
) -> i32 {
    match connect(registry, name) {
        Ok(client) => match client.get_text(path, &query).await {
            Ok(text) => {
                print_line(&text);
                0
            }
            Err(e) => fail(&e),
        },
        Err(e) => fail(&e),
    }
}

/// `exists` / `visible`: a false result is exit 1, not an error.
async fn cmd_check(registry: &Registry, name: &str, path: &str, body: Value) -> i32 {
    match connect(registry, name) {
        Ok(client) => match client.post_json(path, body).await {
            Ok(value) => {
                let result = value.get("result").and_then(|v| v.as_bool()).unwrap_or(false);
                print_line(if result { "true" } else { "false" });
                if result {
                    0
                } else {
                    1
                }
            }
            Err(e) => fail(&e),
        },
        Err(e) => fail(&e),
    }
}

async fn cmd_assert(
    registry: &Registry,
    name: &str,
    script: String,
    expected: Option<String>,
    message: Option<String>,
) -> i32 {
    match connect(registry, name) {
        Ok(client) => match client
            .post_json(
                "/assert",
                json!({"script": script, "expected": expected, "message": message}),
            )
            .await
        {
            Ok(value) => {
                print_json(&value);
                let pass = value.get("pass").and_then(|v| v.as_bool()).unwrap_or(false);
                if pass {
                    0
                } else {
                    1
                }
            }
            Err(e) => fail(&e),
        },
        Err(e) => fail(&e),
    }
}

struct StartFlags {
    headless: bool,
    viewport: String,
    adblock: bool,
    adblock_base: String,
    adblock_lists: Option<String>,
    foreground: bool,
    humanlike: bool,
}

async fn cmd_start(registry: &Registry, name: &str, flags: StartFlags) -> i32 {
    let mut opts = LaunchOptions::from_env();
    opts.instance = name.to_string();
    if flags.headless {
        opts.headless = true;
    }
    if flags.adblock {
        opts.adblock = true;
    }
    if flags.humanlike {
        opts.humanlike = true;
    }
    match parse_viewport(&flags.viewport) {
        Some((w, h)) => {
            opts.viewport_width = w;
            opts.viewport_height = h;
        }
        None => {
            eprintln!("Invalid --viewport '{}' (expected WxH)", flags.viewport);
            return 2;
        }
    }
    match AdblockBase::parse_str(&flags.adblock_base) {
        Some(base) => opts.adblock_base = base,
        None => {
            eprintln!(
                "Invalid --adblock-base '{}' (none|ads|adsandtrackers|full)",
                flags.adblock_base
            );
            return 2;
        }
    }
    if let Some(lists) = &flags.adblock_lists {
        let mut parsed = Vec::new();
        for item in lists.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let is_url = item.starts_with("http://") || item.starts_with("https://");
            if !is_url && !std::path::Path::new(item).exists() {
                eprintln!("Filter list not found: {item}");
                return 2;
            }
            parsed.push(item.to_string());
        }
        opts.adblock_lists = parsed;
    }

    match registry.lookup(name) {
        Ok(Some(record)) => {
            eprintln!(
                "Instance '{}' is already running on port {}",
                name, record.port
            );
            return 2;
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("{e}");
            return 2;
        }
    }

    if flags.foreground {
        match daemon::run(opts).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{e:#}");
                1
            }
        }
    } else {
        spawn_background(registry, name, &opts).await
    }
}

/// Re-execute this binary with `start --foreground` and the full option set
/// in the environment, then wait for the registry entry and a passing
/// health probe.
async fn spawn_background(registry: &Registry, name: &str, opts: &LaunchOptions) -> i32 {
    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Cannot locate own executable: {e}");
            return 2;
        }
    };

    let mut cmd = std::process::Command::new(exe);
    cmd.args(["--name", name, "start", "--foreground"])
        .env(config::ENV_INSTANCE, &opts.instance)
        .env(config::ENV_HEADLESS, if opts.headless { "1" } else { "0" })
        .env(config::ENV_VIEWPORT_WIDTH, opts.viewport_width.to_string())
        .env(config::ENV_VIEWPORT_HEIGHT, opts.viewport_height.to_string())
        .env(config::ENV_ADBLOCK, if opts.adblock { "1" } else { "0" })
        .env(config::ENV_ADBLOCK_BASE, opts.adblock_base.as_str())
        .env(config::ENV_ADBLOCK_LISTS, opts.adblock_lists.join(","))
        .env(config::ENV_HUMANLIKE, if opts.humanlike { "1" } else { "0" })
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if let Some(port) = opts.port {
        cmd.env(config::ENV_PORT, port.to_string());
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to spawn daemon: {e}");
            return 2;
        }
    };

    // Probe loop: the daemon registers itself once its HTTP server is up.
    let deadline = std::time::Instant::now() + Duration::from_secs(20);
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            eprintln!("Daemon exited during startup ({status})");
            return 2;
        }
        if let Ok(Some(record)) = registry.lookup(name) {
            if DaemonClient::for_port(record.port).health().await {
                print_line(&format!(
                    "Instance '{}' running on port {} (pid {})",
                    name, record.port, record.pid
                ));
                return 0;
            }
        }
        if std::time::Instant::now() >= deadline {
            eprintln!("Daemon did not become healthy within 20s");
            return 2;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn cmd_stop(registry: &Registry, name: &str, all: bool) -> i32 {
    let targets: Vec<(String, u16)> = if all {
        match registry.read() {
            Ok(entries) => entries.into_iter().map(|(n, r)| (n, r.port)).collect(),
            Err(e) => {
                eprintln!("{e}");
                return 2;
            }
        }
    } else {
        match registry.lookup(name) {
            Ok(Some(record)) => vec![(name.to_string(), record.port)],
            Ok(None) => {
                eprintln!("Daemon is not running");
                return 2;
            }
            Err(e) => {
                eprintln!("{e}");
                return 2;
            }
        }
    };

    if targets.is_empty() {
        print_line("No instances running");
        return 0;
    }

    let mut code = 0;
    for (instance, port) in targets {
        match DaemonClient::for_port(port)
            .post_json("/shutdown", json!({}))
            .await
        {
            Ok(_) => print_line(&format!("Stopped '{instance}'")),
            Err(e) => {
                eprintln!("Failed to stop '{instance}': {e}");
                code = 2;
            }
        }
    }
    code
}

fn cmd_list(registry: &Registry) -> i32 {
    match registry.read() {
        Ok(entries) => {
            if entries.is_empty() {
                print_line("No instances running");
                return 0;
            }
            print_line(&format!("{:<16} {:>6} {:>8}", "NAME", "PORT", "PID"));
            for (name, record) in entries {
                print_line(&format!("{:<16} {:>6} {:>8}", name, record.port, record.pid));
            }
            0
        }
        Err(e) => {
            eprintln!("{e}");
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_both_separators() {
        assert_eq!(parse_viewport("1280x720"), Some((1280, 720)));
        assert_eq!(parse_viewport("1920X1080"), Some((1920, 1080)));
        assert_eq!(parse_viewport("800 x 600"), Some((800, 600)));
        assert_eq!(parse_viewport("1280"), None);
        assert_eq!(parse_viewport("axb"), None);
    }

    #[test]
    fn cli_parses_global_name_anywhere() {
        let cli = Cli::try_parse_from(["br", "--name", "scratch", "goto", "https://example.com"])
            .unwrap();
        assert_eq!(cli.name, "scratch");
        assert!(matches!(cli.command, Commands::Goto { .. }));

        let cli = Cli::try_parse_from(["br", "exists", "#main", "--name", "other"]).unwrap();
        assert_eq!(cli.name, "other");
    }

    #[test]
    fn start_defaults_are_documented_values() {
        let cli = Cli::try_parse_from(["br", "start"]).unwrap();
        match cli.command {
            Commands::Start {
                viewport,
                adblock_base,
                headless,
                foreground,
                ..
            } => {
                assert_eq!(viewport, "1280x720");
                assert_eq!(adblock_base, "adsandtrackers");
                assert!(!headless);
                assert!(!foreground);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn ls_is_an_alias_for_list() {
        let cli = Cli::try_parse_from(["br", "ls"]).unwrap();
        assert!(matches!(cli.command, Commands::List));
    }
}
