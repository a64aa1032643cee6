//! Daemon lifecycle.
//!
//! Start order: ad-blocker, browser launch in a per-instance profile,
//! initial tab with console/exception listeners, registry entry, HTTP bind.
//! Shutdown (signal or `/shutdown`): close the browser, unregister, exit.
//! A browser disconnect outside of shutdown also ends the process — with
//! exit 0, the browser went away and so does the daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page;
use rand::distr::{Distribution, Uniform};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::browser::{adblock::AdBlocker, driver, Driver};
use crate::core::config::{AdblockBase, LaunchOptions};
use crate::core::state::InstanceState;
use crate::core::types::ConsoleKind;
use crate::registry::Registry;

/// Everything the request router needs, shared as `Arc<DaemonState>`.
pub struct DaemonState {
    pub opts: LaunchOptions,
    pub driver: Mutex<Driver>,
    pub state: Mutex<InstanceState>,
    pub adblocker: Option<Arc<AdBlocker>>,
    /// Serializes browser-touching endpoints; the driver is
    /// single-operation-per-tab and the daemon keeps one active tab.
    pub op_lock: Mutex<()>,
    pub shutdown_tx: mpsc::Sender<()>,
    pub shutting_down: AtomicBool,
}

impl DaemonState {
    /// Sleep a uniformly random interval when human-like mode is on.
    pub async fn maybe_delay(&self, lo_ms: u64, hi_ms: u64) {
        if !self.opts.humanlike {
            return;
        }
        let ms = {
            let mut rng = rand::rng();
            Uniform::new_inclusive(lo_ms, hi_ms)
                .map(|d| d.sample(&mut rng))
                .unwrap_or(lo_ms)
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Append a history entry for a completed side-effecting operation.
    /// Selectors stay in their original agent form; secrets are never passed
    /// here.
    pub async fn record(&self, action: &str, args: Value) {
        self.state.lock().await.append_history(action, args);
    }

    /// Register a page as a tab: apply the ad-blocker, wire console and
    /// exception listeners, and append it to the tab list as active.
    pub async fn attach_tab(self: &Arc<Self>, page: Page) -> u64 {
        let target = page.target_id().inner().clone();

        if let Some(blocker) = &self.adblocker {
            if let Err(e) = blocker.attach(&page).await {
                warn!("Ad-blocker attach failed: {}", e);
            }
        }

        let tab_id = self.state.lock().await.add_tab(page.clone(), target);
        self.spawn_console_listeners(page, tab_id).await;
        tab_id
    }

    async fn spawn_console_listeners(self: &Arc<Self>, page: Page, tab_id: u64) {
        match page.event_listener::<EventConsoleApiCalled>().await {
            Ok(mut stream) => {
                let daemon = Arc::clone(self);
                let page = page.clone();
                tokio::spawn(async move {
                    use futures::StreamExt;
                    while let Some(event) = stream.next().await {
                        let kind = console_kind(&event.r#type);
                        let text = console_text(&event);
                        let url = driver::current_url(&page).await;
                        daemon
                            .state
                            .lock()
                            .await
                            .push_console(tab_id, kind, text, url);
                    }
                });
            }
            Err(e) => warn!("Console listener attach failed: {}", e),
        }

        match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut stream) => {
                let daemon = Arc::clone(self);
                let page = page.clone();
                tokio::spawn(async move {
                    use futures::StreamExt;
                    while let Some(event) = stream.next().await {
                        let details = &event.exception_details;
                        let text = details
                            .exception
                            .as_ref()
                            .and_then(|e| e.description.clone())
                            .unwrap_or_else(|| details.text.clone());
                        let url = driver::current_url(&page).await;
                        daemon
                            .state
                            .lock()
                            .await
                            .push_console(tab_id, ConsoleKind::Pageerror, text, url);
                    }
                });
            }
            Err(e) => warn!("Exception listener attach failed: {}", e),
        }
    }

    /// Sync the tab list with the driver: attach pages the browser opened
    /// behind our back (window.open, target=_blank) and drop closed ones,
    /// compacting indices and reassigning active.
    pub async fn reconcile_tabs(self: &Arc<Self>) -> Result<()> {
        let pages = self.driver.lock().await.pages().await?;
        let mut live = Vec::with_capacity(pages.len());
        for page in pages {
            let target = page.target_id().inner().clone();
            let known = self.state.lock().await.has_target(&target);
            if !known {
                self.attach_tab(page.clone()).await;
            }
            live.push(target);
        }
        let removed = self.state.lock().await.retain_targets(&live);
        if removed > 0 {
            info!("Reconciled tabs: {} closed", removed);
        }
        Ok(())
    }
}

fn console_kind(kind: &ConsoleApiCalledType) -> ConsoleKind {
    match kind {
        ConsoleApiCalledType::Warning => ConsoleKind::Warning,
        ConsoleApiCalledType::Error => ConsoleKind::Error,
        ConsoleApiCalledType::Info => ConsoleKind::Info,
        ConsoleApiCalledType::Debug => ConsoleKind::Debug,
        _ => ConsoleKind::Log,
    }
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| match &arg.value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => arg.description.clone().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the daemon in the foreground until shutdown.
pub async fn run(opts: LaunchOptions) -> Result<()> {
    let registry = Registry::open();

    let adblocker = if opts.adblock && opts.adblock_base != AdblockBase::None {
        Some(AdBlocker::new(opts.adblock_base, &opts.adblock_lists).await?)
    } else {
        None
    };

    let user_data_dir = opts.user_data_dir();
    let (driver, mut disconnect_rx) = Driver::launch(&opts, &user_data_dir).await?;

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let daemon = Arc::new(DaemonState {
        opts: opts.clone(),
        driver: Mutex::new(driver),
        state: Mutex::new(InstanceState::new()),
        adblocker,
        op_lock: Mutex::new(()),
        shutdown_tx,
        shutting_down: AtomicBool::new(false),
    });

    // Initial tab. The browser may restore one from the profile; reconcile
    // picks those up, otherwise open a blank page.
    daemon.reconcile_tabs().await?;
    if daemon.state.lock().await.tab_count() == 0 {
        let page = daemon.driver.lock().await.new_page("about:blank").await?;
        daemon.attach_tab(page).await;
    }

    let port = match opts.port {
        Some(p) => p,
        None => registry.allocate_port()?,
    };
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    registry.register(&opts.instance, port, std::process::id())?;
    info!("Instance '{}' running on port {}", opts.instance, port);

    let app = crate::http::build_router(Arc::clone(&daemon));

    let browser_gone = Arc::new(AtomicBool::new(false));
    let shutdown_fut = {
        let browser_gone = Arc::clone(&browser_gone);
        let daemon = Arc::clone(&daemon);
        async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).ok();
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = async {
                        match sigterm.as_mut() {
                            Some(s) => { s.recv().await; }
                            None => futures::future::pending::<()>().await,
                        }
                    } => {},
                    _ = shutdown_rx.recv() => {},
                    _ = &mut disconnect_rx => {
                        browser_gone.store(true, Ordering::SeqCst);
                    },
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = shutdown_rx.recv() => {},
                    _ = &mut disconnect_rx => {
                        browser_gone.store(true, Ordering::SeqCst);
                    },
                }
            }
            daemon.shutting_down.store(true, Ordering::SeqCst);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_fut)
        .await?;

    if browser_gone.load(Ordering::SeqCst) {
        info!("Browser disconnected; shutting down");
    } else {
        daemon.driver.lock().await.close().await;
    }
    registry.unregister(&opts.instance)?;
    info!("Instance '{}' stopped", opts.instance);
    Ok(())
}
