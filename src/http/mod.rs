//! HTTP surface of the daemon.
//!
//! Every endpoint is synchronous in the request/response sense: the response
//! is sent only after the operation completed or failed. Handlers live in
//! one module per endpoint family; shared plumbing (active page lookup,
//! selector resolution) sits in `handlers::common`.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::daemon::DaemonState;
use self::handlers::{
    console, content, export, history, interaction, lifecycle, navigation, query, scripting, tabs,
    waits,
};

pub fn build_router(daemon: Arc<DaemonState>) -> Router {
    Router::new()
        // Liveness + lifecycle
        .route("/health", get(lifecycle::health))
        .route("/shutdown", post(lifecycle::shutdown))
        // Tabs
        .route("/tabs", get(tabs::list))
        .route("/tabs/switch", post(tabs::switch))
        .route("/tabs/new", post(tabs::open))
        .route("/tabs/close", post(tabs::close))
        // Navigation
        .route("/goto", post(navigation::goto))
        .route("/back", post(navigation::back))
        .route("/forward", post(navigation::forward))
        .route("/reload", post(navigation::reload))
        .route("/clear-cache", post(navigation::clear_cache))
        // Interaction
        .route("/scroll-into-view", post(interaction::scroll_into_view))
        .route("/scroll-to", post(interaction::scroll_to))
        .route("/next-chunk", post(interaction::next_chunk))
        .route("/prev-chunk", post(interaction::prev_chunk))
        .route("/fill", post(interaction::fill))
        .route("/fill-secret", post(interaction::fill_secret))
        .route("/type", post(interaction::type_text))
        .route("/press", post(interaction::press))
        .route("/click", post(interaction::click))
        .route("/fill-search", post(interaction::fill_search))
        .route("/select", post(interaction::select_value))
        .route("/submit", post(interaction::submit))
        // Queries
        .route("/exists", post(query::exists))
        .route("/visible", post(query::visible))
        .route("/count", post(query::count))
        .route("/attr", post(query::attr))
        // Waits
        .route("/wait", post(waits::wait_for_selector))
        .route("/wait-load", post(waits::wait_load))
        .route("/wait-stable", post(waits::wait_stable))
        .route("/wait-idle", post(waits::wait_idle))
        // Content views
        .route("/html", get(content::html))
        .route("/tree", get(content::tree))
        .route("/extract-text", post(content::extract_text))
        // Exports + download
        .route("/screenshot", get(export::screenshot))
        .route("/pdf", get(export::pdf))
        .route("/download", post(export::download))
        // Scripting
        .route("/eval", post(scripting::eval))
        .route("/assert", post(scripting::assert_script))
        // Console + history
        .route("/console", get(console::list))
        .route("/console/clear", post(console::clear))
        .route("/history", get(history::list))
        .route("/history/clear", post(history::clear))
        .layer(TraceLayer::new_for_http())
        .with_state(daemon)
}
