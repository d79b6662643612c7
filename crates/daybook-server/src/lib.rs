//! Daybook server library: router construction and shared state.

pub mod api_actions;
pub mod api_ws;
pub mod config;

use axum::{routing::get, routing::post, Extension, Json, Router};
use daybook_actions::Dispatcher;
use daybook_channels::ChannelHub;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The transactional action dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// The broadcast hub live-update clients subscribe through.
    pub hub: Arc<ChannelHub>,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/actions/{name}", post(api_actions::invoke_handler))
        .route("/ws", get(api_ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
