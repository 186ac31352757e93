//! HTTP surface: the webhook endpoint and a health check

pub mod health;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

pub use health::root;
pub use webhook::{ERROR_IN_GET_DATA, ERROR_IN_PARSING, HookAck, handle_webhook};

/// Router with the webhook endpoint mounted at `notify_path`.
pub fn build_router(state: SharedState, notify_path: &str) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route(notify_path, routing::post(handle_webhook))
        .with_state(state)
}
