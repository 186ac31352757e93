pub mod agent;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod targets;
pub mod webhook;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use dispatch::DispatchQueue;
use targets::TargetStore;

pub use agent::{Environment, HookAgent};
pub use error::{RelayError, Result};

pub struct AppState {
    pub queue: DispatchQueue,
    pub targets: Arc<TargetStore>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(queue: DispatchQueue, targets: Arc<TargetStore>) -> Self {
        Self {
            queue,
            targets,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
