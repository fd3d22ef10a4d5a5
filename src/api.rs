//! HTTP surface: Telegram webhook and health checks

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`, if configured
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(runtime: Arc<RuntimeManager>, webhook_secret: Option<String>) -> Self {
        Self {
            runtime,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}
