pub mod handlers;
pub mod routes;
pub mod sse;

use std::sync::Arc;

use crate::capture::manager::SessionManager;
use crate::capture::source::CaptureSource;
use crate::models::config::AppConfig;

/// Shared state handed to every request handler
pub struct AppState {
    pub config: AppConfig,

    pub sessions: SessionManager,

    /// Device access for listing interfaces and opening captures
    pub source: Arc<dyn CaptureSource>,
}

impl AppState {
    pub fn new(config: AppConfig, source: Arc<dyn CaptureSource>) -> Self {
        Self {
            config,
            sessions: SessionManager::new(),
            source,
        }
    }
}
