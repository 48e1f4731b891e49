use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port for the HTTP server
    pub port: u16,

    /// Enable promiscuous mode
    pub promiscuous: bool,

    /// Maximum bytes captured per frame
    pub snaplen: i32,

    /// Capture read timeout; bounds how long an interrupted read can block
    pub read_timeout_ms: i32,

    /// Records buffered between the capture thread and the client stream
    pub channel_capacity: usize,

    /// Idle heartbeat period on event streams, 0 disables
    pub heartbeat_secs: u64,
}

impl AppConfig {
    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            promiscuous: false,
            snaplen: 65536,
            read_timeout_ms: 250,
            channel_capacity: 1024,
            heartbeat_secs: 15,
        }
    }
}
