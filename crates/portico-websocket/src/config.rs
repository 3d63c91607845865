//! WebSocket portal configuration.

use std::time::Duration;

/// Configuration for [`crate::WebSocketPortal`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// Envelope-level keepalive cadence; `None` disables the keepalive task.
    pub ping_interval: Option<Duration>,
    /// Connections with no inbound activity for this long are torn down.
    pub idle_timeout: Duration,
    /// Deadline for a single inbound handler execution.
    pub handler_timeout: Option<Duration>,
    /// How long an outbound call waits for its correlated reply.
    pub call_timeout: Duration,
    /// Capacity of the per-connection outgoing frame queue.
    pub outgoing_buffer: usize,
    /// Largest accepted frame, in bytes.
    pub max_message_size: usize,
    /// `Origin` values accepted at upgrade; empty allows all.
    pub allowed_origins: Vec<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ping_interval: Some(Duration::from_secs(30)),
            idle_timeout: Duration::from_secs(90),
            handler_timeout: Some(Duration::from_secs(30)),
            call_timeout: Duration::from_secs(30),
            outgoing_buffer: 256,
            max_message_size: 1 << 20,
            allowed_origins: Vec::new(),
        }
    }
}

impl WsConfig {
    pub(crate) fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_admits_everyone() {
        let config = WsConfig::default();
        assert!(config.origin_allowed(None));
        assert!(config.origin_allowed(Some("https://anywhere.example")));
    }

    #[test]
    fn allowlist_filters_origins() {
        let config = WsConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..Default::default()
        };
        assert!(config.origin_allowed(Some("https://app.example")));
        assert!(!config.origin_allowed(Some("https://evil.example")));
        // Non-browser clients send no Origin header at all.
        assert!(config.origin_allowed(None));
    }
}
