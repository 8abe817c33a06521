//! Control channel tunables.

use std::time::Duration;

/// Tunables for the loopback control link.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the logic process's control listener.
    pub url: String,

    /// Fixed wait between reconnect attempts. Reconnection itself never
    /// gives up; this only paces it.
    pub reconnect_delay: Duration,

    /// Hard bound on the shutdown drain. Queue entries still pending
    /// when it elapses are discarded.
    pub drain_timeout: Duration,
}

impl ChannelConfig {
    /// Config pointing at a control listener on the given loopback port.
    pub fn for_port(port: u16) -> Self {
        Self {
            url: format!("ws://127.0.0.1:{port}"),
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:57017".to_string(),
            reconnect_delay: Duration::from_secs(1),
            drain_timeout: Duration::from_millis(2000),
        }
    }
}
