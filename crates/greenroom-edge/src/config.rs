//! Settings for the public listener.

/// Where the edge process accepts public WebSocket connections.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Bind address for the public listener, e.g. `0.0.0.0:27017`.
    pub bind_addr: String,
}

impl EdgeConfig {
    /// Listens on every interface at the given port.
    pub fn for_port(port: u16) -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
        }
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self::for_port(27017)
    }
}

// =========================================================================
// Tests
// =========================================================================
