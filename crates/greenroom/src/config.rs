//! Combined configuration for both processes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use greenroom_channel::ChannelConfig;
use greenroom_edge::EdgeConfig;
use greenroom_logic::ServerConfig;

use crate::error::GreenroomError;

/// One JSON file configures the whole deployment: the public port for
/// the edge, the loopback control port joining the two processes, and
/// the logic-process options. Every field is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Public WebSocket port served by the edge process.
    pub port: u16,
    /// Loopback port for the control channel.
    pub ipc_port: u16,
    /// Logic-process options, flattened beside the ports.
    #[serde(flatten)]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 27017,
            ipc_port: 57017,
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads a JSON config file.
    pub async fn load(path: &Path) -> Result<Self, GreenroomError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(GreenroomError::ConfigRead)?;
        let config =
            serde_json::from_str(&text).map_err(GreenroomError::ConfigParse)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn edge_config(&self) -> EdgeConfig {
        EdgeConfig::for_port(self.port)
    }

    /// Control channel config for the edge side of the loopback link.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::for_port(self.ipc_port)
    }

    /// Bind address for the logic side of the loopback link.
    pub fn control_bind_addr(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }
}
