//! Unified error type for the greenroom server.

use greenroom_channel::ChannelError;
use greenroom_edge::EdgeError;
use greenroom_logic::LogicError;
use greenroom_protocol::ProtocolError;

/// Top-level error that wraps all crate-specific errors.
///
/// When driving both processes through the `greenroom` meta crate, you
/// deal with this single type; `#[from]` lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GreenroomError {
    /// An edge-process error (public listener, socket registry).
    #[error(transparent)]
    Edge(#[from] EdgeError),

    /// A logic-process error (state, persistence, control listener).
    #[error(transparent)]
    Logic(#[from] LogicError),

    /// A control channel error (bind, closed link).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A wire codec error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration file could not be read.
    #[error("config file error: {0}")]
    ConfigRead(std::io::Error),

    /// The configuration file is not valid JSON.
    #[error("config file is not valid JSON: {0}")]
    ConfigParse(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_edge_error() {
        let err: GreenroomError = EdgeError::AlreadyRunning.into();
        assert!(matches!(err, GreenroomError::Edge(_)));
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_from_logic_error() {
        let err: GreenroomError = LogicError::NotRunning.into();
        assert!(matches!(err, GreenroomError::Logic(_)));
    }

    #[test]
    fn test_from_channel_error() {
        let err: GreenroomError = ChannelError::Closed.into();
        assert!(matches!(err, GreenroomError::Channel(_)));
    }
}
