//! Error type for the logic process.

use greenroom_channel::ChannelError;
use greenroom_protocol::ProtocolError;

/// Errors surfaced by the logic server and its persistence helpers.
#[derive(Debug, thiserror::Error)]
pub enum LogicError {
    #[error("logic server is already running")]
    AlreadyRunning,

    #[error("logic server is not running")]
    NotRunning,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("persistence file error: {0}")]
    Io(#[from] std::io::Error),
}
