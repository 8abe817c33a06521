//! Error type for the edge process.

use greenroom_channel::ChannelError;

/// Errors surfaced by [`EdgeServer`](crate::EdgeServer).
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    /// `start` was called while the listener is live.
    #[error("edge server is already running")]
    AlreadyRunning,

    /// `stop` was called without a matching `start`.
    #[error("edge server is not running")]
    NotRunning,

    /// The public listener could not bind its address.
    #[error("public listener bind failed: {0}")]
    Bind(std::io::Error),

    /// The control channel side failed underneath us.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
