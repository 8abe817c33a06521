//! Error type for the control channel layer.

/// Errors surfaced by the control channel endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The control listener could not bind its address.
    #[error("control listener bind failed: {0}")]
    Bind(std::io::Error),

    /// The actor behind this handle has already stopped.
    #[error("control channel is closed")]
    Closed,
}
