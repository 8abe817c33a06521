//! Error type for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(rmp_serde::encode::Error),

    /// Deserialization failed: malformed, truncated, or wrong-shaped
    /// input for the expected message type.
    #[error("decode failed: {0}")]
    Decode(rmp_serde::decode::Error),

    /// The frame decoded but violates the protocol, e.g. a text frame on
    /// a link that only carries binary MessagePack.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
