//! MessagePack codec shared by the public and loopback links.
//!
//! Frames are encoded with named fields (`to_vec_named`) so every message
//! is a self-describing map and the `id`/`type` tag is an ordinary string
//! key a client in any language can read.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ProtocolError;

/// Serializes a message into one MessagePack frame.
///
/// # Errors
/// Returns [`ProtocolError::Encode`] if serialization fails, which for
/// the message types in this crate indicates a bug rather than bad input.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    rmp_serde::to_vec_named(value).map_err(ProtocolError::Encode)
}

/// Deserializes one MessagePack frame.
///
/// # Errors
/// Returns [`ProtocolError::Decode`] for malformed, truncated, or
/// wrong-shaped input. Callers on the public link drop such frames;
/// callers on the loopback link treat them as fatal for the connection.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    rmp_serde::from_slice(data).map_err(ProtocolError::Decode)
}

/// Minimal view of a public frame: just the `id` tag.
#[derive(Deserialize)]
struct FrameProbe {
    id: String,
}

/// Reads the `id` tag of a public frame without decoding the rest.
///
/// Returns `None` when the frame is not a map carrying a string `id`;
/// the edge process uses this to drop junk before it ever crosses the
/// loopback link.
pub fn message_id(data: &[u8]) -> Option<String> {
    decode::<FrameProbe>(data).ok().map(|probe| probe.id)
}

// =========================================================================
// Tests
// =========================================================================
