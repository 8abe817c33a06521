//! Wire protocol for greenroom.
//!
//! This crate defines the messages both wire surfaces speak and how they
//! become bytes:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`ControlMessage`]):
//!   the public link's `id`-tagged messages and the loopback link's
//!   `type`-tagged control messages.
//! - **Codec** ([`encode`], [`decode`], [`message_id`]): MessagePack
//!   framing, identical on both links.
//! - **Errors** ([`ProtocolError`]): what can go wrong in between.
//!
//! The protocol layer knows nothing about sockets, sessions, or rooms; it
//! only turns messages into frames and back.

mod codec;
mod error;
mod types;

pub use codec::{decode, encode, message_id};
pub use error::ProtocolError;
pub use types::{
    CharacterInfo, CharacterStatus, ClientMessage, ControlMessage,
    JoinResult, OptResult, Protection, RoomInfo, ServerMessage,
};
