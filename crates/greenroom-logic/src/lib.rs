//! The authoritative half of the greenroom server.
//!
//! Owns every client, room, and option behind a control listener that
//! edge processes dial into. Nothing here touches a public socket: the
//! edge relays opaque frames in, and this crate's replies go back out
//! as control messages.
//!
//! State crosses process swaps as a [`ServerSnapshot`]; a replacement
//! process restores it and adopts the surviving clients when their edge
//! reconnects.

mod client;
mod config;
mod error;
mod persist;
mod room;
mod server;
mod state;

pub use client::{Client, Session};
pub use config::{AssetCatalogue, ConfigError, RoomConfig, ServerConfig};
pub use error::LogicError;
pub use persist::ServerSnapshot;
pub use room::{Room, RoomError};
pub use server::LogicServer;
pub use state::LogicState;
