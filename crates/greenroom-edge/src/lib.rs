//! Public WebSocket front for the greenroom server.
//!
//! The edge process owns the sockets and nothing else. Session, room,
//! and auth state live in the logic process; the two talk over the
//! loopback control channel, so the logic side can restart without
//! dropping a single public connection. Frames from clients are relayed
//! as opaque blobs after one cheap check (a string `id` field); frames
//! without one are dropped silently.

mod config;
mod error;
mod server;

pub use config::EdgeConfig;
pub use error::EdgeError;
pub use server::EdgeServer;
