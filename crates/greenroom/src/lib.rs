//! # Greenroom
//!
//! Room-based chat server split into two cooperating processes: an
//! **edge** that owns the public WebSockets and a **logic** process
//! that owns every session, room, and option. A loopback control
//! channel joins them, so the logic side can be stopped, upgraded, and
//! restarted while every public connection stays open.
//!
//! This crate ties the pieces together: combined configuration, a
//! unified error type, re-exports of the per-process servers, and the
//! `greenroom` binary that runs either process (or both).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use greenroom::{AppConfig, EdgeServer, GreenroomError, LogicServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GreenroomError> {
//!     let config = AppConfig::default();
//!
//!     let mut logic = LogicServer::new(
//!         config.server.clone(),
//!         &config.control_bind_addr(),
//!     );
//!     logic.start().await?;
//!
//!     let mut edge =
//!         EdgeServer::new(config.edge_config(), config.channel_config());
//!     edge.start().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;

pub use config::AppConfig;
pub use error::GreenroomError;

pub use greenroom_channel::{
    ChannelConfig, ChannelError, ControlClientHandle, ControlEvent,
    ControlListenerHandle, ListenerEvent, PeerId,
};
pub use greenroom_edge::{EdgeConfig, EdgeError, EdgeServer};
pub use greenroom_logic::{
    Client, LogicError, LogicServer, LogicState, RoomConfig, ServerConfig,
    ServerSnapshot, Session,
};
pub use greenroom_protocol::{
    decode, encode, message_id, CharacterInfo, CharacterStatus,
    ClientMessage, ControlMessage, JoinResult, OptResult, ProtocolError,
    Protection, RoomInfo, ServerMessage,
};
