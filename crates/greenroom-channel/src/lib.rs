//! The control channel joining greenroom's two processes.
//!
//! The edge process holds the *client* end ([`ControlClientHandle`]): a
//! reconnect-forever dialer in front of an unbounded FIFO
//! ([`OutboundQueue`]) so control messages survive a logic-process
//! outage in order. The logic process holds the *listener* end
//! ([`ControlListenerHandle`]): a passive endpoint that tracks each edge
//! instance as a [`PeerId`] and reports its traffic and its death.
//!
//! Delivery contract: messages enqueued by one process instance arrive
//! in enqueue order, preserved across reconnects; a send that fails
//! mid-drain is retried first on the next connection.

mod client;
mod config;
mod error;
mod listener;
mod queue;

pub use client::{ControlClientHandle, ControlEvent};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use listener::{ControlListenerHandle, ListenerEvent, PeerId};
pub use queue::OutboundQueue;
