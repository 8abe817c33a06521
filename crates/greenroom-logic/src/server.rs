//! The logic server actor.
//!
//! One task owns the whole [`LogicState`]; everything reaches it through
//! a single input channel, either as a control listener event or as a
//! command from the owning process. After every event the actor drains
//! the state's outbox onto the control channel.

use std::net::SocketAddr;
use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use greenroom_channel::{ChannelError, ControlListenerHandle, ListenerEvent};
use greenroom_protocol::ServerMessage;

use crate::config::ServerConfig;
use crate::error::LogicError;
use crate::persist::{self, ServerSnapshot};
use crate::state::LogicState;

enum Input {
    Event(ListenerEvent),
    Command(Command),
}

enum Command {
    Snapshot { reply: oneshot::Sender<ServerSnapshot> },
    Restore { snapshot: ServerSnapshot, reply: oneshot::Sender<()> },
    Broadcast(ServerMessage),
    PlayerCount { reply: oneshot::Sender<usize> },
    Stop { reply: oneshot::Sender<()> },
}

/// The authoritative half of the server: session, room, and option
/// state behind a control listener that edge processes dial into.
///
/// Starting after a stop begins from configuration again; state crosses
/// process generations through [`snapshot`](Self::snapshot) and
/// [`restore`](Self::restore), not through the listener.
pub struct LogicServer {
    config: ServerConfig,
    bind_addr: String,
    running: Option<Running>,
}

struct Running {
    inputs: mpsc::UnboundedSender<Input>,
    local_addr: SocketAddr,
}

impl LogicServer {
    pub fn new(config: ServerConfig, bind_addr: &str) -> Self {
        Self {
            config,
            bind_addr: bind_addr.to_string(),
            running: None,
        }
    }

    /// Binds the control listener and spawns the state actor.
    pub async fn start(&mut self) -> Result<(), LogicError> {
        if self.running.is_some() {
            return Err(LogicError::AlreadyRunning);
        }

        let (listener, events) =
            ControlListenerHandle::bind(&self.bind_addr).await?;
        let local_addr = listener.local_addr();

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_listener_events(events, input_tx.clone()));
        let actor = LogicActor {
            state: LogicState::new(self.config.clone()),
            listener,
        };
        tokio::spawn(actor.run(input_rx));

        self.running = Some(Running {
            inputs: input_tx,
            local_addr,
        });
        tracing::info!(%local_addr, "logic server started");
        Ok(())
    }

    /// Stops the actor and closes the control listener.
    pub async fn stop(&mut self) -> Result<(), LogicError> {
        let running = self.running.take().ok_or(LogicError::NotRunning)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        running
            .inputs
            .send(Input::Command(Command::Stop { reply: reply_tx }))
            .map_err(|_| LogicError::Channel(ChannelError::Closed))?;
        reply_rx
            .await
            .map_err(|_| LogicError::Channel(ChannelError::Closed))?;
        tracing::info!("logic server stopped");
        Ok(())
    }

    /// The control listener's bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Current state as a snapshot, suitable for [`restore`](Self::restore)
    /// in a replacement process.
    pub async fn snapshot(&self) -> Result<ServerSnapshot, LogicError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::Snapshot { reply: reply_tx })?;
        reply_rx
            .await
            .map_err(|_| LogicError::Channel(ChannelError::Closed))
    }

    /// Replaces the running state with a snapshot's.
    pub async fn restore(
        &self,
        snapshot: ServerSnapshot,
    ) -> Result<(), LogicError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::Restore {
            snapshot,
            reply: reply_tx,
        })?;
        reply_rx
            .await
            .map_err(|_| LogicError::Channel(ChannelError::Closed))
    }

    /// Queues a message for every connected client.
    pub fn broadcast(&self, msg: ServerMessage) -> Result<(), LogicError> {
        self.send_command(Command::Broadcast(msg))
    }

    /// Clients currently seated in a room.
    pub async fn player_count(&self) -> Result<usize, LogicError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::PlayerCount { reply: reply_tx })?;
        reply_rx
            .await
            .map_err(|_| LogicError::Channel(ChannelError::Closed))
    }

    /// Snapshots the running state and writes it to disk.
    pub async fn persist_to(&self, path: &Path) -> Result<(), LogicError> {
        let snapshot = self.snapshot().await?;
        persist::save(path, &snapshot).await
    }

    /// Loads a snapshot from disk into the running state.
    pub async fn restore_from(&self, path: &Path) -> Result<(), LogicError> {
        let snapshot = persist::load(path).await?;
        self.restore(snapshot).await
    }

    fn send_command(&self, command: Command) -> Result<(), LogicError> {
        let running = self.running.as_ref().ok_or(LogicError::NotRunning)?;
        running
            .inputs
            .send(Input::Command(command))
            .map_err(|_| LogicError::Channel(ChannelError::Closed))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct LogicActor {
    state: LogicState,
    listener: ControlListenerHandle,
}

impl LogicActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Event(event) => {
                    self.handle_event(event);
                    self.flush();
                }
                Input::Command(Command::Snapshot { reply }) => {
                    let _ = reply.send(self.state.snapshot());
                }
                Input::Command(Command::Restore { snapshot, reply }) => {
                    self.state.restore(snapshot);
                    let _ = reply.send(());
                }
                Input::Command(Command::Broadcast(msg)) => {
                    self.state.broadcast(&msg);
                    self.flush();
                }
                Input::Command(Command::PlayerCount { reply }) => {
                    let _ = reply.send(self.state.player_count());
                }
                Input::Command(Command::Stop { reply }) => {
                    if let Err(err) = self.listener.shutdown().await {
                        tracing::debug!(
                            error = %err,
                            "control listener already gone"
                        );
                    }
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    fn handle_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::PeerConnected(peer) => {
                self.state.handle_peer_connected(peer);
            }
            ListenerEvent::Message(peer, msg) => {
                self.state.handle_control(peer, msg);
            }
            ListenerEvent::PeerDisconnected(peer) => {
                self.state.handle_peer_disconnected(peer);
            }
        }
    }

    /// Hands everything the handlers queued to the control channel.
    /// Targeted messages go to every peer; edges ignore ids they do not
    /// hold.
    fn flush(&mut self) {
        for msg in self.state.drain_outbox() {
            self.listener.broadcast(msg);
        }
    }
}

async fn pump_listener_events(
    mut events: mpsc::UnboundedReceiver<ListenerEvent>,
    inputs: mpsc::UnboundedSender<Input>,
) {
    while let Some(event) = events.recv().await {
        if inputs.send(Input::Event(event)).is_err() {
            return;
        }
    }
}
