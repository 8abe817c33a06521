//! Logic-side endpoint of the control channel.
//!
//! A passive listening socket. Each accepted connection is one edge
//! process instance, tracked by a [`PeerId`]; the listener never dials
//! and never retries. Outbound traffic is broadcast to every peer; an
//! edge that does not hold the named connection ignores it.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use greenroom_protocol::{self as protocol, ControlMessage, ProtocolError};

use crate::ChannelError;

type PeerSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type PeerStream = SplitStream<WebSocketStream<TcpStream>>;

/// Identifier for one accepted control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Mostly for tests and fixtures; live ids come from the listener.
impl From<u64> for PeerId {
    fn from(id: u64) -> Self {
        PeerId(id)
    }
}

/// What the listener reports to its owner (the logic process).
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// An edge process connected.
    PeerConnected(PeerId),
    /// A decoded control message from a peer.
    Message(PeerId, ControlMessage),
    /// The peer's connection closed, which is the signal for bulk
    /// cleanup of every client that peer owned.
    PeerDisconnected(PeerId),
}

enum Input {
    Broadcast(ControlMessage),
    Shutdown { reply: oneshot::Sender<()> },
    PeerUp { id: PeerId, writer: mpsc::UnboundedSender<Message> },
    PeerFrame { id: PeerId, msg: ControlMessage },
    PeerGone { id: PeerId },
}

/// Handle to the running control listener.
#[derive(Clone)]
pub struct ControlListenerHandle {
    inputs: mpsc::UnboundedSender<Input>,
    local_addr: SocketAddr,
}

impl ControlListenerHandle {
    /// Binds the listener and spawns its actor.
    ///
    /// Returns the handle and the event stream. Bind to port 0 to let
    /// the OS pick a port; [`local_addr`](Self::local_addr) reports it.
    pub async fn bind(
        addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ListenerEvent>), ChannelError>
    {
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(ChannelError::Bind)?;
        let local_addr = tcp.local_addr().map_err(ChannelError::Bind)?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let accept = tokio::spawn(accept_loop(tcp, input_tx.clone()));
        let actor = ListenerActor {
            peers: HashMap::new(),
            events: event_tx,
            accept,
        };
        tokio::spawn(actor.run(input_rx));

        tracing::info!(%local_addr, "control listener bound");
        Ok((
            Self {
                inputs: input_tx,
                local_addr,
            },
            event_rx,
        ))
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Encodes a control message once and sends it to every peer.
    pub fn broadcast(&self, msg: ControlMessage) {
        let _ = self.inputs.send(Input::Broadcast(msg));
    }

    /// Closes every peer connection and stops accepting.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inputs
            .send(Input::Shutdown { reply: reply_tx })
            .map_err(|_| ChannelError::Closed)?;
        reply_rx.await.map_err(|_| ChannelError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ListenerActor {
    peers: HashMap<PeerId, mpsc::UnboundedSender<Message>>,
    events: mpsc::UnboundedSender<ListenerEvent>,
    accept: tokio::task::JoinHandle<()>,
}

impl ListenerActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inputs.recv().await {
            match input {
                Input::PeerUp { id, writer } => {
                    self.peers.insert(id, writer);
                    let _ =
                        self.events.send(ListenerEvent::PeerConnected(id));
                }
                Input::PeerFrame { id, msg } => {
                    let _ =
                        self.events.send(ListenerEvent::Message(id, msg));
                }
                Input::PeerGone { id } => {
                    if self.peers.remove(&id).is_some() {
                        tracing::info!(peer = %id, "control peer disconnected");
                        let _ = self
                            .events
                            .send(ListenerEvent::PeerDisconnected(id));
                    }
                }
                Input::Broadcast(msg) => self.broadcast(msg),
                Input::Shutdown { reply } => {
                    // The port must be free when the reply lands, so
                    // wait for the aborted accept task to be dropped.
                    self.accept.abort();
                    let _ = (&mut self.accept).await;
                    for (_, writer) in self.peers.drain() {
                        let _ = writer.send(Message::Close(None));
                    }
                    let _ = reply.send(());
                    return;
                }
            }
        }
        // Every handle dropped without an explicit shutdown.
        self.accept.abort();
    }

    fn broadcast(&self, msg: ControlMessage) {
        let bytes = match protocol::encode(&msg) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "dropping unencodable control message"
                );
                return;
            }
        };
        let frame = Message::Binary(bytes.into());
        for writer in self.peers.values() {
            let _ = writer.send(frame.clone());
        }
    }
}

async fn accept_loop(
    tcp: TcpListener,
    inputs: mpsc::UnboundedSender<Input>,
) {
    let mut next_id: u64 = 1;
    loop {
        let (stream, remote) = match tcp.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "control accept failed");
                continue;
            }
        };
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    %remote,
                    "control handshake failed"
                );
                continue;
            }
        };

        let id = PeerId(next_id);
        next_id += 1;

        let (sink, stream) = ws.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(sink, writer_rx));

        // Register the peer before its reader starts so no frame can
        // overtake the connected notice.
        if inputs
            .send(Input::PeerUp {
                id,
                writer: writer_tx,
            })
            .is_err()
        {
            return;
        }
        tokio::spawn(peer_read_loop(stream, id, inputs.clone()));
        tracing::info!(peer = %id, %remote, "control peer connected");
    }
}

/// Feeds outbound frames to one peer socket. Ends when the actor drops
/// the sender or after a close frame goes out.
async fn write_loop(
    mut sink: PeerSink,
    mut frames: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(frame) = frames.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if sink.send(frame).await.is_err() || closing {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Forwards decoded frames from one peer into the actor. Undecodable
/// traffic from the edge process is a protocol mismatch: the connection
/// is dropped, which the logic process treats like an edge crash.
async fn peer_read_loop(
    mut stream: PeerStream,
    id: PeerId,
    inputs: mpsc::UnboundedSender<Input>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                match protocol::decode::<ControlMessage>(&data) {
                    Ok(msg) => {
                        if inputs
                            .send(Input::PeerFrame { id, msg })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            peer = %id,
                            error = %err,
                            "undecodable frame on control link"
                        );
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_)) => {
                let err = ProtocolError::InvalidMessage(
                    "text frame on control link".to_string(),
                );
                tracing::error!(
                    peer = %id,
                    error = %err,
                    "control link protocol violation"
                );
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    peer = %id,
                    error = %err,
                    "control link read failed"
                );
                break;
            }
        }
    }
    let _ = inputs.send(Input::PeerGone { id });
}
