//! The edge process: a public WebSocket listener wired to the control
//! channel client.
//!
//! The edge holds no session state. Each public socket gets a
//! connection id, well-formed frames are forwarded to the logic process
//! as opaque blobs, and whatever comes back is written to the named
//! socket. One actor task owns the socket registry; readers, writers,
//! the accept loop, and the control event pump all feed it through a
//! single channel.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_bytes::ByteBuf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use greenroom_channel::{
    ChannelConfig, ChannelError, ControlClientHandle, ControlEvent,
};
use greenroom_protocol::{self as protocol, ControlMessage};

use crate::{EdgeConfig, EdgeError};

type PublicWs = WebSocketStream<TcpStream>;
type PublicSink = SplitSink<PublicWs, Message>;
type PublicStream = SplitStream<PublicWs>;

/// Everything the edge actor reacts to.
enum Input {
    SocketUp {
        id: String,
        writer: mpsc::UnboundedSender<Message>,
    },
    SocketFrame {
        id: String,
        data: Vec<u8>,
    },
    SocketGone {
        id: String,
    },
    Control(ControlEvent),
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Public-facing half of the server pair.
///
/// Lifecycle is guarded: `start` on a running server and `stop` on a
/// stopped one both fail without side effects.
pub struct EdgeServer {
    config: EdgeConfig,
    channel: ChannelConfig,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    inputs: mpsc::UnboundedSender<Input>,
}

impl EdgeServer {
    /// Creates a stopped edge server.
    pub fn new(config: EdgeConfig, channel: ChannelConfig) -> Self {
        Self {
            config,
            channel,
            running: None,
        }
    }

    /// Binds the public listener and starts dialing the logic process.
    pub async fn start(&mut self) -> Result<(), EdgeError> {
        if self.running.is_some() {
            return Err(EdgeError::AlreadyRunning);
        }

        let tcp = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(EdgeError::Bind)?;
        let local_addr = tcp.local_addr().map_err(EdgeError::Bind)?;

        let (control, control_events) =
            ControlClientHandle::spawn(self.channel.clone());
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let accept = tokio::spawn(accept_loop(tcp, input_tx.clone()));
        tokio::spawn(pump_control_events(control_events, input_tx.clone()));

        let actor = EdgeActor {
            sockets: HashMap::new(),
            control,
            accept,
        };
        tokio::spawn(actor.run(input_rx));

        tracing::info!(%local_addr, "edge server started");
        self.running = Some(Running {
            local_addr,
            inputs: input_tx,
        });
        Ok(())
    }

    /// Stops accepting, closes every public connection, then drains the
    /// control channel within its shutdown window.
    pub async fn stop(&mut self) -> Result<(), EdgeError> {
        let running = self.running.take().ok_or(EdgeError::NotRunning)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        running
            .inputs
            .send(Input::Stop { reply: reply_tx })
            .map_err(|_| EdgeError::Channel(ChannelError::Closed))?;
        reply_rx
            .await
            .map_err(|_| EdgeError::Channel(ChannelError::Closed))?;
        tracing::info!("edge server stopped");
        Ok(())
    }

    /// Address of the public listener while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Whether `start` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct EdgeActor {
    /// Write half of every open public socket, keyed by connection id.
    sockets: HashMap<String, mpsc::UnboundedSender<Message>>,
    control: ControlClientHandle,
    accept: JoinHandle<()>,
}

impl EdgeActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inputs.recv().await {
            if let Input::Stop { reply } = input {
                self.stop(&mut inputs).await;
                let _ = reply.send(());
                return;
            }
            self.handle_input(input);
        }
        // Every handle dropped without an explicit stop.
        self.accept.abort();
    }

    /// Ordered teardown: close every public socket, wait for each close
    /// to land, then hand the pending queue to the channel's bounded
    /// drain.
    async fn stop(&mut self, inputs: &mut mpsc::UnboundedReceiver<Input>) {
        // The port must be free when stop returns, so wait for the
        // aborted accept task to be dropped.
        self.accept.abort();
        let _ = (&mut self.accept).await;
        tracing::info!(open = self.sockets.len(), "closing public connections");
        for writer in self.sockets.values() {
            let _ = writer.send(Message::Close(None));
        }
        while !self.sockets.is_empty() {
            let Some(input) = inputs.recv().await else { break };
            self.handle_input(input);
        }
        if let Err(err) = self.control.shutdown().await {
            tracing::warn!(error = %err, "control channel already closed");
        }
    }

    fn handle_input(&mut self, input: Input) {
        match input {
            Input::SocketUp { id, writer } => {
                tracing::info!(client = %id, "public client connected");
                self.sockets.insert(id.clone(), writer);
                self.control
                    .enqueue(ControlMessage::ClientConnect { client: id });
            }
            Input::SocketFrame { id, data } => {
                self.control.enqueue(ControlMessage::ClientData {
                    client: id,
                    data: ByteBuf::from(data),
                });
            }
            Input::SocketGone { id } => {
                if self.sockets.remove(&id).is_some() {
                    tracing::info!(client = %id, "public client disconnected");
                    self.control
                        .enqueue(ControlMessage::ClientDisconnect { client: id });
                }
            }
            Input::Control(event) => self.handle_control(event),
            // A second stop cannot arrive; the owning server consumes
            // its handle on the first one.
            Input::Stop { .. } => {}
        }
    }

    fn handle_control(&mut self, event: ControlEvent) {
        let msg = match event {
            // Link transitions only pause delivery; nothing to do here.
            ControlEvent::Connected | ControlEvent::ConnectionLost => return,
            ControlEvent::Message(msg) => msg,
        };
        match msg {
            ControlMessage::ClientData { client, data } => {
                // Unknown ids are expected: the socket may have closed
                // while the reply was in flight.
                if let Some(writer) = self.sockets.get(&client) {
                    let _ = writer.send(Message::Binary(data.into_vec().into()));
                }
            }
            ControlMessage::ClientDisconnect { client } => {
                // Close the socket; the reader's gone notice does the
                // registry cleanup and tells the logic process.
                if let Some(writer) = self.sockets.get(&client) {
                    let _ = writer.send(Message::Close(None));
                }
            }
            ControlMessage::ClientBroadcast { data } => {
                let frame = Message::Binary(data.into_vec().into());
                for writer in self.sockets.values() {
                    let _ = writer.send(frame.clone());
                }
            }
            ControlMessage::ClientConnect { client } => {
                tracing::debug!(%client, "ignoring client-connect from logic");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Socket plumbing
// ---------------------------------------------------------------------------

async fn pump_control_events(
    mut events: mpsc::UnboundedReceiver<ControlEvent>,
    inputs: mpsc::UnboundedSender<Input>,
) {
    while let Some(event) = events.recv().await {
        if inputs.send(Input::Control(event)).is_err() {
            return;
        }
    }
}

async fn accept_loop(tcp: TcpListener, inputs: mpsc::UnboundedSender<Input>) {
    loop {
        let (stream, remote) = match tcp.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "public accept failed");
                continue;
            }
        };
        let id = remote.to_string();
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                tracing::warn!(
                    client = %id,
                    error = %err,
                    "public handshake failed"
                );
                continue;
            }
        };

        let (sink, stream) = ws.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(sink, writer_rx));

        // Register the socket before its reader starts so no frame can
        // overtake the connect notice.
        if inputs
            .send(Input::SocketUp {
                id: id.clone(),
                writer: writer_tx,
            })
            .is_err()
        {
            return;
        }
        tokio::spawn(socket_read_loop(stream, id, inputs.clone()));
    }
}

/// Feeds outbound frames to one public socket. Ends when the actor
/// drops the sender or after a close frame goes out.
async fn write_loop(
    mut sink: PublicSink,
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

/// Reads one public socket. Only binary frames carrying a string `id`
/// are forwarded; everything else is dropped without a reply.
async fn socket_read_loop(
    mut stream: PublicStream,
    id: String,
    inputs: mpsc::UnboundedSender<Input>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                if protocol::message_id(&data).is_none() {
                    tracing::debug!(
                        client = %id,
                        "dropping frame without a message id"
                    );
                    continue;
                }
                let frame = Input::SocketFrame {
                    id: id.clone(),
                    data: data.to_vec(),
                };
                if inputs.send(frame).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_)) => {
                tracing::debug!(client = %id, "dropping text frame");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    client = %id,
                    error = %err,
                    "public socket error"
                );
                break;
            }
        }
    }
    let _ = inputs.send(Input::SocketGone { id });
}
