//! Edge-side endpoint of the control channel.
//!
//! A single actor task owns the outbound queue and the link. Dial
//! attempts, inbound frames, and commands from the handle all arrive on
//! one channel, so the actor is a plain receive loop and delivery order
//! is exactly enqueue order.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use greenroom_protocol::{self as protocol, ControlMessage, ProtocolError};

use crate::{ChannelConfig, ChannelError, OutboundQueue};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientSink = SplitSink<ClientWs, Message>;
type ClientStream = SplitStream<ClientWs>;

/// What the channel reports to its owner (the edge process).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// The loopback link is up; queued messages are being delivered.
    Connected,
    /// The loopback link went down; delivery pauses until reconnect.
    ConnectionLost,
    /// A control message arrived from the logic process.
    Message(ControlMessage),
}

enum ClientCommand {
    Enqueue(ControlMessage),
    Shutdown { reply: oneshot::Sender<()> },
}

/// Everything the actor reacts to. Commands from the handle, notices
/// from reader tasks, and dial results share one channel.
enum Input {
    Command(ClientCommand),
    DialDone(Result<ClientWs, tungstenite::Error>),
    Inbound { epoch: u64, msg: ControlMessage },
    LinkDown { epoch: u64 },
}

/// Handle to the running control channel client.
///
/// Cheap to clone; dropping every handle stops the actor without a drain.
#[derive(Clone)]
pub struct ControlClientHandle {
    inputs: mpsc::UnboundedSender<Input>,
}

impl ControlClientHandle {
    /// Spawns the client actor and starts dialing immediately.
    ///
    /// Returns the handle and the event stream. The actor retries the
    /// connection indefinitely, pacing attempts by the configured delay.
    pub fn spawn(
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = ClientActor {
            config,
            queue: OutboundQueue::new(),
            sink: None,
            epoch: 0,
            inputs: input_tx.clone(),
            events: event_tx,
        };
        tokio::spawn(actor.run(input_rx));

        (Self { inputs: input_tx }, event_rx)
    }

    /// Queues a control message for delivery, connected or not.
    pub fn enqueue(&self, msg: ControlMessage) {
        let _ = self.inputs.send(Input::Command(ClientCommand::Enqueue(msg)));
    }

    /// Delivers what it can within the drain window, then stops the
    /// actor. Entries still pending at the deadline are discarded.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inputs
            .send(Input::Command(ClientCommand::Shutdown {
                reply: reply_tx,
            }))
            .map_err(|_| ChannelError::Closed)?;
        reply_rx.await.map_err(|_| ChannelError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ClientActor {
    config: ChannelConfig,
    queue: OutboundQueue,
    /// Write half of the current link; `None` while disconnected.
    sink: Option<ClientSink>,
    /// Bumped on every teardown so notices from a stale reader task are
    /// ignored.
    epoch: u64,
    inputs: mpsc::UnboundedSender<Input>,
    events: mpsc::UnboundedSender<ControlEvent>,
}

impl ClientActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        self.spawn_dial(Duration::ZERO);

        while let Some(input) = inputs.recv().await {
            if !self.handle_input(input).await {
                return;
            }
        }
    }

    /// Returns false once the actor should stop.
    async fn handle_input(&mut self, input: Input) -> bool {
        match input {
            Input::Command(ClientCommand::Enqueue(msg)) => {
                self.queue.push_back(msg);
                if self.sink.is_some() {
                    self.drain().await;
                }
            }
            Input::Command(ClientCommand::Shutdown { reply }) => {
                self.shutdown_drain().await;
                let _ = reply.send(());
                return false;
            }
            Input::DialDone(Ok(ws)) => {
                // A dial that lands after the link was re-established
                // some other way is redundant; drop the extra socket.
                if self.sink.is_none() {
                    self.link_up(ws);
                    self.drain().await;
                }
            }
            Input::DialDone(Err(err)) => {
                tracing::debug!(
                    url = %self.config.url,
                    error = %err,
                    "control link dial failed, retrying"
                );
                self.spawn_dial(self.config.reconnect_delay);
            }
            Input::Inbound { epoch, msg } => {
                if epoch == self.epoch {
                    let _ = self.events.send(ControlEvent::Message(msg));
                }
            }
            Input::LinkDown { epoch } => {
                if epoch == self.epoch {
                    self.link_down();
                    self.spawn_dial(self.config.reconnect_delay);
                }
            }
        }
        true
    }

    /// Spawns one dial attempt after `delay`. Exactly one attempt is in
    /// flight whenever the link is down.
    fn spawn_dial(&self, delay: Duration) {
        let url = self.config.url.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result =
                connect_async(url.as_str()).await.map(|(ws, _)| ws);
            let _ = inputs.send(Input::DialDone(result));
        });
    }

    fn link_up(&mut self, ws: ClientWs) {
        let (sink, stream) = ws.split();
        self.sink = Some(sink);
        tokio::spawn(read_loop(stream, self.epoch, self.inputs.clone()));
        let _ = self.events.send(ControlEvent::Connected);
        tracing::info!(
            url = %self.config.url,
            pending = self.queue.len(),
            "control link connected"
        );
    }

    /// Tears down the current link. The caller decides whether a new
    /// dial follows (reconnect loop) or not (shutdown).
    fn link_down(&mut self) {
        if self.sink.take().is_none() {
            return;
        }
        self.epoch += 1;
        let _ = self.events.send(ControlEvent::ConnectionLost);
        tracing::warn!(
            pending = self.queue.len(),
            "control link lost, delivery paused"
        );
    }

    /// Sends queued messages in order until the queue is empty or a send
    /// fails. A failed entry goes back to the front so the next
    /// connection resumes exactly where this one stopped.
    async fn drain(&mut self) {
        while let Some(msg) = self.queue.pop_front() {
            let Some(sink) = self.sink.as_mut() else {
                self.queue.push_front(msg);
                return;
            };
            let bytes = match protocol::encode(&msg) {
                Ok(bytes) => bytes,
                Err(err) => {
                    // Our own types failing to encode is a bug; there is
                    // nothing to retry.
                    tracing::error!(
                        error = %err,
                        "dropping unencodable control message"
                    );
                    continue;
                }
            };
            if let Err(err) = sink.send(Message::Binary(bytes.into())).await
            {
                tracing::warn!(error = %err, "control link send failed");
                self.queue.push_front(msg);
                self.link_down();
                self.spawn_dial(self.config.reconnect_delay);
                return;
            }
        }
    }

    /// Best-effort delivery of the remaining queue inside the drain
    /// window, reconnecting if the link drops mid-way. Whatever is still
    /// queued at the deadline is discarded.
    async fn shutdown_drain(&mut self) {
        let deadline = Instant::now() + self.config.drain_timeout;

        while !self.queue.is_empty() && Instant::now() < deadline {
            if self.sink.is_some() {
                self.drain().await;
                continue;
            }
            tokio::time::sleep_until(
                (Instant::now() + self.config.reconnect_delay)
                    .min(deadline),
            )
            .await;
            if Instant::now() >= deadline {
                break;
            }
            match tokio::time::timeout_at(
                deadline,
                connect_async(self.config.url.as_str()),
            )
            .await
            {
                Ok(Ok((ws, _))) => self.link_up(ws),
                Ok(Err(err)) => {
                    tracing::debug!(
                        error = %err,
                        "control link dial failed during drain"
                    );
                }
                Err(_) => break,
            }
        }

        if !self.queue.is_empty() {
            tracing::warn!(
                discarded = self.queue.len(),
                "drain window elapsed, discarding control messages"
            );
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
    }
}

/// Forwards decoded frames from the logic process into the actor. A
/// frame this link cannot decode is a protocol mismatch between the two
/// processes and tears the connection down rather than being skipped.
async fn read_loop(
    mut stream: ClientStream,
    epoch: u64,
    inputs: mpsc::UnboundedSender<Input>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                match protocol::decode::<ControlMessage>(&data) {
                    Ok(msg) => {
                        if inputs
                            .send(Input::Inbound { epoch, msg })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::error!(
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
                tracing::error!(error = %err, "control link protocol violation");
                break;
            }
            // Pings and pongs are answered by the library.
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "control link read failed");
                break;
            }
        }
    }
    let _ = inputs.send(Input::LinkDown { epoch });
}
