//! Integration tests: this file plays the edge, driving a running
//! logic server over a real control connection.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_bytes::ByteBuf;
use sha2::Sha256;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use greenroom_channel::{ChannelConfig, ControlClientHandle, ControlEvent};
use greenroom_logic::{LogicError, LogicServer, ServerConfig};
use greenroom_protocol::{
    self as protocol, ClientMessage, ControlMessage, JoinResult,
    ServerMessage,
};

const WAIT: Duration = Duration::from_secs(5);
const FIRST_ROOM: &str = "The First Room";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config(port: u16) -> ChannelConfig {
    ChannelConfig {
        reconnect_delay: Duration::from_millis(50),
        drain_timeout: Duration::from_millis(500),
        ..ChannelConfig::for_port(port)
    }
}

async fn start_logic(config: ServerConfig) -> (LogicServer, u16) {
    let mut server = LogicServer::new(config, "127.0.0.1:0");
    server.start().await.expect("logic server starts");
    let port = server.local_addr().expect("running").port();
    (server, port)
}

/// Dials the control listener and waits for the link to come up.
async fn connect_edge(
    port: u16,
) -> (ControlClientHandle, UnboundedReceiver<ControlEvent>) {
    let (edge, mut events) = ControlClientHandle::spawn(fast_config(port));
    assert_eq!(next_event(&mut events).await, ControlEvent::Connected);
    (edge, events)
}

async fn next_event(
    events: &mut UnboundedReceiver<ControlEvent>,
) -> ControlEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a control event")
        .expect("control client stopped")
}

/// Next control message, skipping link transitions.
async fn next_control(
    events: &mut UnboundedReceiver<ControlEvent>,
) -> ControlMessage {
    loop {
        match next_event(events).await {
            ControlEvent::Message(msg) => return msg,
            ControlEvent::Connected | ControlEvent::ConnectionLost => {}
        }
    }
}

/// Next targeted reply, decoded.
async fn next_reply(
    events: &mut UnboundedReceiver<ControlEvent>,
) -> (String, ServerMessage) {
    match next_control(events).await {
        ControlMessage::ClientData { client, data } => (
            client,
            protocol::decode(&data).expect("reply decodes"),
        ),
        other => panic!("expected client-data, got {other:?}"),
    }
}

fn client_connect(edge: &ControlClientHandle, conn_id: &str) {
    edge.enqueue(ControlMessage::ClientConnect {
        client: conn_id.to_string(),
    });
}

fn client_send(edge: &ControlClientHandle, conn_id: &str, msg: &ClientMessage) {
    edge.enqueue(ControlMessage::ClientData {
        client: conn_id.to_string(),
        data: ByteBuf::from(protocol::encode(msg).expect("message encodes")),
    });
}

/// Runs the challenge dance for a passwordless server.
async fn join_server(
    edge: &ControlClientHandle,
    events: &mut UnboundedReceiver<ControlEvent>,
    conn_id: &str,
) {
    client_send(edge, conn_id, &ClientMessage::InfoBasic);
    let (target, reply) = next_reply(events).await;
    assert_eq!(target, conn_id);
    let ServerMessage::InfoBasic { auth_challenge, .. } = reply else {
        panic!("expected info-basic, got {reply:?}");
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(&auth_challenge).unwrap();
    mac.update(b"");
    let response = ByteBuf::from(mac.finalize().into_bytes().to_vec());
    client_send(
        edge,
        conn_id,
        &ClientMessage::JoinServer {
            name: Some("Tester".to_string()),
            auth_response: Some(response),
        },
    );
    let (target, reply) = next_reply(events).await;
    assert_eq!(target, conn_id);
    assert_eq!(
        reply,
        ServerMessage::JoinServer {
            result: JoinResult::Success,
            message: None,
        }
    );
}

async fn join_room(
    edge: &ControlClientHandle,
    events: &mut UnboundedReceiver<ControlEvent>,
    conn_id: &str,
    character: Option<&str>,
) {
    client_send(
        edge,
        conn_id,
        &ClientMessage::JoinRoom {
            room_id: FIRST_ROOM.to_string(),
            character: character.map(str::to_string),
        },
    );
    let (target, reply) = next_reply(events).await;
    assert_eq!(target, conn_id);
    assert_eq!(
        reply,
        ServerMessage::JoinRoom {
            result: JoinResult::Success,
        }
    );
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn test_start_while_running_fails() {
    let (mut server, _port) = start_logic(ServerConfig::default()).await;
    assert!(matches!(
        server.start().await,
        Err(LogicError::AlreadyRunning)
    ));
    server.stop().await.expect("server stops");
}

#[tokio::test]
async fn test_stop_while_stopped_fails() {
    let mut server = LogicServer::new(ServerConfig::default(), "127.0.0.1:0");
    assert!(matches!(server.stop().await, Err(LogicError::NotRunning)));
}

#[tokio::test]
async fn test_restart_reuses_the_control_port() {
    let (mut server, port) = start_logic(ServerConfig::default()).await;
    server.stop().await.expect("first stop");

    let mut second =
        LogicServer::new(ServerConfig::default(), &format!("127.0.0.1:{port}"));
    second.start().await.expect("rebinds the same port");
    second.stop().await.expect("second stop");
}

// ===========================================================================
// Wire round trips
// ===========================================================================

#[tokio::test]
async fn test_info_basic_round_trips_the_wire() {
    let (mut server, port) = start_logic(ServerConfig::default()).await;
    let (edge, mut events) = connect_edge(port).await;

    client_connect(&edge, "10.0.0.1:5000");
    client_send(&edge, "10.0.0.1:5000", &ClientMessage::InfoBasic);

    let (target, reply) = next_reply(&mut events).await;
    assert_eq!(target, "10.0.0.1:5000");
    match reply {
        ServerMessage::InfoBasic {
            name,
            player_count,
            rooms,
            ..
        } => {
            assert_eq!(name, "Test server");
            assert_eq!(player_count, 0);
            assert_eq!(rooms.len(), 2);
        }
        other => panic!("expected info-basic, got {other:?}"),
    }

    edge.shutdown().await.expect("edge shuts down");
    server.stop().await.expect("server stops");
}

#[tokio::test]
async fn test_room_traffic_relays_to_every_member() {
    let (mut server, port) = start_logic(ServerConfig::default()).await;
    let (edge, mut events) = connect_edge(port).await;

    for conn_id in ["c-a", "c-b"] {
        client_connect(&edge, conn_id);
        join_server(&edge, &mut events, conn_id).await;
        join_room(&edge, &mut events, conn_id, None).await;
    }
    assert_eq!(server.player_count().await.expect("count"), 2);

    let frame = protocol::encode(&ClientMessage::Ooc {
        message: "hello room".to_string(),
    })
    .expect("ooc encodes");
    edge.enqueue(ControlMessage::ClientData {
        client: "c-a".to_string(),
        data: ByteBuf::from(frame.clone()),
    });

    let mut targets = Vec::new();
    for _ in 0..2 {
        match next_control(&mut events).await {
            ControlMessage::ClientData { client, data } => {
                assert_eq!(data.as_ref(), frame.as_slice());
                targets.push(client);
            }
            other => panic!("expected a relay, got {other:?}"),
        }
    }
    targets.sort_unstable();
    assert_eq!(targets, ["c-a", "c-b"]);

    edge.shutdown().await.expect("edge shuts down");
    server.stop().await.expect("server stops");
}

#[tokio::test]
async fn test_protocol_violation_requests_a_disconnect() {
    let (mut server, port) = start_logic(ServerConfig::default()).await;
    let (edge, mut events) = connect_edge(port).await;

    // chars before join-server is out of protocol.
    client_connect(&edge, "c-x");
    client_send(
        &edge,
        "c-x",
        &ClientMessage::Chars {
            room_id: FIRST_ROOM.to_string(),
        },
    );

    let (target, reply) = next_reply(&mut events).await;
    assert_eq!(target, "c-x");
    assert_eq!(
        reply,
        ServerMessage::Disconnect {
            message: Some("Client error - not authenticated.".to_string()),
        }
    );
    assert_eq!(
        next_control(&mut events).await,
        ControlMessage::ClientDisconnect {
            client: "c-x".to_string(),
        }
    );

    // The edge confirms the close; the server stays healthy for others.
    edge.enqueue(ControlMessage::ClientDisconnect {
        client: "c-x".to_string(),
    });
    client_connect(&edge, "c-y");
    client_send(&edge, "c-y", &ClientMessage::InfoBasic);
    let (target, reply) = next_reply(&mut events).await;
    assert_eq!(target, "c-y");
    assert!(matches!(reply, ServerMessage::InfoBasic { .. }));

    edge.shutdown().await.expect("edge shuts down");
    server.stop().await.expect("server stops");
}

#[tokio::test]
async fn test_broadcast_reaches_the_edge() {
    let (mut server, port) = start_logic(ServerConfig::default()).await;
    let (edge, mut events) = connect_edge(port).await;

    server
        .broadcast(ServerMessage::Event {
            payload: serde_json::json!({ "event": "announcement" }),
        })
        .expect("broadcast queues");

    match next_control(&mut events).await {
        ControlMessage::ClientBroadcast { data } => {
            let msg: ServerMessage =
                protocol::decode(&data).expect("broadcast decodes");
            assert!(matches!(msg, ServerMessage::Event { .. }));
        }
        other => panic!("expected client-broadcast, got {other:?}"),
    }

    edge.shutdown().await.expect("edge shuts down");
    server.stop().await.expect("server stops");
}

// ===========================================================================
// Hot swap
// ===========================================================================

#[tokio::test]
async fn test_hot_swap_preserves_sessions() {
    let (mut first, port) = start_logic(ServerConfig::default()).await;
    let (edge, mut events) = connect_edge(port).await;

    client_connect(&edge, "c-a");
    join_server(&edge, &mut events, "c-a").await;
    join_room(&edge, &mut events, "c-a", Some("phoenix")).await;

    let path = std::env::temp_dir()
        .join(format!("greenroom-swap-{}.bin", std::process::id()));
    first.persist_to(&path).await.expect("snapshot persists");
    first.stop().await.expect("first generation stops");

    // Replacement process on the same port; the edge reconnects on its
    // own and the restored client is adopted.
    let mut second =
        LogicServer::new(ServerConfig::default(), &format!("127.0.0.1:{port}"));
    second.start().await.expect("replacement starts");
    second.restore_from(&path).await.expect("snapshot restores");
    let _ = tokio::fs::remove_file(&path).await;

    loop {
        match next_event(&mut events).await {
            ControlEvent::Connected => break,
            ControlEvent::ConnectionLost => {}
            ControlEvent::Message(msg) => {
                panic!("unexpected message during the swap: {msg:?}")
            }
        }
    }

    assert_eq!(second.player_count().await.expect("count"), 1);

    // The seat works without a fresh join.
    let frame = protocol::encode(&ClientMessage::Ooc {
        message: "still here".to_string(),
    })
    .expect("ooc encodes");
    edge.enqueue(ControlMessage::ClientData {
        client: "c-a".to_string(),
        data: ByteBuf::from(frame.clone()),
    });
    match next_control(&mut events).await {
        ControlMessage::ClientData { client, data } => {
            assert_eq!(client, "c-a");
            assert_eq!(data.as_ref(), frame.as_slice());
        }
        other => panic!("expected the relay, got {other:?}"),
    }

    edge.shutdown().await.expect("edge shuts down");
    second.stop().await.expect("replacement stops");
}
