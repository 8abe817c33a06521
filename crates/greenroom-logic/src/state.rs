//! The session store, room registry, and message dispatcher.
//!
//! [`LogicState`] is plain data owned by one actor task. Handlers never
//! touch a socket: replies and disconnect requests are pushed onto an
//! outbox of control messages that the server actor drains to the
//! control listener after every event. That keeps every rule in this
//! file synchronous and directly testable.

use std::collections::HashMap;

use serde_bytes::ByteBuf;

use greenroom_channel::PeerId;
use greenroom_protocol::{
    self as protocol, ClientMessage, ControlMessage, JoinResult, OptResult,
    RoomInfo, ServerMessage,
};

use crate::client::{Client, Session};
use crate::config::ServerConfig;
use crate::persist::ServerSnapshot;
use crate::room::Room;

// Disconnect reasons sent to clients that are out of protocol sync.
const ERR_NOT_AUTHENTICATED: &str = "Client error - not authenticated.";
const ERR_ROOM_NOT_FOUND: &str =
    "Client error - could not find the given room.";
const ERR_ROOM_DOES_NOT_EXIST: &str = "Client error - room does not exist.";
const ERR_ALREADY_IN_ROOM: &str =
    "Client error - cannot join room while already in a room.";

/// Authoritative server state: every client, every room, the live
/// configuration, and the outbox of control messages produced by the
/// handlers.
pub struct LogicState {
    config: ServerConfig,
    clients: HashMap<String, Client>,
    rooms: HashMap<String, Room>,
    /// Connected control peers, oldest first.
    peers: Vec<PeerId>,
    outbox: Vec<ControlMessage>,
}

impl LogicState {
    pub fn new(config: ServerConfig) -> Self {
        let rooms = build_rooms(&config);
        Self {
            config,
            clients: HashMap::new(),
            rooms,
            peers: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Clients currently seated in a room.
    pub fn player_count(&self) -> usize {
        self.clients
            .values()
            .filter(|client| client.session.is_some())
            .count()
    }

    pub fn client(&self, conn_id: &str) -> Option<&Client> {
        self.clients.get(conn_id)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Takes everything the handlers queued since the last drain, in
    /// production order.
    pub fn drain_outbox(&mut self) -> Vec<ControlMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Queues a server message for every connected client.
    pub fn broadcast(&mut self, msg: &ServerMessage) {
        match protocol::encode(msg) {
            Ok(bytes) => self.outbox.push(ControlMessage::ClientBroadcast {
                data: ByteBuf::from(bytes),
            }),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode broadcast");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Control channel events
    // -----------------------------------------------------------------------

    pub fn handle_control(&mut self, peer: PeerId, msg: ControlMessage) {
        match msg {
            ControlMessage::ClientConnect { client } => {
                self.handle_client_connect(peer, &client);
            }
            ControlMessage::ClientDisconnect { client } => {
                self.handle_client_disconnect(&client);
            }
            ControlMessage::ClientData { client, data } => {
                self.handle_client_data(&client, &data);
            }
            ControlMessage::ClientBroadcast { .. } => {
                tracing::debug!(%peer, "ignoring client-broadcast from an edge");
            }
        }
    }

    pub fn handle_client_connect(&mut self, peer: PeerId, conn_id: &str) {
        if self.clients.contains_key(conn_id) {
            tracing::warn!(
                client = %conn_id,
                "duplicate connection id, replacing the old client"
            );
            self.cleanup_client(conn_id);
        }
        let privileged = self.config.developer;
        self.clients.insert(
            conn_id.to_string(),
            Client::new(conn_id, privileged, peer),
        );
        tracing::info!(client = %conn_id, %peer, "client connected");
    }

    pub fn handle_client_disconnect(&mut self, conn_id: &str) {
        self.cleanup_client(conn_id);
    }

    pub fn handle_peer_connected(&mut self, peer: PeerId) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
        self.adopt_orphans(peer);
    }

    /// An edge went away: every client it carried is gone with it.
    pub fn handle_peer_disconnected(&mut self, peer: PeerId) {
        self.peers.retain(|known| *known != peer);
        let doomed: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, client)| client.ipc_origin == Some(peer))
            .map(|(conn_id, _)| conn_id.clone())
            .collect();
        if doomed.is_empty() {
            return;
        }
        tracing::warn!(
            %peer,
            clients = doomed.len(),
            "edge connection lost, dropping its clients"
        );
        for conn_id in doomed {
            self.cleanup_client(&conn_id);
        }
    }

    pub fn handle_client_data(&mut self, conn_id: &str, data: &[u8]) {
        if !self.clients.contains_key(conn_id) {
            tracing::debug!(client = %conn_id, "data for an unknown client");
            return;
        }
        let msg = match protocol::decode::<ClientMessage>(data) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(
                    client = %conn_id,
                    error = %err,
                    "dropping undecodable client message"
                );
                return;
            }
        };
        match msg {
            ClientMessage::InfoBasic => self.handle_info_basic(conn_id),
            ClientMessage::JoinServer {
                name,
                auth_response,
            } => self.handle_join_server(conn_id, name, auth_response),
            ClientMessage::AssetList => self.handle_asset_list(conn_id),
            ClientMessage::Chars { room_id } => {
                self.handle_chars(conn_id, &room_id);
            }
            ClientMessage::JoinRoom { room_id, character } => {
                self.handle_join_room(conn_id, &room_id, character);
            }
            // Room traffic goes out verbatim, so the raw frame is what
            // gets relayed, not a re-encoding.
            ClientMessage::Ooc { .. } | ClientMessage::Event { .. } => {
                self.relay_to_room(conn_id, data);
            }
            ClientMessage::SetOpt { key, value } => {
                self.handle_set_opt(conn_id, &key, &value);
            }
            ClientMessage::Opts => self.handle_opts(conn_id),
        }
    }

    // -----------------------------------------------------------------------
    // Client message handlers
    // -----------------------------------------------------------------------

    fn handle_info_basic(&mut self, conn_id: &str) {
        let Some(client) = self.clients.get(conn_id) else { return };
        let reply = ServerMessage::InfoBasic {
            name: self.config.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            player_count: self.player_count(),
            max_players: self.config.max_players,
            protection: self.config.protection,
            desc: self.config.desc.clone(),
            auth_challenge: ByteBuf::from(client.challenge.to_vec()),
            rooms: self.room_listing(),
        };
        self.send(conn_id, &reply);
    }

    fn handle_join_server(
        &mut self,
        conn_id: &str,
        name: Option<String>,
        auth_response: Option<ByteBuf>,
    ) {
        let Some(name) = name.filter(|name| !name.is_empty()) else {
            self.send(
                conn_id,
                &ServerMessage::JoinServer {
                    result: JoinResult::Other,
                    message: Some("Invalid name".to_string()),
                },
            );
            return;
        };

        let password = self.config.password.clone();
        let Some(client) = self.clients.get_mut(conn_id) else { return };
        let response = auth_response.unwrap_or_default();
        let reply = if client.verify_auth(&password, &response) {
            client.set_name(&name);
            client.authenticated = true;
            tracing::info!(
                client = %conn_id,
                name = %client.name,
                "client joined the server"
            );
            ServerMessage::JoinServer {
                result: JoinResult::Success,
                message: None,
            }
        } else {
            ServerMessage::JoinServer {
                result: JoinResult::Password,
                message: None,
            }
        };
        self.send(conn_id, &reply);
    }

    fn handle_asset_list(&mut self, conn_id: &str) {
        let reply = ServerMessage::AssetList {
            repositories: self.config.repositories.clone(),
            assets: self.config.assets.flattened(),
        };
        self.send(conn_id, &reply);
    }

    fn handle_chars(&mut self, conn_id: &str, room_id: &str) {
        if !self.is_authenticated(conn_id) {
            self.disconnect(conn_id, ERR_NOT_AUTHENTICATED);
            return;
        }
        let Some(room) = self.rooms.get(room_id) else {
            self.disconnect(conn_id, ERR_ROOM_NOT_FOUND);
            return;
        };
        let reply = ServerMessage::Chars {
            room_id: room_id.to_string(),
            characters: room.characters(&self.config.assets.characters),
            custom_allowed: room.custom_allowed,
        };
        self.send(conn_id, &reply);
    }

    fn handle_join_room(
        &mut self,
        conn_id: &str,
        room_id: &str,
        character: Option<String>,
    ) {
        let Some(client) = self.clients.get(conn_id) else { return };
        if !client.authenticated {
            self.disconnect(conn_id, ERR_NOT_AUTHENTICATED);
            return;
        }
        if client.session.is_some() {
            self.disconnect(conn_id, ERR_ALREADY_IN_ROOM);
            return;
        }
        let Some(room) = self.rooms.get_mut(room_id) else {
            self.disconnect(conn_id, ERR_ROOM_DOES_NOT_EXIST);
            return;
        };

        match room.join(conn_id, character.as_deref()) {
            Ok(player_id) => {
                if let Some(client) = self.clients.get_mut(conn_id) {
                    client.session = Some(Session {
                        room_id: room_id.to_string(),
                        player_id,
                        character,
                    });
                }
                tracing::info!(
                    client = %conn_id,
                    room = %room_id,
                    "client joined a room"
                );
                self.send(
                    conn_id,
                    &ServerMessage::JoinRoom {
                        result: JoinResult::Success,
                    },
                );
            }
            Err(err) => {
                tracing::debug!(
                    client = %conn_id,
                    room = %room_id,
                    error = %err,
                    "room join rejected"
                );
                self.send(
                    conn_id,
                    &ServerMessage::JoinRoom {
                        result: JoinResult::Other,
                    },
                );
            }
        }
    }

    fn relay_to_room(&mut self, conn_id: &str, raw: &[u8]) {
        let Some(client) = self.clients.get(conn_id) else { return };
        let Some(session) = client.session.as_ref() else {
            tracing::debug!(
                client = %conn_id,
                "room message from a client with no session"
            );
            return;
        };
        let room_id = session.room_id.clone();
        self.broadcast_to_room(&room_id, raw);
    }

    fn handle_set_opt(
        &mut self,
        conn_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) {
        if !self.is_privileged(conn_id) {
            self.send(
                conn_id,
                &ServerMessage::SetOpt {
                    result: OptResult::Error,
                    message: Some("Access denied".to_string()),
                },
            );
            return;
        }
        let reply = match self.config.set(key, value) {
            Ok(()) => {
                tracing::info!(client = %conn_id, %key, "option changed");
                ServerMessage::SetOpt {
                    result: OptResult::Success,
                    message: None,
                }
            }
            Err(err) => ServerMessage::SetOpt {
                result: OptResult::Error,
                message: Some(err.to_string()),
            },
        };
        self.send(conn_id, &reply);
    }

    fn handle_opts(&mut self, conn_id: &str) {
        let options = if self.is_privileged(conn_id) {
            serde_json::to_value(&self.config).unwrap_or_default()
        } else {
            serde_json::json!({ "error": "Access denied" })
        };
        self.send(conn_id, &ServerMessage::Opts { options });
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Snapshot of every client, ordered by connection id so the bytes
    /// are stable.
    pub fn snapshot(&self) -> ServerSnapshot {
        let mut clients: Vec<Client> = self.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
        ServerSnapshot { clients }
    }

    /// Replaces all live state with the snapshot's. Rooms are rebuilt
    /// from the current configuration and re-seated from the restored
    /// sessions; a session whose room no longer exists is dropped.
    pub fn restore(&mut self, snapshot: ServerSnapshot) {
        self.clients.clear();
        self.rooms = build_rooms(&self.config);

        for mut client in snapshot.clients {
            client.ipc_origin = None;
            if let Some(session) = client.session.take() {
                if let Some(room) = self.rooms.get_mut(&session.room_id) {
                    room.restore_member(
                        &session.player_id,
                        &client.conn_id,
                        session.character.clone(),
                    );
                    client.session = Some(session);
                } else {
                    tracing::warn!(
                        client = %client.conn_id,
                        room = %session.room_id,
                        "dropping session for a room that no longer exists"
                    );
                }
            }
            self.clients.insert(client.conn_id.clone(), client);
        }
        // The edge may have reconnected before the restore landed.
        if let Some(&peer) = self.peers.first() {
            self.adopt_orphans(peer);
        }
        tracing::info!(
            clients = self.clients.len(),
            "state restored from snapshot"
        );
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Assigns every client without an origin to the given peer.
    /// Snapshot restores produce such clients; their traffic flows
    /// through whichever edge is on the other end now.
    fn adopt_orphans(&mut self, peer: PeerId) {
        let mut adopted = 0usize;
        for client in self.clients.values_mut() {
            if client.ipc_origin.is_none() {
                client.ipc_origin = Some(peer);
                adopted += 1;
            }
        }
        if adopted > 0 {
            tracing::info!(%peer, adopted, "adopted restored clients");
        }
    }

    fn is_authenticated(&self, conn_id: &str) -> bool {
        self.clients
            .get(conn_id)
            .is_some_and(|client| client.authenticated)
    }

    fn is_privileged(&self, conn_id: &str) -> bool {
        self.clients
            .get(conn_id)
            .is_some_and(|client| client.privileged)
    }

    /// Rooms in listing order.
    fn room_listing(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by(|a, b| {
            a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id))
        });
        rooms.into_iter().map(Room::info).collect()
    }

    /// Queues one encoded reply for one client.
    fn send(&mut self, conn_id: &str, msg: &ServerMessage) {
        match protocol::encode(msg) {
            Ok(bytes) => self.outbox.push(ControlMessage::ClientData {
                client: conn_id.to_string(),
                data: ByteBuf::from(bytes),
            }),
            Err(err) => {
                tracing::error!(
                    client = %conn_id,
                    error = %err,
                    "failed to encode reply"
                );
            }
        }
    }

    /// Tells the client why, then asks the edge to close the socket.
    /// The client entry itself is removed when the close notice comes
    /// back from the edge.
    fn disconnect(&mut self, conn_id: &str, message: &str) {
        tracing::info!(client = %conn_id, %message, "disconnecting client");
        self.send(
            conn_id,
            &ServerMessage::Disconnect {
                message: Some(message.to_string()),
            },
        );
        self.outbox.push(ControlMessage::ClientDisconnect {
            client: conn_id.to_string(),
        });
    }

    /// Relays one raw frame to every member of a room.
    fn broadcast_to_room(&mut self, room_id: &str, raw: &[u8]) {
        let Some(room) = self.rooms.get(room_id) else { return };
        let targets: Vec<String> = room
            .member_client_ids()
            .map(str::to_string)
            .collect();
        for target in targets {
            self.outbox.push(ControlMessage::ClientData {
                client: target,
                data: ByteBuf::from(raw.to_vec()),
            });
        }
    }

    /// Removes a client, freeing its seat and telling the room.
    fn cleanup_client(&mut self, conn_id: &str) {
        let Some(mut client) = self.clients.remove(conn_id) else {
            tracing::debug!(client = %conn_id, "cleanup for an unknown client");
            return;
        };
        if let Some(session) = client.session.take() {
            if let Some(room) = self.rooms.get_mut(&session.room_id) {
                room.leave(&session.player_id);
            }
            let notice = ServerMessage::Event {
                payload: serde_json::json!({
                    "event": "leave",
                    "player": session.player_id,
                }),
            };
            match protocol::encode(&notice) {
                Ok(bytes) => {
                    self.broadcast_to_room(&session.room_id, &bytes);
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        "failed to encode leave notice"
                    );
                }
            }
        }
        tracing::info!(client = %conn_id, "client removed");
    }
}

fn build_rooms(config: &ServerConfig) -> HashMap<String, Room> {
    config
        .rooms
        .iter()
        .map(|(id, room_config)| {
            (id.clone(), Room::from_config(id, room_config))
        })
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
