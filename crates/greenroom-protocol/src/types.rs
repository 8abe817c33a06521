//! Message types for greenroom's two wire surfaces.
//!
//! Every frame is a MessagePack map. On the public link the map carries a
//! string `id` field naming the message ([`ClientMessage`] going in,
//! [`ServerMessage`] going out). On the loopback link between the edge and
//! logic processes the map carries a `type` field instead
//! ([`ControlMessage`]). Client payloads cross the loopback link as opaque
//! byte blobs; the control layer never looks inside them.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::fmt;

// ---------------------------------------------------------------------------
// Shared vocabulary
// ---------------------------------------------------------------------------

/// Access policy advertised for the server as a whole and for each room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    /// Anyone may join.
    #[default]
    Open,
    /// Joining requires the server password.
    Closed,
    /// Joining is limited to spectating.
    Spectate,
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protection::Open => write!(f, "open"),
            Protection::Closed => write!(f, "closed"),
            Protection::Spectate => write!(f, "spectate"),
        }
    }
}

/// Availability of one catalogue character within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterStatus {
    /// Some player in the room currently has this character.
    Used,
    /// Free to pick.
    Open,
}

/// Outcome field of a `join-server` or `join-room` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinResult {
    Success,
    /// Challenge response did not match the server password.
    Password,
    /// Any other rejection; details travel in the `message` field.
    Other,
}

/// Outcome field of a `set-opt` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptResult {
    Success,
    Error,
}

/// One room entry in an `info-basic` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    /// Current member count.
    pub players: usize,
    pub desc: String,
    pub protection: Protection,
}

/// One catalogue character entry in a `chars` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub asset: String,
    pub protection: CharacterStatus,
}

// ---------------------------------------------------------------------------
// Public link: client → server
// ---------------------------------------------------------------------------

/// Messages a public client sends to the server.
///
/// The `id` tag is the kebab-case variant name, so
/// `ClientMessage::JoinServer` travels as `{"id": "join-server", ...}`.
/// Fields a client may legitimately omit are `Option` or defaulted; a
/// frame whose `id` is unknown fails to decode and is dropped by the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request the server summary (name, rooms, auth challenge).
    InfoBasic,

    /// Authenticate: `auth_response` must be
    /// HMAC-SHA256(key = this connection's challenge, message = password).
    JoinServer {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        auth_response: Option<ByteBuf>,
    },

    /// Request the asset repositories and catalogue.
    AssetList,

    /// Request the character availability list for one room.
    Chars { room_id: String },

    /// Join a room, optionally as a specific character.
    JoinRoom {
        room_id: String,
        #[serde(default)]
        character: Option<String>,
    },

    /// Out-of-character chat, broadcast to the sender's room.
    Ooc { message: String },

    /// In-character event, broadcast verbatim to the sender's room.
    Event {
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Change one server option (privileged).
    SetOpt {
        key: String,
        value: serde_json::Value,
    },

    /// Request the full option snapshot (privileged).
    Opts,
}

// ---------------------------------------------------------------------------
// Public link: server → client
// ---------------------------------------------------------------------------

/// Messages the server sends to a public client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Reply to `info-basic`. `auth_challenge` is the 16-byte value the
    /// client must use as the HMAC key in `join-server`.
    InfoBasic {
        name: String,
        version: String,
        player_count: usize,
        max_players: usize,
        protection: Protection,
        desc: String,
        auth_challenge: ByteBuf,
        rooms: Vec<RoomInfo>,
    },

    /// Reply to `join-server`.
    JoinServer {
        result: JoinResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Reply to `asset-list`. `assets` is the catalogue flattened across
    /// all categories.
    AssetList {
        repositories: Vec<String>,
        assets: Vec<String>,
    },

    /// Reply to `chars`.
    Chars {
        room_id: String,
        characters: Vec<CharacterInfo>,
        custom_allowed: bool,
    },

    /// Reply to `join-room`. Failures disconnect instead of replying.
    JoinRoom { result: JoinResult },

    /// Sent just before the server closes the connection.
    Disconnect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Out-of-character chat relayed to room members.
    Ooc { message: String },

    /// In-character event relayed to room members.
    Event {
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Reply to `opts`: the option snapshot, or `{"error": ...}` when
    /// the request was denied.
    Opts { options: serde_json::Value },

    /// Reply to `set-opt`.
    SetOpt {
        result: OptResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Loopback link: edge ↔ logic
// ---------------------------------------------------------------------------

/// Messages carried on the loopback link between the edge and logic
/// processes. `client` is always a connection identifier assigned by the
/// edge; `data` is an encoded public frame passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// A public client connected to the edge.
    ClientConnect { client: String },

    /// A public client disconnected, or the logic process wants the edge
    /// to close the connection.
    ClientDisconnect { client: String },

    /// A payload for (or from) one specific client.
    ClientData { client: String, data: ByteBuf },

    /// A payload for every currently connected client.
    ClientBroadcast { data: ByteBuf },
}

impl ControlMessage {
    /// The connection identifier this message is about, if it names one.
    pub fn client(&self) -> Option<&str> {
        match self {
            ControlMessage::ClientConnect { client }
            | ControlMessage::ClientDisconnect { client }
            | ControlMessage::ClientData { client, .. } => Some(client),
            ControlMessage::ClientBroadcast { .. } => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The client SDK and the original wire captures define exact map
    //! shapes; these tests pin the serde attributes to them.

    use super::*;
    use crate::{decode, encode};

    /// Decodes a frame into a JSON value for shape assertions.
    /// Only valid for frames without binary fields.
    fn as_json(bytes: &[u8]) -> serde_json::Value {
        rmp_serde::from_slice(bytes).expect("frame should be a plain map")
    }

    // =====================================================================
    // Tagging
    // =====================================================================

    #[test]
    fn test_client_message_tag_is_kebab_case_id() {
        let bytes = encode(&ClientMessage::InfoBasic).unwrap();
        assert_eq!(as_json(&bytes)["id"], "info-basic");

        let bytes = encode(&ClientMessage::Chars {
            room_id: "The First Room".into(),
        })
        .unwrap();
        let json = as_json(&bytes);
        assert_eq!(json["id"], "chars");
        assert_eq!(json["room_id"], "The First Room");
    }

    #[test]
    fn test_server_message_tag_is_kebab_case_id() {
        let bytes = encode(&ServerMessage::JoinRoom {
            result: JoinResult::Success,
        })
        .unwrap();
        let json = as_json(&bytes);
        assert_eq!(json["id"], "join-room");
        assert_eq!(json["result"], "success");
    }

    #[test]
    fn test_control_message_tag_is_type_field() {
        let bytes = encode(&ControlMessage::ClientConnect {
            client: "10.0.0.1:4242".into(),
        })
        .unwrap();
        let json = as_json(&bytes);
        assert_eq!(json["type"], "client-connect");
        assert_eq!(json["client"], "10.0.0.1:4242");
    }

    // =====================================================================
    // Optional and binary fields
    // =====================================================================

    #[test]
    fn test_join_server_round_trips_binary_response() {
        let msg = ClientMessage::JoinServer {
            name: Some("Alice".into()),
            auth_response: Some(ByteBuf::from(vec![7u8; 32])),
        };
        let bytes = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_join_server_fields_default_when_missing() {
        // A bare {"id": "join-server"} still decodes; the handler turns
        // the missing fields into a rejection, not a protocol error.
        let frame =
            encode(&serde_json::json!({ "id": "join-server" })).unwrap();
        let decoded: ClientMessage = decode(&frame).unwrap();
        assert_eq!(
            decoded,
            ClientMessage::JoinServer {
                name: None,
                auth_response: None,
            }
        );
    }

    #[test]
    fn test_join_room_character_defaults_to_none() {
        let frame = encode(&serde_json::json!({
            "id": "join-room",
            "room_id": "The Second Room",
        }))
        .unwrap();
        let decoded: ClientMessage = decode(&frame).unwrap();
        assert_eq!(
            decoded,
            ClientMessage::JoinRoom {
                room_id: "The Second Room".into(),
                character: None,
            }
        );
    }

    #[test]
    fn test_event_payload_defaults_to_null() {
        let frame = encode(&serde_json::json!({ "id": "event" })).unwrap();
        let decoded: ClientMessage = decode(&frame).unwrap();
        assert_eq!(
            decoded,
            ClientMessage::Event {
                payload: serde_json::Value::Null,
            }
        );
    }

    #[test]
    fn test_reply_message_field_omitted_when_none() {
        let bytes = encode(&ServerMessage::JoinServer {
            result: JoinResult::Success,
            message: None,
        })
        .unwrap();
        let json = as_json(&bytes);
        assert_eq!(json["result"], "success");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_reply_message_field_present_when_some() {
        let bytes = encode(&ServerMessage::JoinServer {
            result: JoinResult::Other,
            message: Some("Invalid name".into()),
        })
        .unwrap();
        assert_eq!(as_json(&bytes)["message"], "Invalid name");
    }

    #[test]
    fn test_info_basic_challenge_round_trips_sixteen_bytes() {
        let challenge = ByteBuf::from((0u8..16).collect::<Vec<u8>>());
        let msg = ServerMessage::InfoBasic {
            name: "Test server".into(),
            version: "0.1.0".into(),
            player_count: 0,
            max_players: 32,
            protection: Protection::Open,
            desc: "Test description".into(),
            auth_challenge: challenge.clone(),
            rooms: vec![RoomInfo {
                id: "The First Room".into(),
                name: "The First Room".into(),
                players: 0,
                desc: "It's the first room.".into(),
                protection: Protection::Open,
            }],
        };
        let bytes = encode(&msg).unwrap();
        let decoded: ServerMessage = decode(&bytes).unwrap();
        match decoded {
            ServerMessage::InfoBasic { auth_challenge, rooms, .. } => {
                assert_eq!(auth_challenge.len(), 16);
                assert_eq!(auth_challenge, challenge);
                assert_eq!(rooms.len(), 1);
            }
            other => panic!("expected info-basic, got {other:?}"),
        }
    }

    // =====================================================================
    // Vocabulary enums
    // =====================================================================

    #[test]
    fn test_protection_serializes_lowercase() {
        let json = serde_json::to_string(&Protection::Spectate).unwrap();
        assert_eq!(json, "\"spectate\"");
        assert_eq!(Protection::default(), Protection::Open);
    }

    #[test]
    fn test_character_status_serializes_lowercase() {
        let json = serde_json::to_string(&CharacterStatus::Used).unwrap();
        assert_eq!(json, "\"used\"");
    }

    #[test]
    fn test_join_result_serializes_lowercase() {
        let json = serde_json::to_string(&JoinResult::Password).unwrap();
        assert_eq!(json, "\"password\"");
    }

    // =====================================================================
    // Control messages
    // =====================================================================

    #[test]
    fn test_client_data_round_trips_opaque_blob() {
        // The blob is arbitrary bytes, not necessarily valid MessagePack.
        let msg = ControlMessage::ClientData {
            client: "127.0.0.1:9999".into(),
            data: ByteBuf::from(vec![0xc1, 0xff, 0x00]),
        };
        let bytes = encode(&msg).unwrap();
        let decoded: ControlMessage = decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_control_message_client_accessor() {
        let connect = ControlMessage::ClientConnect {
            client: "a:1".into(),
        };
        assert_eq!(connect.client(), Some("a:1"));

        let broadcast = ControlMessage::ClientBroadcast {
            data: ByteBuf::new(),
        };
        assert_eq!(broadcast.client(), None);
    }

    #[test]
    fn test_decode_unknown_id_fails() {
        let frame =
            encode(&serde_json::json!({ "id": "fly-to-moon" })).unwrap();
        assert!(decode::<ClientMessage>(&frame).is_err());
    }

    #[test]
    fn test_decode_missing_required_field_fails() {
        // "chars" without a room_id is malformed.
        let frame = encode(&serde_json::json!({ "id": "chars" })).unwrap();
        assert!(decode::<ClientMessage>(&frame).is_err());
    }
}
