//! Per-connection client state and authentication.

use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use greenroom_channel::PeerId;

/// Display names longer than this are cut, not rejected.
const NAME_LIMIT: usize = 32;

/// A client's membership in one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub room_id: String,
    /// Short public identifier within the room.
    pub player_id: String,
    pub character: Option<String>,
}

/// State of one public connection, keyed by its connection identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub conn_id: String,
    /// Display name; "unconnected" until `join-server` succeeds.
    pub name: String,
    /// Grants the `set-opt`/`opts` surface.
    pub privileged: bool,
    pub authenticated: bool,
    /// Per-connection HMAC key, generated once and never reused.
    pub challenge: [u8; 16],
    /// Which control peer delivers this client's traffic. `None` only
    /// for snapshot-restored clients awaiting adoption.
    #[serde(skip)]
    pub ipc_origin: Option<PeerId>,
    pub session: Option<Session>,
}

impl Client {
    pub fn new(conn_id: &str, privileged: bool, origin: PeerId) -> Self {
        Self {
            conn_id: conn_id.to_string(),
            name: "unconnected".to_string(),
            privileged,
            authenticated: false,
            challenge: rand::rng().random(),
            ipc_origin: Some(origin),
            session: None,
        }
    }

    /// True when `response` is HMAC-SHA256 over `password` keyed with
    /// this connection's challenge. Comparison is constant-time.
    pub fn verify_auth(&self, password: &str, response: &[u8]) -> bool {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.challenge)
            .expect("hmac accepts any key length");
        mac.update(password.as_bytes());
        mac.verify_slice(response).is_ok()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.chars().take(NAME_LIMIT).collect();
    }
}

// =========================================================================
// Tests
// =========================================================================
