//! Rooms: broadcast groups with per-member character claims.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use greenroom_protocol::{
    CharacterInfo, CharacterStatus, Protection, RoomInfo,
};

use crate::config::RoomConfig;

/// One member entry: which connection, playing which character.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub client_id: String,
    pub character: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("this client has already joined with this character")]
    AlreadyJoined,
}

/// A single broadcast group.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub protection: Protection,
    pub custom_allowed: bool,
    pub order: u32,
    members: HashMap<String, RoomMember>,
}

impl Room {
    pub fn from_config(id: &str, config: &RoomConfig) -> Self {
        Self {
            id: id.to_string(),
            name: config.name.clone(),
            desc: config.desc.clone(),
            protection: config.protection,
            custom_allowed: config.custom_allowed,
            order: config.order,
            members: HashMap::new(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    /// Entry for the room list in `info-basic`.
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.members.len(),
            desc: self.desc.clone(),
            protection: self.protection,
        }
    }

    /// Adds a member and returns the assigned player id.
    ///
    /// The (client, character) pair must not already be present; the
    /// check runs before any mutation.
    pub fn join(
        &mut self,
        client_id: &str,
        character: Option<&str>,
    ) -> Result<String, RoomError> {
        let duplicate = self.members.values().any(|member| {
            member.client_id == client_id
                && member.character.as_deref() == character
        });
        if duplicate {
            return Err(RoomError::AlreadyJoined);
        }

        // Short random ids collide eventually; re-roll instead of
        // overwriting the member that holds the id.
        let mut player_id = random_player_id();
        while self.members.contains_key(&player_id) {
            player_id = random_player_id();
        }
        self.members.insert(
            player_id.clone(),
            RoomMember {
                client_id: client_id.to_string(),
                character: character.map(str::to_string),
            },
        );
        Ok(player_id)
    }

    /// Removes a member; false if the id was not present.
    pub fn leave(&mut self, player_id: &str) -> bool {
        self.members.remove(player_id).is_some()
    }

    /// Reinstates a member under its previous player id (snapshot
    /// restore path).
    pub fn restore_member(
        &mut self,
        player_id: &str,
        client_id: &str,
        character: Option<String>,
    ) {
        self.members.insert(
            player_id.to_string(),
            RoomMember {
                client_id: client_id.to_string(),
                character,
            },
        );
    }

    /// Availability of each catalogue character in this room.
    pub fn characters(&self, catalogue: &[String]) -> Vec<CharacterInfo> {
        let used: HashSet<&str> = self
            .members
            .values()
            .filter_map(|member| member.character.as_deref())
            .collect();
        catalogue
            .iter()
            .map(|asset| CharacterInfo {
                asset: asset.clone(),
                protection: if used.contains(asset.as_str()) {
                    CharacterStatus::Used
                } else {
                    CharacterStatus::Open
                },
            })
            .collect()
    }

    /// Connection ids of every member, one entry per member.
    pub fn member_client_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.members
            .values()
            .map(|member| member.client_id.as_str())
    }
}

/// Six hex chars; strong enough that re-rolls are rare below a thousand
/// members.
fn random_player_id() -> String {
    let bytes: [u8; 3] = rand::rng().random();
    format!("{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2])
}

// =========================================================================
// Tests
// =========================================================================
