//! Server configuration: identity, access policy, rooms, and assets.
//!
//! Defaults describe a small development server with two rooms and an
//! empty asset catalogue. A subset of scalar options can be changed at
//! runtime through the privileged `set-opt` message; everything else is
//! load-time only.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use greenroom_protocol::Protection;

/// Load-time description of one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Position in the room list shown to clients.
    pub order: u32,
    pub name: String,
    pub desc: String,
    pub protection: Protection,
    /// Whether members may bring characters outside the catalogue.
    pub custom_allowed: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            order: 0,
            name: String::new(),
            desc: String::new(),
            protection: Protection::Open,
            custom_allowed: false,
        }
    }
}

/// Asset catalogue by category. `asset-list` replies flatten it in
/// declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetCatalogue {
    pub characters: Vec<String>,
    pub backgrounds: Vec<String>,
    pub music: Vec<String>,
    pub other: Vec<String>,
}

impl AssetCatalogue {
    /// Every asset in one list: characters, backgrounds, music, other.
    pub fn flattened(&self) -> Vec<String> {
        self.characters
            .iter()
            .chain(&self.backgrounds)
            .chain(&self.music)
            .chain(&self.other)
            .cloned()
            .collect()
    }
}

/// Everything the logic process is configured with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub desc: String,
    pub max_players: usize,
    /// Hidden from public server lists.
    pub private: bool,
    /// Development mode: clients get the privileged option surface.
    pub developer: bool,
    /// Empty means open authentication (the HMAC runs over "").
    pub password: String,
    pub protection: Protection,
    pub rooms: HashMap<String, RoomConfig>,
    pub assets: AssetCatalogue,
    pub repositories: Vec<String>,
    /// Where `persist`/`restore` read and write the state snapshot.
    pub persistence_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(
            "The First Room".to_string(),
            RoomConfig {
                order: 0,
                name: "The First Room".to_string(),
                desc: "It's the first room.".to_string(),
                protection: Protection::Open,
                custom_allowed: false,
            },
        );
        rooms.insert(
            "The Second Room".to_string(),
            RoomConfig {
                order: 1,
                name: "The Second Room".to_string(),
                ..RoomConfig::default()
            },
        );

        Self {
            name: "Test server".to_string(),
            desc: "Test description".to_string(),
            max_players: 32,
            private: false,
            developer: true,
            password: String::new(),
            protection: Protection::Open,
            rooms,
            assets: AssetCatalogue::default(),
            repositories: Vec::new(),
            persistence_file: PathBuf::from("persistence.bin"),
        }
    }
}

/// Rejection from the runtime mutation surface. The display strings are
/// wire-visible in `set-opt` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Key not found")]
    UnknownKey,
    #[error("Invalid value")]
    InvalidValue,
}

impl ServerConfig {
    /// Applies one `set-opt` mutation. Only flat scalar options are
    /// reachable here; rooms and assets are load-time only.
    pub fn set(
        &mut self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        match key {
            "name" => self.name = string_value(value)?,
            "desc" => self.desc = string_value(value)?,
            "password" => self.password = string_value(value)?,
            "protection" => {
                self.protection = serde_json::from_value(value.clone())
                    .map_err(|_| ConfigError::InvalidValue)?;
            }
            "max_players" => {
                self.max_players = value
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or(ConfigError::InvalidValue)?;
            }
            "private" => {
                self.private = value.as_bool().ok_or(ConfigError::InvalidValue)?;
            }
            "developer" => {
                self.developer =
                    value.as_bool().ok_or(ConfigError::InvalidValue)?;
            }
            _ => return Err(ConfigError::UnknownKey),
        }
        Ok(())
    }
}

fn string_value(value: &serde_json::Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(ConfigError::InvalidValue)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_has_the_two_stock_rooms() {
        let config = ServerConfig::default();
        assert_eq!(config.rooms.len(), 2);

        let first = &config.rooms["The First Room"];
        assert_eq!(first.order, 0);
        assert_eq!(first.desc, "It's the first room.");
        assert!(!first.custom_allowed);

        let second = &config.rooms["The Second Room"];
        assert_eq!(second.order, 1);
        assert_eq!(second.desc, "");
    }

    #[test]
    fn test_flattened_keeps_category_order() {
        let assets = AssetCatalogue {
            characters: vec!["phoenix".into()],
            backgrounds: vec!["court".into()],
            music: vec![],
            other: vec!["gavel".into()],
        };
        assert_eq!(assets.flattened(), vec!["phoenix", "court", "gavel"]);
    }

    #[test]
    fn test_set_changes_each_scalar_option() {
        let mut config = ServerConfig::default();
        config.set("name", &json!("Renamed")).unwrap();
        config.set("desc", &json!("New desc")).unwrap();
        config.set("password", &json!("hunter2")).unwrap();
        config.set("protection", &json!("closed")).unwrap();
        config.set("max_players", &json!(64)).unwrap();
        config.set("private", &json!(true)).unwrap();
        config.set("developer", &json!(false)).unwrap();

        assert_eq!(config.name, "Renamed");
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.protection, Protection::Closed);
        assert_eq!(config.max_players, 64);
        assert!(config.private);
        assert!(!config.developer);
    }

    #[test]
    fn test_set_unknown_key_is_rejected() {
        let mut config = ServerConfig::default();
        let err = config.set("rooms", &json!({})).unwrap_err();
        assert_eq!(err, ConfigError::UnknownKey);
        assert_eq!(err.to_string(), "Key not found");
    }

    #[test]
    fn test_set_wrong_type_is_rejected() {
        let mut config = ServerConfig::default();
        let err = config.set("max_players", &json!("many")).unwrap_err();
        assert_eq!(err, ConfigError::InvalidValue);
        assert_eq!(err.to_string(), "Invalid value");
        assert_eq!(config.max_players, 32);
    }

    #[test]
    fn test_config_survives_a_json_round_trip() {
        let config = ServerConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, config.name);
        assert_eq!(back.rooms.len(), 2);
    }
}
