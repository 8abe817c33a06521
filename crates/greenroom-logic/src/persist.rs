//! Snapshot file format for hot swaps.

use std::path::Path;

use serde::{Deserialize, Serialize};

use greenroom_protocol as protocol;

use crate::client::Client;
use crate::error::LogicError;

/// Everything that survives a logic process swap.
///
/// Rooms are intentionally absent: they are rebuilt from configuration
/// on restore and re-seated from the client sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub clients: Vec<Client>,
}

/// Writes a snapshot to disk as one MessagePack document.
pub async fn save(
    path: &Path,
    snapshot: &ServerSnapshot,
) -> Result<(), LogicError> {
    let bytes = protocol::encode(snapshot)?;
    tokio::fs::write(path, bytes).await?;
    tracing::info!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Reads a snapshot written by [`save`].
pub async fn load(path: &Path) -> Result<ServerSnapshot, LogicError> {
    let bytes = tokio::fs::read(path).await?;
    let snapshot = protocol::decode::<ServerSnapshot>(&bytes)?;
    tracing::info!(
        path = %path.display(),
        clients = snapshot.clients.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

// =========================================================================
// Tests
// =========================================================================
