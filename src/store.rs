//! Room persistence contract
//!
//! The coordination core only ever talks to storage through [`RoomStore`].
//! Writes are compare-and-swap on a version counter so that two handlers
//! racing on the same room can never both win the same logical update;
//! the loser re-reads and retries.

use crate::types::{Room, RoomId};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no room found: {0}")]
    NotFound(RoomId),

    /// A concurrent writer won the race. Callers re-read and retry;
    /// this never reaches a user.
    #[error("stale write on room {0}, version moved")]
    VersionConflict(RoomId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A room snapshot together with the version that loaded it. The version
/// must be handed back on `store` to win the write.
#[derive(Debug, Clone)]
pub struct VersionedRoom {
    pub room: Room,
    pub version: u64,
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn load(&self, room_id: &str) -> Result<VersionedRoom, StoreError>;

    /// Compare-and-swap write: succeeds only if the stored version still
    /// equals `expected_version`. Returns the new version.
    async fn store(&self, room: &Room, expected_version: u64) -> Result<u64, StoreError>;

    /// Create a room. Out-of-scope CRUD routes would call this; here it
    /// seeds development rooms and tests.
    async fn insert(&self, room: Room) -> Result<(), StoreError>;
}

/// Read-modify-write against the store's compare-and-swap: re-reads and
/// retries for as long as concurrent writers keep winning the race. The
/// version conflict never escapes to a caller.
pub async fn update_room<E, F>(store: &dyn RoomStore, room_id: &str, mut mutate: F) -> Result<Room, E>
where
    F: FnMut(&mut Room) -> Result<(), E>,
    E: From<StoreError>,
{
    loop {
        let mut versioned = store.load(room_id).await?;
        mutate(&mut versioned.room)?;
        match store.store(&versioned.room, versioned.version).await {
            Ok(_) => return Ok(versioned.room),
            Err(StoreError::VersionConflict(_)) => {
                tracing::debug!(room = room_id, "lost a storage race, re-reading");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// In-memory adapter, the only backend shipped with the crate. A document
/// store implements the same trait with its native conditional update.
#[derive(Default)]
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<RoomId, VersionedRoom>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn load(&self, room_id: &str) -> Result<VersionedRoom, StoreError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(room_id.to_string()))
    }

    async fn store(&self, room: &Room, expected_version: u64) -> Result<u64, StoreError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(&room.id)
            .ok_or_else(|| StoreError::NotFound(room.id.clone()))?;

        if entry.version != expected_version {
            return Err(StoreError::VersionConflict(room.id.clone()));
        }

        entry.room = room.clone();
        entry.version += 1;
        Ok(entry.version)
    }

    async fn insert(&self, room: Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id.clone(), VersionedRoom { room, version: 1 });
        Ok(())
    }
}
