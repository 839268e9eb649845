use crate::store::StoreError;
use crate::types::RoomId;
use thiserror::Error;

/// Errors surfaced to the session that triggered them. No variant here
/// ever mutates room state for other members.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("connection did not present a user identity")]
    Unauthenticated,

    #[error("no room found: {0}")]
    RoomNotFound(RoomId),

    #[error("room {0} has already started, joins are closed")]
    RoomClosedToJoins(RoomId),

    #[error("room {0} already has a round in progress")]
    RoundInProgress(RoomId),

    #[error("no round is awaiting review in room {0}")]
    RoundNotActive(RoomId),

    #[error("all {0} rounds have been played")]
    RoundTargetReached(u32),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl GameError {
    /// A failed room load at the start of an operation means the room
    /// does not exist, which deserves its own error.
    pub fn from_store_load(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GameError::RoomNotFound(id),
            other => GameError::Storage(other),
        }
    }

    /// Stable code carried in the wire-level error message.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthenticated => "UNAUTHENTICATED",
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::RoomClosedToJoins(_) => "ROOM_CLOSED",
            GameError::RoundInProgress(_) => "ROUND_IN_PROGRESS",
            GameError::RoundNotActive(_) => "NO_ACTIVE_ROUND",
            GameError::RoundTargetReached(_) => "ROUND_TARGET_REACHED",
            GameError::Storage(StoreError::NotFound(_)) => "ROOM_NOT_FOUND",
            GameError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }
}
