//! Connection gateway
//!
//! Every inbound connection must present a non-empty user identity at
//! the handshake; anonymous connections are refused before they reach
//! any room channel. Join requests follow three branches: unknown room,
//! joinable room (append to roster or idempotent rejoin), and active
//! room (resume for roster members only).

use crate::broadcast::RoomChannels;
use crate::coordinator::RoundCoordinator;
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::store::{update_room, RoomStore, StoreError};
use crate::types::{Room, UserId};
use std::sync::Arc;

/// Handshake identity check. The transport layer runs this before the
/// websocket upgrade.
pub fn authenticate(user_id: Option<&str>) -> Result<UserId, GameError> {
    match user_id {
        Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => Err(GameError::Unauthenticated),
    }
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub room: Room,
    pub rejoined: bool,
}

pub struct ConnectionGateway {
    store: Arc<dyn RoomStore>,
    channels: Arc<RoomChannels>,
    coordinator: Arc<RoundCoordinator>,
}

impl ConnectionGateway {
    pub fn new(
        store: Arc<dyn RoomStore>,
        channels: Arc<RoomChannels>,
        coordinator: Arc<RoundCoordinator>,
    ) -> Self {
        Self {
            store,
            channels,
            coordinator,
        }
    }

    /// Bind a session to a room. On success the caller sends the
    /// returned room snapshot as the join ack; the join notice has
    /// already been broadcast to the room here.
    pub async fn join(&self, room_id: &str, user_id: &str) -> Result<JoinOutcome, GameError> {
        // The joinable check and the roster append sit inside the same
        // CAS write: a round can start between a plain read and the
        // write, and a retried write must re-check the fresh snapshot
        let mut rejoined = false;
        let room = update_room(self.store.as_ref(), room_id, |room| -> Result<(), GameError> {
            if room.is_member(user_id) {
                // Resuming a member, possibly mid-game
                rejoined = true;
            } else if room.joinable {
                rejoined = false;
                room.members.push(user_id.to_string());
            } else {
                tracing::debug!(room = room_id, user = user_id, "join refused, game in progress");
                return Err(GameError::RoomClosedToJoins(room_id.to_string()));
            }
            Ok(())
        })
        .await
        .map_err(|e| match e {
            GameError::Storage(StoreError::NotFound(id)) => GameError::RoomNotFound(id),
            other => other,
        })?;

        let outcome = JoinOutcome { room, rejoined };

        self.coordinator.bind(room_id, user_id).await;

        let verb = if outcome.rejoined { "rejoined" } else { "joined" };
        tracing::info!(room = room_id, user = user_id, "{verb} the room");
        self.channels
            .broadcast(
                room_id,
                ServerMessage::JoinNotice {
                    message: format!("{user_id} {verb} the room"),
                },
            )
            .await;

        Ok(outcome)
    }
}
