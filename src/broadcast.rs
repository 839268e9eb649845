//! Room-scoped fan-out
//!
//! One `tokio::sync::broadcast` channel per room id. Delivery is
//! at-least-once to every currently subscribed session with no ordering
//! guarantee across members and no persistence: a session not subscribed
//! at send time never sees the message and reconciles via the room
//! snapshot on rejoin.

use crate::protocol::ServerMessage;
use crate::types::RoomId;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 100;

#[derive(Default)]
pub struct RoomChannels {
    channels: RwLock<HashMap<RoomId, broadcast::Sender<ServerMessage>>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session to a room's channel, creating it on first use.
    pub async fn subscribe(&self, room_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut channels = self.channels.write().await;
        channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a message to every session bound to the room. A send can
    /// only fail when every receiver is gone; the dead channel is
    /// dropped from the map rather than kept around.
    pub async fn broadcast(&self, room_id: &str, msg: ServerMessage) {
        let mut channels = self.channels.write().await;
        if let Some(tx) = channels.get(room_id) {
            if tx.send(msg).is_err() {
                channels.remove(room_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let channels = RoomChannels::new();
        let mut rx1 = channels.subscribe("r1").await;
        let mut rx2 = channels.subscribe("r1").await;

        channels
            .broadcast(
                "r1",
                ServerMessage::JoinNotice {
                    message: "alice joined the room".to_string(),
                },
            )
            .await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ServerMessage::JoinNotice { message } => {
                    assert_eq!(message, "alice joined the room")
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_is_room_scoped() {
        let channels = RoomChannels::new();
        let mut rx_other = channels.subscribe("r2").await;

        channels
            .broadcast(
                "r1",
                ServerMessage::JoinNotice {
                    message: "noise".to_string(),
                },
            )
            .await;

        assert!(matches!(
            rx_other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_dead_channel_is_dropped_on_broadcast() {
        let channels = RoomChannels::new();
        let rx = channels.subscribe("r1").await;
        drop(rx);

        channels
            .broadcast(
                "r1",
                ServerMessage::JoinNotice {
                    message: "anyone?".to_string(),
                },
            )
            .await;

        assert!(!channels.channels.read().await.contains_key("r1"));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_fine() {
        let channels = RoomChannels::new();
        // No channel exists yet for this room; must not panic
        channels
            .broadcast(
                "empty",
                ServerMessage::JoinNotice {
                    message: "anyone?".to_string(),
                },
            )
            .await;
    }
}
