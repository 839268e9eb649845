use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this session to a room channel. Identity comes from the
    /// handshake, not the payload.
    JoinRoom {
        room_id: RoomId,
    },
    /// Relay a chat line to the room.
    SendRoomMessage {
        room_id: RoomId,
        message: String,
    },
    /// Open round 1 (only valid before the game has started).
    StartRound {
        room_id: RoomId,
    },
    /// Publish this player's answers for the current round. Not gated
    /// server-side; review opens as soon as answers circulate.
    SubmitAnswers {
        room_id: RoomId,
        nickname: String,
        answers: Vec<AnswerEntry>,
    },
    /// Submit this player's completed review batch. `reviews` carries
    /// every submission with this reviewer's verdicts filled in; only
    /// verdict entries keyed by the sender are honoured.
    FinalizeReview {
        room_id: RoomId,
        reviews: Vec<RoundSubmission>,
    },
    /// Recompute and broadcast the accumulated game points.
    RequestGamePoints {
        room_id: RoomId,
    },
    /// Reset the room for a fresh game.
    RestartGame {
        room_id: RoomId,
    },
    /// Fetch the current room snapshot (state reconcile after missed
    /// broadcasts).
    FetchRoom {
        room_id: RoomId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join result, sent to the requester only.
    JoinAck {
        room: Room,
        message: String,
    },
    /// Broadcast to the room when a member joins or rejoins.
    JoinNotice {
        message: String,
    },
    /// Broadcast when a round opens.
    RoundStarted {
        round_no: u32,
        prompts: RoundPrompts,
    },
    /// A member's answers, relayed to the whole room as they arrive.
    AnswersRelayed {
        submission: RoundSubmission,
    },
    /// Relayed chat line.
    RoomMessage {
        sender: UserId,
        message: String,
    },
    /// Accumulated points per member, broadcast at game end or on demand.
    GamePoints {
        points: HashMap<UserId, i64>,
    },
    /// Broadcast after a restart with the reset room snapshot.
    RestartAck {
        room: Room,
    },
    /// Requester-only room snapshot.
    RoomSnapshot {
        room: Room,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn from_error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}
