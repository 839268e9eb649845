use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type UserId = String;
pub type SessionId = String;

/// Per-room lifecycle state. Ephemeral: lives in the coordinator's
/// runtime, never persisted alongside the room record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPhase {
    #[default]
    Idle,
    AnswerPhase,
    ReviewPhase,
    RoundComplete,
    GameComplete,
}

/// A reviewer's verdict on a single answer. Toggling a checkbox on the
/// client is a pure overwrite of this value, never an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pending,
    Accepted,
    Rejected,
}

/// One category/answer pair as typed by a player during the answer phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub category: String,
    pub text: String,
}

/// An answer annotated with peer-review verdicts, keyed by reviewer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewedAnswer {
    pub category: String,
    pub text: String,
    #[serde(default)]
    pub verdicts: HashMap<UserId, Verdict>,
}

impl ReviewedAnswer {
    pub fn from_entry(entry: AnswerEntry) -> Self {
        Self {
            category: entry.category,
            text: entry.text,
            verdicts: HashMap::new(),
        }
    }
}

/// One player's answers for one round. Verdicts are final only once the
/// review barrier for that round has closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSubmission {
    pub user_id: UserId,
    pub nickname: String,
    pub answers: Vec<ReviewedAnswer>,
}

/// The stored outcome of a round: every member's reviewed submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub number: u32,
    pub submissions: Vec<RoundSubmission>,
    /// RFC3339 timestamp stamped when the review barrier closed.
    pub closed_at: Option<String>,
}

/// The persisted room document. Members are in join order, no duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub members: Vec<UserId>,
    pub joinable: bool,
    pub current_round: u32,
    pub round_target: u32,
    #[serde(default)]
    pub round_records: Vec<RoundRecord>,
}

impl Room {
    pub fn new(id: RoomId, round_target: u32) -> Self {
        Self {
            id,
            members: Vec::new(),
            joinable: true,
            current_round: 0,
            round_target,
            round_records: Vec::new(),
        }
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// Reset for a fresh game: history cleared, joins reopened.
    pub fn reset(&mut self) {
        self.joinable = true;
        self.current_round = 0;
        self.round_records.clear();
    }
}

/// The prompt payload broadcast at round start: a drawn letter plus the
/// configured category list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPrompts {
    pub letter: char,
    pub categories: Vec<String>,
}
