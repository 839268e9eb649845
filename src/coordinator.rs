//! Round coordination
//!
//! The core state machine. Each room's ephemeral coordination state
//! (phase, bound sessions, the round's participant set, the review
//! barrier, pending submissions) is owned by a per-room mutex, so
//! barrier growth and the closure check run as one atomic
//! read-modify-write. One room's handler can await
//! storage while other rooms make progress; the global map lock is only
//! held long enough to fetch the room's handle. Persisted updates go
//! through the store's compare-and-swap, which retries stale writes by
//! re-reading current state.

use crate::broadcast::RoomChannels;
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::scoring::{self, ScoringPolicy};
use crate::store::{update_room, RoomStore};
use crate::types::*;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Letters a round can be played on. Q, V, X and Y are left out, as is
/// usual for the category game.
const ROUND_LETTERS: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'R', 'S',
    'T', 'U', 'W', 'Z',
];

/// Per-room coordination state. Never persisted.
#[derive(Default)]
struct RoomRuntime {
    phase: RoomPhase,
    /// Sessions currently bound to the room channel
    bound: HashSet<UserId>,
    /// Barrier denominator: members bound when the current round started
    participants: HashSet<UserId>,
    /// Members who finalized their review this round
    barrier: HashSet<UserId>,
    /// The current round's submissions with verdicts merged so far
    pending: HashMap<UserId, RoundSubmission>,
}

impl RoomRuntime {
    /// Nothing bound and no round underway: the entry can be dropped
    /// and recreated on demand.
    fn is_vacant(&self) -> bool {
        self.phase == RoomPhase::Idle && self.bound.is_empty() && self.pending.is_empty()
    }
}

pub struct RoundCoordinator {
    store: Arc<dyn RoomStore>,
    channels: Arc<RoomChannels>,
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomRuntime>>>>,
    policy: ScoringPolicy,
    categories: Vec<String>,
}

impl RoundCoordinator {
    pub fn new(
        store: Arc<dyn RoomStore>,
        channels: Arc<RoomChannels>,
        categories: Vec<String>,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            store,
            channels,
            rooms: RwLock::new(HashMap::new()),
            policy,
            categories,
        }
    }

    async fn runtime(&self, room_id: &str) -> Arc<Mutex<RoomRuntime>> {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id.to_string()).or_default().clone()
    }

    /// Drop a room's runtime entry once nothing needs it, so bogus room
    /// ids and abandoned rooms do not accumulate entries forever.
    async fn prune_runtime(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        let vacant = match rooms.get(room_id) {
            Some(rt) => matches!(rt.try_lock(), Ok(guard) if guard.is_vacant()),
            None => return,
        };
        if vacant {
            rooms.remove(room_id);
        }
    }

    /// Bind a session to the room channel. Rebinds are no-ops; neither
    /// touches the roster or the current round's participant set.
    pub async fn bind(&self, room_id: &str, user_id: &str) {
        let rt = self.runtime(room_id).await;
        rt.lock().await.bound.insert(user_id.to_string());
    }

    /// Unbind on transport disconnect. The member stays on the roster,
    /// and stays in the barrier denominator of a round they started in.
    pub async fn unbind(&self, room_id: &str, user_id: &str) {
        let rt = self.runtime(room_id).await;
        rt.lock().await.bound.remove(user_id);
        self.prune_runtime(room_id).await;
    }

    fn draw_prompts(&self) -> RoundPrompts {
        let mut rng = rand::rng();
        let letter = ROUND_LETTERS[rng.random_range(0..ROUND_LETTERS.len())];
        RoundPrompts {
            letter,
            categories: self.categories.clone(),
        }
    }

    /// CAS-advance the persisted round counter and close the room to
    /// new joins.
    async fn open_round(&self, room_id: &str) -> Result<(Room, RoundPrompts), GameError> {
        let room = update_room(self.store.as_ref(), room_id, |room| -> Result<(), GameError> {
            if room.current_round >= room.round_target {
                return Err(GameError::RoundTargetReached(room.round_target));
            }
            room.joinable = false;
            room.current_round += 1;
            Ok(())
        })
        .await?;

        Ok((room, self.draw_prompts()))
    }

    /// Reset the runtime for a freshly opened round. The barrier
    /// denominator is snapshotted here: roster members bound right now.
    fn begin_round(&self, rt: &mut RoomRuntime, room: &Room) {
        rt.phase = RoomPhase::AnswerPhase;
        rt.barrier.clear();
        rt.pending.clear();

        let participants: HashSet<UserId> = room
            .members
            .iter()
            .filter(|m| rt.bound.contains(m.as_str()))
            .cloned()
            .collect();
        // A round driven entirely through the store (no live sessions)
        // falls back to the full roster
        rt.participants = if participants.is_empty() {
            room.members.iter().cloned().collect()
        } else {
            participants
        };
    }

    /// Start round 1: `Idle -> AnswerPhase`. Subsequent rounds start on
    /// their own as review barriers close.
    pub async fn start_round(&self, room_id: &str) -> Result<RoundPrompts, GameError> {
        let rt = self.runtime(room_id).await;
        let mut guard = rt.lock().await;

        match guard.phase {
            RoomPhase::Idle => {}
            RoomPhase::GameComplete => {
                let loaded = self
                    .store
                    .load(room_id)
                    .await
                    .map_err(GameError::from_store_load)?;
                return Err(GameError::RoundTargetReached(loaded.room.round_target));
            }
            _ => return Err(GameError::RoundInProgress(room_id.to_string())),
        }

        let (room, prompts) = match self.open_round(room_id).await {
            Ok(opened) => opened,
            Err(e) => {
                drop(guard);
                self.prune_runtime(room_id).await;
                return Err(e);
            }
        };
        self.begin_round(&mut guard, &room);

        tracing::info!(room = room_id, round = room.current_round, "round started");
        self.channels
            .broadcast(
                room_id,
                ServerMessage::RoundStarted {
                    round_no: room.current_round,
                    prompts: prompts.clone(),
                },
            )
            .await;

        Ok(prompts)
    }

    /// Relay a member's answers to the room. Answers are never gated;
    /// the round enters review as soon as the first submission
    /// circulates.
    pub async fn relay_answers(
        &self,
        room_id: &str,
        user_id: &str,
        nickname: String,
        answers: Vec<AnswerEntry>,
    ) -> Result<(), GameError> {
        let submission = RoundSubmission {
            user_id: user_id.to_string(),
            nickname,
            answers: answers.into_iter().map(ReviewedAnswer::from_entry).collect(),
        };

        let rt = self.runtime(room_id).await;
        let mut guard = rt.lock().await;
        match guard.phase {
            RoomPhase::AnswerPhase | RoomPhase::ReviewPhase => {
                guard
                    .pending
                    .insert(user_id.to_string(), submission.clone());
                guard.phase = RoomPhase::ReviewPhase;
            }
            // Outside a round the answers still circulate, they are
            // just not part of any record
            _ => {}
        }
        drop(guard);

        self.channels
            .broadcast(room_id, ServerMessage::AnswersRelayed { submission })
            .await;
        self.prune_runtime(room_id).await;
        Ok(())
    }

    /// A member submits their completed review batch. Their verdicts are
    /// merged in, the round record is persisted, and if this closes the
    /// barrier the room either advances to the next round or finishes
    /// the game. Returns whether the barrier closed on this call.
    ///
    /// Repeat finalize from the same member within the round is a no-op;
    /// after the room has moved on it gets `RoundNotActive` instead of
    /// bleeding into the next round.
    pub async fn finalize_review(
        &self,
        room_id: &str,
        user_id: &str,
        reviews: Vec<RoundSubmission>,
    ) -> Result<bool, GameError> {
        let rt = self.runtime(room_id).await;
        let mut guard = rt.lock().await;

        if guard.phase != RoomPhase::ReviewPhase {
            drop(guard);
            self.prune_runtime(room_id).await;
            return Err(GameError::RoundNotActive(room_id.to_string()));
        }
        if guard.barrier.contains(user_id) {
            return Ok(false);
        }

        let rt_ref = &mut *guard;

        // Merge this reviewer's verdicts. Only entries keyed by the
        // finalizing reviewer are honoured, so a client cannot forge
        // other reviewers' verdicts.
        for source in &reviews {
            let Some(target) = rt_ref.pending.get_mut(&source.user_id) else {
                continue;
            };
            for (idx, reviewed) in source.answers.iter().enumerate() {
                let Some(answer) = target.answers.get_mut(idx) else {
                    continue;
                };
                if answer.category != reviewed.category {
                    continue;
                }
                if let Some(verdict) = reviewed.verdicts.get(user_id) {
                    answer.verdicts.insert(user_id.to_string(), *verdict);
                }
            }
        }

        if rt_ref.participants.contains(user_id) {
            rt_ref.barrier.insert(user_id.to_string());
        }
        let closed = !rt_ref.participants.is_empty()
            && rt_ref.participants.iter().all(|p| rt_ref.barrier.contains(p));

        let mut snapshot: Vec<RoundSubmission> = rt_ref.pending.values().cloned().collect();
        snapshot.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let closed_at = closed.then(|| chrono::Utc::now().to_rfc3339());

        let room = update_room(self.store.as_ref(), room_id, |room| -> Result<(), GameError> {
            let number = room.current_round;
            let record = RoundRecord {
                number,
                submissions: snapshot.clone(),
                closed_at: closed_at.clone(),
            };
            match room.round_records.iter_mut().find(|r| r.number == number) {
                Some(existing) => *existing = record,
                None => room.round_records.push(record),
            }
            Ok(())
        })
        .await?;

        if !closed {
            tracing::debug!(
                room = room_id,
                user = user_id,
                finalized = guard.barrier.len(),
                waiting_on = guard.participants.len() - guard.barrier.len(),
                "review recorded, barrier still open"
            );
            return Ok(false);
        }

        guard.phase = RoomPhase::RoundComplete;
        tracing::info!(room = room_id, round = room.current_round, "review barrier closed");

        if room.current_round < room.round_target {
            let (room, prompts) = self.open_round(room_id).await?;
            self.begin_round(&mut guard, &room);
            self.channels
                .broadcast(
                    room_id,
                    ServerMessage::RoundStarted {
                        round_no: room.current_round,
                        prompts,
                    },
                )
                .await;
        } else {
            guard.phase = RoomPhase::GameComplete;
            let points = self.points_for(&room);
            tracing::info!(room = room_id, "game complete");
            self.channels
                .broadcast(room_id, ServerMessage::GamePoints { points })
                .await;
        }

        Ok(true)
    }

    fn points_for(&self, room: &Room) -> HashMap<UserId, i64> {
        let mut points = scoring::game_points(&room.round_records, &self.policy);
        for member in &room.members {
            points.entry(member.clone()).or_insert(0);
        }
        points
    }

    /// Recompute game points from the round records and broadcast them.
    pub async fn broadcast_game_points(
        &self,
        room_id: &str,
    ) -> Result<HashMap<UserId, i64>, GameError> {
        let loaded = self
            .store
            .load(room_id)
            .await
            .map_err(GameError::from_store_load)?;
        let points = self.points_for(&loaded.room);
        self.channels
            .broadcast(
                room_id,
                ServerMessage::GamePoints {
                    points: points.clone(),
                },
            )
            .await;
        Ok(points)
    }

    /// Reset the room for a fresh game, from any phase: history cleared,
    /// round counter back to 0, joins reopened.
    pub async fn restart(&self, room_id: &str) -> Result<Room, GameError> {
        let rt = self.runtime(room_id).await;
        let mut guard = rt.lock().await;

        let room = match update_room(self.store.as_ref(), room_id, |room| -> Result<(), GameError> {
            room.reset();
            Ok(())
        })
        .await
        {
            Ok(room) => room,
            Err(e) => {
                drop(guard);
                self.prune_runtime(room_id).await;
                return Err(e);
            }
        };

        guard.phase = RoomPhase::Idle;
        guard.barrier.clear();
        guard.pending.clear();
        guard.participants.clear();

        tracing::info!(room = room_id, "room restarted");
        self.channels
            .broadcast(room_id, ServerMessage::RestartAck { room: room.clone() })
            .await;
        Ok(room)
    }
}
