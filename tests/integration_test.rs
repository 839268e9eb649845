use kategoria::config::ServerConfig;
use kategoria::protocol::{ClientMessage, ServerMessage};
use kategoria::state::AppState;
use kategoria::types::{AnswerEntry, ReviewedAnswer, Room, RoundSubmission, Verdict};
use kategoria::ws::handle_message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

async fn app_with_room(room_id: &str, round_target: u32) -> Arc<AppState> {
    let state = Arc::new(AppState::new(&ServerConfig::default()));
    state
        .store
        .insert(Room::new(room_id.to_string(), round_target))
        .await
        .expect("room seed");
    state
}

fn drain(rx: &mut broadcast::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

/// A review batch where `reviewer` accepts every answer of every listed
/// submission.
fn accept_everything(
    submissions: &[(&str, &str, &str)], // (user, category, text)
    reviewer: &str,
) -> Vec<RoundSubmission> {
    submissions
        .iter()
        .map(|(user, category, text)| RoundSubmission {
            user_id: user.to_string(),
            nickname: user.to_string(),
            answers: vec![ReviewedAnswer {
                category: category.to_string(),
                text: text.to_string(),
                verdicts: HashMap::from([(reviewer.to_string(), Verdict::Accepted)]),
            }],
        })
        .collect()
}

/// Full game: two members, one round, duplicate answers in the same
/// category. Barrier closes 2/2, the game completes, and the duplicate
/// rule zeroes both players' points.
#[tokio::test]
async fn test_full_game_duplicate_answers_score_zero() {
    let state = app_with_room("R1", 1).await;
    let alice = "A".to_string();
    let bob = "B".to_string();

    // Both join while the room is open
    state.gateway.join("R1", &alice).await.expect("A joins");
    state.gateway.join("R1", &bob).await.expect("B joins");
    let mut rx_a = state.channels.subscribe("R1").await;
    let mut rx_b = state.channels.subscribe("R1").await;

    // Start round 1
    let response = handle_message(
        &state,
        &alice,
        ClientMessage::StartRound {
            room_id: "R1".to_string(),
        },
    )
    .await;
    assert!(response.is_none(), "start relays through the room channel");

    for rx in [&mut rx_a, &mut rx_b] {
        let messages = drain(rx);
        assert!(
            messages.iter().any(|m| matches!(
                m,
                ServerMessage::RoundStarted { round_no: 1, .. }
            )),
            "both members receive the round start"
        );
    }

    // Both submit the same answer for category X
    for user in [&alice, &bob] {
        let response = handle_message(
            &state,
            user,
            ClientMessage::SubmitAnswers {
                room_id: "R1".to_string(),
                nickname: user.clone(),
                answers: vec![AnswerEntry {
                    category: "X".to_string(),
                    text: "cat".to_string(),
                }],
            },
        )
        .await;
        assert!(response.is_none());
    }

    let relayed = drain(&mut rx_a)
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::AnswersRelayed { .. }))
        .count();
    assert_eq!(relayed, 2, "answers circulate to the whole room");

    // Both finalize, accepting each other's answers
    let everyone = [("A", "X", "cat"), ("B", "X", "cat")];
    for user in [&alice, &bob] {
        let response = handle_message(
            &state,
            user,
            ClientMessage::FinalizeReview {
                room_id: "R1".to_string(),
                reviews: accept_everything(&everyone, user),
            },
        )
        .await;
        assert!(response.is_none());
    }

    // Barrier closed 2/2, game complete, duplicate rule applies
    for rx in [&mut rx_a, &mut rx_b] {
        let points = drain(rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::GamePoints { points } => Some(points),
                _ => None,
            })
            .expect("game points broadcast to every member");
        assert_eq!(points["A"], 0);
        assert_eq!(points["B"], 0);
    }

    // The room is in GameComplete: another start is refused
    let response = handle_message(
        &state,
        &alice,
        ClientMessage::StartRound {
            room_id: "R1".to_string(),
        },
    )
    .await;
    match response {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "ROUND_TARGET_REACHED"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejoin_rules_once_game_started() {
    let state = app_with_room("R1", 2).await;

    state.gateway.join("R1", "alice").await.unwrap();
    state.gateway.join("R1", "bob").await.unwrap();
    state.coordinator.start_round("R1").await.unwrap();

    // Known member resumes without roster mutation
    let outcome = state.gateway.join("R1", "alice").await.unwrap();
    assert!(outcome.rejoined);
    assert_eq!(outcome.room.members.len(), 2);

    // Stranger is refused while the game runs
    let response = handle_message(
        &state,
        &"mallory".to_string(),
        ClientMessage::JoinRoom {
            room_id: "R1".to_string(),
        },
    )
    .await;
    // JoinRoom is socket-level; the gateway call is the contract
    assert!(response.is_none());
    let err = state.gateway.join("R1", "mallory").await.unwrap_err();
    assert_eq!(err.code(), "ROOM_CLOSED");
}

#[tokio::test]
async fn test_restart_reopens_room_and_clears_history() {
    let state = app_with_room("R1", 1).await;
    state.gateway.join("R1", "alice").await.unwrap();
    state.gateway.join("R1", "bob").await.unwrap();
    let mut rx = state.channels.subscribe("R1").await;

    state.coordinator.start_round("R1").await.unwrap();

    // Play out the single round
    let everyone = [("alice", "X", "ant"), ("bob", "X", "bee")];
    for (user, category, text) in everyone {
        handle_message(
            &state,
            &user.to_string(),
            ClientMessage::SubmitAnswers {
                room_id: "R1".to_string(),
                nickname: user.to_string(),
                answers: vec![AnswerEntry {
                    category: category.to_string(),
                    text: text.to_string(),
                }],
            },
        )
        .await;
    }
    for user in ["alice", "bob"] {
        handle_message(
            &state,
            &user.to_string(),
            ClientMessage::FinalizeReview {
                room_id: "R1".to_string(),
                reviews: accept_everything(&everyone, user),
            },
        )
        .await;
    }

    // Restart from GameComplete
    let response = handle_message(
        &state,
        &"alice".to_string(),
        ClientMessage::RestartGame {
            room_id: "R1".to_string(),
        },
    )
    .await;
    assert!(response.is_none());

    let restart_room = drain(&mut rx)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::RestartAck { room } => Some(room),
            _ => None,
        })
        .expect("restart snapshot broadcast");
    assert!(restart_room.joinable);
    assert_eq!(restart_room.current_round, 0);
    assert!(restart_room.round_records.is_empty());

    // New members can join again
    let outcome = state.gateway.join("R1", "carol").await.unwrap();
    assert!(!outcome.rejoined);
}

#[tokio::test]
async fn test_points_on_demand_and_snapshot_fetch() {
    let state = app_with_room("R1", 2).await;
    state.gateway.join("R1", "alice").await.unwrap();
    state.gateway.join("R1", "bob").await.unwrap();
    let mut rx = state.channels.subscribe("R1").await;

    state.coordinator.start_round("R1").await.unwrap();

    let everyone = [("alice", "X", "ant"), ("bob", "X", "bee")];
    for (user, category, text) in everyone {
        state
            .coordinator
            .relay_answers(
                "R1",
                user,
                user.to_string(),
                vec![AnswerEntry {
                    category: category.to_string(),
                    text: text.to_string(),
                }],
            )
            .await
            .unwrap();
    }
    for user in ["alice", "bob"] {
        state
            .coordinator
            .finalize_review("R1", user, accept_everything(&everyone, user))
            .await
            .unwrap();
    }
    // Round 2 started automatically; mid-game points are available on
    // demand from the completed rounds
    drain(&mut rx);

    let response = handle_message(
        &state,
        &"alice".to_string(),
        ClientMessage::RequestGamePoints {
            room_id: "R1".to_string(),
        },
    )
    .await;
    assert!(response.is_none());

    let points = drain(&mut rx)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::GamePoints { points } => Some(points),
            _ => None,
        })
        .expect("points broadcast");
    assert_eq!(points["alice"], 10);
    assert_eq!(points["bob"], 10);

    // Snapshot fetch goes to the requester only
    let response = handle_message(
        &state,
        &"alice".to_string(),
        ClientMessage::FetchRoom {
            room_id: "R1".to_string(),
        },
    )
    .await;
    match response {
        Some(ServerMessage::RoomSnapshot { room }) => {
            assert_eq!(room.current_round, 2);
            assert_eq!(room.round_records.len(), 1);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    // Unknown rooms answer the requester with an error, no broadcast
    let response = handle_message(
        &state,
        &"alice".to_string(),
        ClientMessage::FetchRoom {
            room_id: "nope".to_string(),
        },
    )
    .await;
    match response {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "ROOM_NOT_FOUND"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(drain(&mut rx).is_empty());
}
