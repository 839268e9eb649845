//! WebSocket transport
//!
//! One task per connection. The handshake must carry a `user_id` query
//! parameter or the upgrade is refused. A session binds to at most one
//! room channel at a time; room broadcasts and client requests are
//! multiplexed in a single select loop. `handle_message` is a plain
//! async function so the coordination core is exercised in tests
//! without a live socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::gateway;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{RoomId, SessionId, UserId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler. Anonymous connections are refused here,
/// before any room channel is involved.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let user_id = match gateway::authenticate(params.user_id.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("refusing anonymous connection");
            return (StatusCode::UNAUTHORIZED, ServerMessage::from_error(&e).to_json())
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
        .into_response()
}

impl ServerMessage {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("failed to serialize server message: {e}");
            r#"{"t":"error","code":"INTERNAL","msg":"serialization failure"}"#.to_string()
        })
    }
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: Arc<AppState>) {
    let session_id: SessionId = ulid::Ulid::new().to_string();
    tracing::info!(session = %session_id, user = %user_id, "session connected");

    let (mut sender, mut receiver) = socket.split();

    // The room this session is bound to, with its broadcast subscription
    let mut bound_room: Option<(RoomId, broadcast::Receiver<ServerMessage>)> = None;

    loop {
        tokio::select! {
            // Room broadcasts
            broadcast_msg = async {
                match &mut bound_room {
                    Some((_, rx)) => rx.recv().await.ok(),
                    // Not bound yet: wait forever
                    None => std::future::pending::<Option<ServerMessage>>().await,
                }
            } => {
                if let Some(msg) = broadcast_msg {
                    if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
                        break;
                    }
                }
            }

            // Client requests
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        let msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::debug!(session = %session_id, "unparseable message: {e}");
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("invalid message format: {e}"),
                                };
                                let _ = sender.send(Message::Text(error.to_json().into())).await;
                                continue;
                            }
                        };

                        // Joins are handled here: the subscription has
                        // to live on this task
                        let response = if let ClientMessage::JoinRoom { room_id } = msg {
                            match state.gateway.join(&room_id, &user_id).await {
                                Ok(outcome) => {
                                    if let Some((old_room, _)) = bound_room.take() {
                                        if old_room != room_id {
                                            state.coordinator.unbind(&old_room, &user_id).await;
                                        }
                                    }
                                    let rx = state.channels.subscribe(&room_id).await;
                                    bound_room = Some((room_id, rx));

                                    let verb = if outcome.rejoined { "rejoined" } else { "joined" };
                                    Some(ServerMessage::JoinAck {
                                        room: outcome.room,
                                        message: format!("{user_id} {verb} the room"),
                                    })
                                }
                                Err(e) => Some(ServerMessage::from_error(&e)),
                            }
                        } else {
                            handle_message(&state, &user_id, msg).await
                        };

                        if let Some(response) = response {
                            if sender.send(Message::Text(response.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session = %session_id, "websocket error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Transport-level disconnect: unbind, keep the roster untouched
    if let Some((room_id, _)) = &bound_room {
        state.coordinator.unbind(room_id, &user_id).await;
    }
    tracing::info!(session = %session_id, user = %user_id, "session disconnected");
}

/// Dispatch every non-join client request. Errors stay local to the
/// requesting session: the returned message goes to that session only,
/// never to the room.
pub async fn handle_message(
    state: &Arc<AppState>,
    user_id: &UserId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        // Handled at the socket level
        ClientMessage::JoinRoom { .. } => None,

        ClientMessage::SendRoomMessage { room_id, message } => {
            state
                .channels
                .broadcast(
                    &room_id,
                    ServerMessage::RoomMessage {
                        sender: user_id.clone(),
                        message,
                    },
                )
                .await;
            None
        }

        ClientMessage::StartRound { room_id } => {
            match state.coordinator.start_round(&room_id).await {
                Ok(_) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }

        ClientMessage::SubmitAnswers {
            room_id,
            nickname,
            answers,
        } => {
            match state
                .coordinator
                .relay_answers(&room_id, user_id, nickname, answers)
                .await
            {
                Ok(()) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }

        ClientMessage::FinalizeReview { room_id, reviews } => {
            match state
                .coordinator
                .finalize_review(&room_id, user_id, reviews)
                .await
            {
                Ok(_) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }

        ClientMessage::RequestGamePoints { room_id } => {
            match state.coordinator.broadcast_game_points(&room_id).await {
                Ok(_) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }

        ClientMessage::RestartGame { room_id } => {
            match state.coordinator.restart(&room_id).await {
                Ok(_) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }

        ClientMessage::FetchRoom { room_id } => match state.store.load(&room_id).await {
            Ok(loaded) => Some(ServerMessage::RoomSnapshot { room: loaded.room }),
            Err(e) => Some(ServerMessage::from_error(
                &crate::error::GameError::from_store_load(e),
            )),
        },
    }
}
