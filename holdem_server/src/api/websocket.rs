//! WebSocket event stream for one room.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws/{room_id}?player_id=<id>`; without a
//!    `player_id` the connection only observes.
//! 2. The server subscribes to the room. The current snapshot arrives first,
//!    then every room event as tagged JSON.
//! 3. Commands sent by the client are forwarded to the room and answered with
//!    a `success` or `error` message on the same socket.
//! 4. When the socket closes, a bound player leaves the room.
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:6969/ws/1?player_id=7');
//!
//! ws.onmessage = (event) => {
//!   const data = JSON.parse(event.data);
//!   if (data.type === 'snapshot') {
//!     render(data.game);
//!   }
//! };
//!
//! ws.send(JSON.stringify({
//!   type: "action",
//!   action: { type: "raise", amount: 100 }
//! }));
//! ```

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use holdem_engine::{
    Action, Chips, PlayerId, RoomHandle, RoomId,
    table::{RoomResult, RoomSnapshot},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{ApiError, AppState, rooms::ViewerQuery};
use crate::metrics;

/// Room events buffered per connection before the room starts skipping it
const EVENT_BUFFER: usize = 64;

/// Commands received via WebSocket
///
/// Joining stays on the HTTP API so the buy-in response carries the full
/// ledger error.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Action { action: Action },
    Leave,
    TopUp { amount: Chips },
    /// Resend the current snapshot
    Snapshot,
}

/// Replies to client commands
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerResponse {
    Success { message: String },
    Snapshot(RoomSnapshot),
    Error { message: String },
}

/// Upgrade to a WebSocket bound to `room_id`.
///
/// Returns `404 Not Found` before upgrading when the room does not exist.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    Query(query): Query<ViewerQuery>,
    State(state): State<AppState>,
) -> Response {
    let room = match state.registry.get(room_id).await {
        Ok(room) => room,
        Err(err) => return ApiError::from(err).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, room, query.player_id, state))
}

async fn handle_socket(
    socket: WebSocket,
    room: RoomHandle,
    player_id: Option<PlayerId>,
    state: AppState,
) {
    let room_id = room.room_id();
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = match room.subscribe(player_id, EVENT_BUFFER).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Room {room_id}: subscribe failed: {e}");
            return;
        }
    };

    let subscription_id = subscription.id;
    metrics::websocket_connections_total();
    metrics::websocket_connections_active(state.connection_opened());
    info!("WebSocket connected: room={room_id}, player={player_id:?}");

    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);

    let send_task = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                event = subscription.events.recv() => match event {
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize room event: {e}");
                            continue;
                        }
                    },
                    // Room actor stopped
                    None => break,
                },
                Some(response) = response_rx.recv() => response,
            };

            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();
                let response = match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => handle_command(command, &room, player_id).await,
                    Err(e) => {
                        warn!("Failed to parse client message: {e}");
                        ServerResponse::Error {
                            message: "Invalid message format".to_string(),
                        }
                    }
                };

                if let Ok(json) = serde_json::to_string(&response)
                    && response_tx.send(json).await.is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    room.unsubscribe(subscription_id).await;
    if let Some(player_id) = player_id {
        room.disconnect(player_id).await;
    }

    metrics::websocket_connections_active(state.connection_closed());
    info!("WebSocket disconnected: room={room_id}, player={player_id:?}");
}

/// Forward one command to the room on behalf of the bound player.
async fn handle_command(
    command: ClientCommand,
    room: &RoomHandle,
    player_id: Option<PlayerId>,
) -> ServerResponse {
    match (command, player_id) {
        (ClientCommand::Snapshot, viewer) => match room.snapshot(viewer).await {
            Ok(snapshot) => ServerResponse::Snapshot(snapshot),
            Err(e) => reply(Err(e)),
        },
        (_, None) => ServerResponse::Error {
            message: "Connect with a player_id to play".to_string(),
        },
        (ClientCommand::Action { action }, Some(player_id)) => reply(
            room.act(player_id, action)
                .await
                .map(|()| format!("Player {player_id} {action}")),
        ),
        (ClientCommand::Leave, Some(player_id)) => {
            reply(room.leave(player_id).await.map(|()| "Left room".to_string()))
        }
        (ClientCommand::TopUp { amount }, Some(player_id)) => reply(
            room.top_up(player_id, amount)
                .await
                .map(|chips| format!("Stack is now {chips}")),
        ),
    }
}

fn reply(result: RoomResult<String>) -> ServerResponse {
    match result {
        Ok(message) => ServerResponse::Success { message },
        Err(e) => ServerResponse::Error {
            message: e.client_message(),
        },
    }
}
