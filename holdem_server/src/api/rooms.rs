//! Room REST handlers.
//!
//! Players identify themselves with `player_id`; identity is owned by the
//! ledger service in front of this server.
//!
//! # Examples
//!
//! Join a room:
//! ```bash
//! curl -X POST http://localhost:6969/api/rooms/1/join \
//!   -H "Content-Type: application/json" \
//!   -d '{"player_id": 7, "name": "alice", "buy_in": 1000}'
//! ```
//!
//! Raise to 120:
//! ```bash
//! curl -X POST http://localhost:6969/api/rooms/1/action \
//!   -H "Content-Type: application/json" \
//!   -d '{"player_id": 7, "action": {"type": "raise", "amount": 120}}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use holdem_engine::{
    Action, Chips, PlayerId, RoomConfig, RoomId,
    bot::BotDifficulty,
    table::{RoomSnapshot, RoomSummary},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub player_id: Option<PlayerId>,
}

/// Overrides applied on top of the registry's default room config
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub max_seats: Option<usize>,
    pub small_blind: Option<Chips>,
    pub big_blind: Option<Chips>,
    pub rake_bps: Option<u32>,
    pub rake_cap: Option<Chips>,
    pub bots_enabled: Option<bool>,
    pub bot_difficulty: Option<BotDifficulty>,
}

impl CreateRoomRequest {
    pub fn apply(self, base: &RoomConfig) -> RoomConfig {
        let mut config = base.clone();
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(max_seats) = self.max_seats {
            config.max_seats = max_seats;
        }
        if let Some(small_blind) = self.small_blind {
            config.small_blind = small_blind;
        }
        if let Some(big_blind) = self.big_blind {
            config.big_blind = big_blind;
        }
        if let Some(rake_bps) = self.rake_bps {
            config.rake_bps = rake_bps;
        }
        if self.rake_cap.is_some() {
            config.rake_cap = self.rake_cap;
        }
        if let Some(bots_enabled) = self.bots_enabled {
            config.bots_enabled = bots_enabled;
        }
        if let Some(difficulty) = self.bot_difficulty {
            config.bot_difficulty = difficulty;
        }
        config
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub name: Option<String>,
    pub buy_in: Chips,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub player_id: PlayerId,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub player_id: PlayerId,
    pub amount: Chips,
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    /// Stack after the top-up, counting chips held until the hand settles
    pub chips: Chips,
}

#[derive(Debug, Deserialize)]
pub struct AddBotsRequest {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AddBotsResponse {
    pub seated: usize,
}

#[derive(Debug, Serialize)]
pub struct RetryCashoutsResponse {
    pub unresolved: usize,
}

/// List all open rooms.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.registry.list().await)
}

/// Create a room. Returns `201 Created` with the new room id.
///
/// # Errors
///
/// - `400 Bad Request`: the resulting config fails validation
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let config = request.apply(state.registry.default_config());
    let room_id = state.registry.create_room(config).await?;
    metrics::active_rooms(state.registry.room_count().await);
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room_id })))
}

/// Room snapshot. Hole cards are shown only for `player_id`.
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    let room = state.registry.get(room_id).await?;
    Ok(Json(room.snapshot(query.player_id).await?))
}

/// Close a room: aborts the running hand and cashes every seat out.
pub async fn close_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state.registry.destroy(room_id).await?;
    metrics::active_rooms(state.registry.room_count().await);
    Ok(StatusCode::NO_CONTENT)
}

/// Reserve `buy_in` through the ledger and take a seat.
///
/// # Errors
///
/// - `400 Bad Request`: buy-in outside the room's range
/// - `402 Payment Required`: ledger balance too low
/// - `409 Conflict`: already seated or the table is full
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    if request.player_id <= 0 {
        return Err(ApiError::bad_request("player_id must be positive"));
    }
    let room = state.registry.get(room_id).await?;
    state.ensure_dev_account(request.player_id).await;

    let name = request
        .name
        .unwrap_or_else(|| format!("player_{}", request.player_id));
    let snapshot = room.join(request.player_id, name, request.buy_in).await?;
    Ok(Json(snapshot))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<LeaveRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state.registry.get(room_id).await?;
    room.leave(request.player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Act for the current turn. Rejections leave the room untouched.
pub async fn take_action(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<ActionRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state.registry.get(room_id).await?;
    room.act(request.player_id, request.action).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn top_up(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<TopUpResponse>, ApiError> {
    let room = state.registry.get(room_id).await?;
    let chips = room.top_up(request.player_id, request.amount).await?;
    Ok(Json(TopUpResponse { chips }))
}

pub async fn add_bots(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<AddBotsRequest>,
) -> Result<Json<AddBotsResponse>, ApiError> {
    let room = state.registry.get(room_id).await?;
    let seated = room.add_bots(request.count).await?;
    Ok(Json(AddBotsResponse { seated }))
}

/// Re-attempt cash-outs the ledger refused. The halt lifts once none remain.
pub async fn retry_cashouts(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RetryCashoutsResponse>, ApiError> {
    let room = state.registry.get(room_id).await?;
    let unresolved = room.retry_cashouts().await?;
    Ok(Json(RetryCashoutsResponse { unresolved }))
}
