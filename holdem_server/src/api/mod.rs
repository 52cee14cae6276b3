//! HTTP/WebSocket transport for the room registry.
//!
//! Every handler resolves a room through the registry and forwards one
//! command to its actor. The transport never touches game state directly.
//!
//! # Endpoints
//!
//! ```text
//! GET    /health                        - Server health status
//! GET    /api/rooms                     - List rooms
//! POST   /api/rooms                     - Create a room from the default config
//! GET    /api/rooms/{id}?player_id=     - Room snapshot, hole cards for the viewer
//! DELETE /api/rooms/{id}                - Close a room and cash everyone out
//! POST   /api/rooms/{id}/join           - Reserve a buy-in and take a seat
//! POST   /api/rooms/{id}/leave          - Leave (folds first mid-hand)
//! POST   /api/rooms/{id}/action         - Act for the current turn
//! POST   /api/rooms/{id}/topup          - Add chips to a seat
//! POST   /api/rooms/{id}/bots           - Seat bots
//! POST   /api/rooms/{id}/retry-cashouts - Re-attempt unresolved cash-outs
//! GET    /ws/{id}?player_id=            - Event stream plus action commands
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use holdem_engine::{InMemoryLedger, RoomConfig, RoomRegistry};
//! use holdem_server::api::{AppState, create_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(InMemoryLedger::new());
//! let registry = RoomRegistry::new(ledger.clone(), RoomConfig::default());
//! let state = AppState::new(registry).with_dev_ledger(ledger, 10_000);
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod rooms;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use holdem_engine::{
    Chips, GameError, InMemoryLedger, LedgerError, PlayerId, RoomError, RoomRegistry, db::Database,
};
use serde::Serialize;
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub registry: RoomRegistry,
    /// Set on the memory backend: unknown players are credited
    /// `starting_balance` on first join.
    pub dev_ledger: Option<Arc<InMemoryLedger>>,
    pub starting_balance: Chips,
    /// Checked by `/health` on the Postgres backend
    pub database: Option<Database>,
    connections: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            registry,
            dev_ledger: None,
            starting_balance: 0,
            database: None,
            connections: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_dev_ledger(mut self, ledger: Arc<InMemoryLedger>, starting_balance: Chips) -> Self {
        self.dev_ledger = Some(ledger);
        self.starting_balance = starting_balance;
        self
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Credit a first-time player on the memory backend.
    pub(crate) async fn ensure_dev_account(&self, player_id: PlayerId) {
        let Some(ledger) = &self.dev_ledger else {
            return;
        };
        if ledger.balance(player_id).await.is_none() {
            let balance = ledger.deposit(player_id, self.starting_balance).await;
            log::info!("Credited dev account {player_id} with {balance}");
        }
    }

    pub(crate) fn connection_opened(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn connection_closed(&self) -> u64 {
        self.connections.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }
}

/// Create the API router with all endpoints and CORS applied.
pub fn create_router(state: AppState) -> Router {
    let room_routes = Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{room_id}",
            get(rooms::get_room).delete(rooms::close_room),
        )
        .route("/rooms/{room_id}/join", post(rooms::join_room))
        .route("/rooms/{room_id}/leave", post(rooms::leave_room))
        .route("/rooms/{room_id}/action", post(rooms::take_action))
        .route("/rooms/{room_id}/topup", post(rooms::top_up))
        .route("/rooms/{room_id}/bots", post(rooms::add_bots))
        .route(
            "/rooms/{room_id}/retry-cashouts",
            post(rooms::retry_cashouts),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ws/{room_id}", get(websocket::websocket_handler))
        .nest("/api", room_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `503 Service Unavailable` when the ledger database is unreachable.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let healthy = database.unwrap_or(true);

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "rooms": state.registry.room_count().await,
    });

    (status_code, Json(response))
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A room error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        Self {
            status: status_for(&err),
            message: err.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), "Request failed: {}", self.message);
        } else {
            tracing::debug!(status = self.status.as_u16(), "Request rejected: {}", self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// HTTP status for a room error
pub fn status_for(err: &RoomError) -> StatusCode {
    match err {
        RoomError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        RoomError::RoomClosed => StatusCode::GONE,
        RoomError::RoomHalted => StatusCode::SERVICE_UNAVAILABLE,
        RoomError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        RoomError::TopUpCooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
        RoomError::InvalidBuyIn(_) | RoomError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        RoomError::Ledger(err) => match err {
            LedgerError::Database(_) | LedgerError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LedgerError::AccountNotFound(_) | LedgerError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::SessionAlreadyActive(_) | LedgerError::SessionEnded(_) => {
                StatusCode::CONFLICT
            }
            LedgerError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        },
        RoomError::Game(err) => match err {
            GameError::IllegalAction(_) => StatusCode::BAD_REQUEST,
            GameError::NotSeated(_) => StatusCode::NOT_FOUND,
            GameError::NotYourTurn
            | GameError::AlreadySeated(_)
            | GameError::TableFull
            | GameError::NotEnoughPlayers
            | GameError::HandInProgress
            | GameError::NoHandInProgress => StatusCode::CONFLICT,
            GameError::InvalidTransition { .. }
            | GameError::DeckExhausted
            | GameError::SettlementConsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RoomError::RoomNotFound(4)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RoomError::Game(GameError::NotYourTurn)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&RoomError::InsufficientFunds {
                available: 10,
                required: 400
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&RoomError::Ledger(LedgerError::Unavailable("down".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&RoomError::TopUpCooldown {
                retry_after_secs: 30
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_api_error_uses_client_message() {
        let err: ApiError = RoomError::Game(GameError::SettlementConsistency(
            "pot 1 has no eligible winner".into(),
        ))
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Room halted for audit");
    }
}
