//! Room actor message and event types.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::errors::RoomResult;
use crate::game::{
    betting::Street,
    engine::HandSettlement,
    entities::{Action, Chips, GameView, PlayerId, RoomId, SeatStatus},
};

/// Messages that can be sent to a RoomActor
#[derive(Debug)]
pub enum RoomMessage {
    /// Reserve `buy_in` through the ledger and take a seat
    Join {
        player_id: PlayerId,
        name: String,
        buy_in: Chips,
        response: oneshot::Sender<RoomResult<RoomSnapshot>>,
    },

    /// Leave the room, folding first if the seat is in the running hand
    Leave {
        player_id: PlayerId,
        response: oneshot::Sender<RoomResult<()>>,
    },

    /// Action for the current turn
    Act {
        player_id: PlayerId,
        action: Action,
        response: oneshot::Sender<RoomResult<()>>,
    },

    /// Add chips from the ledger; returns the new stack including any
    /// chips held until the running hand settles
    TopUp {
        player_id: PlayerId,
        amount: Chips,
        response: oneshot::Sender<RoomResult<Chips>>,
    },

    /// Seat up to `count` bots; returns how many were seated
    AddBots {
        count: usize,
        response: oneshot::Sender<RoomResult<usize>>,
    },

    /// Room view as seen by `viewer`
    GetSnapshot {
        viewer: Option<PlayerId>,
        response: oneshot::Sender<RoomSnapshot>,
    },

    GetSummary {
        response: oneshot::Sender<RoomSummary>,
    },

    /// Stream events to `sender`; snapshots are rendered for `viewer`
    Subscribe {
        subscriber_id: Uuid,
        viewer: Option<PlayerId>,
        sender: mpsc::Sender<RoomEvent>,
    },

    Unsubscribe { subscriber_id: Uuid },

    /// Transport lost one of the player's connections. The seat is
    /// released once no subscription for the player remains.
    Disconnect { player_id: PlayerId },

    /// Re-attempt unresolved cash-outs; returns how many remain
    RetryCashouts {
        response: oneshot::Sender<RoomResult<usize>>,
    },

    /// Abort the running hand, cash everyone out and stop
    Close {
        response: oneshot::Sender<RoomResult<()>>,
    },
}

/// Why a room stopped dealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// Forced cash-outs the ledger would not accept
    UnresolvedCashout { player_ids: Vec<PlayerId> },
    /// Chip conservation or pot eligibility broke
    SettlementConsistency { detail: String },
}

/// Full room view broadcast after every accepted mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub name: String,
    pub halt: Option<HaltReason>,
    pub closed: bool,
    pub game: GameView,
}

/// Listing entry for room discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub name: String,
    pub seated: usize,
    pub humans: usize,
    pub max_seats: usize,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub hand_number: u64,
    pub street: Street,
    pub halted: bool,
    /// Milliseconds since the last human left, if none are seated
    pub idle_ms: Option<u64>,
}

/// Events pushed to room subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    Snapshot(RoomSnapshot),

    HandSettled {
        room_id: RoomId,
        settlement: HandSettlement,
    },

    SeatStatusChanged {
        room_id: RoomId,
        player_id: PlayerId,
        status: SeatStatus,
    },

    /// The seat was auto-acted and now sits out
    PlayerTimedOut {
        room_id: RoomId,
        player_id: PlayerId,
        action: Action,
    },

    RoomClosed {
        room_id: RoomId,
        /// Last seat standing, when the room closed by walkover
        winner: Option<PlayerId>,
    },

    RoomHalted {
        room_id: RoomId,
        reason: HaltReason,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> RoomId {
        match self {
            RoomEvent::Snapshot(snapshot) => snapshot.room_id,
            RoomEvent::HandSettled { room_id, .. }
            | RoomEvent::SeatStatusChanged { room_id, .. }
            | RoomEvent::PlayerTimedOut { room_id, .. }
            | RoomEvent::RoomClosed { room_id, .. }
            | RoomEvent::RoomHalted { room_id, .. } => *room_id,
        }
    }
}
