//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entities::{Chips, PlayerId, RoomId};

/// Identifier of one player's stay at one room.
pub type SessionId = Uuid;

/// Final accounting for a departing seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub final_chips: Chips,
    pub rake_paid: Chips,
    pub exit_fee: Chips,
}

impl SessionEnd {
    /// Chips returned to the player's balance.
    pub fn net_return(&self) -> Chips {
        self.final_chips.saturating_sub(self.exit_fee)
    }
}

/// Session model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSession {
    pub id: SessionId,
    pub player_id: PlayerId,
    pub room_id: RoomId,
    /// Buy-in plus every top-up.
    pub reserved: Chips,
    pub started_at: DateTime<Utc>,
    pub ended: Option<SessionEnd>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl LedgerSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    BuyIn,
    TopUp,
    CashOut,
    ExitFee,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::BuyIn => write!(f, "buy_in"),
            EntryType::TopUp => write!(f, "top_up"),
            EntryType::CashOut => write!(f, "cash_out"),
            EntryType::ExitFee => write!(f, "exit_fee"),
        }
    }
}

/// Ledger entry; negative amounts leave the player's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    pub amount: i64,
    pub balance_after: Chips,
    pub entry_type: EntryType,
    pub created_at: DateTime<Utc>,
}
