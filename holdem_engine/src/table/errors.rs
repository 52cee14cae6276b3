//! Room error types.

use thiserror::Error;

use crate::{
    game::{
        entities::{Chips, RoomId},
        errors::GameError,
    },
    ledger::LedgerError,
};

/// Errors surfaced to callers of a room or the registry
#[derive(Debug, Error)]
pub enum RoomError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error("Room {0} not found")]
    RoomNotFound(RoomId),

    #[error("Room is closed")]
    RoomClosed,

    /// Awaiting manual audit or an unresolved cash-out
    #[error("Room is halted")]
    RoomHalted,

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Chips, required: Chips },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Top-up on cooldown, retry in {retry_after_secs}s")]
    TopUpCooldown { retry_after_secs: u64 },

    #[error("Invalid buy-in: {0}")]
    InvalidBuyIn(String),

    #[error("Invalid room config: {0}")]
    InvalidConfig(String),
}

impl From<LedgerError> for RoomError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                required,
            } => RoomError::InsufficientFunds {
                available,
                required,
            },
            other => RoomError::Ledger(other),
        }
    }
}

impl RoomError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Game(GameError::SettlementConsistency(_)) => {
                "Room halted for audit".to_string()
            }
            RoomError::Game(err) if err.is_fatal() => "Internal game error".to_string(),
            RoomError::Ledger(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for room operations
pub type RoomResult<T> = Result<T, RoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_shortfall_maps_to_insufficient_funds() {
        let err: RoomError = LedgerError::InsufficientFunds {
            available: 50,
            required: 400,
        }
        .into();
        assert!(matches!(
            err,
            RoomError::InsufficientFunds {
                available: 50,
                required: 400
            }
        ));
    }

    #[test]
    fn test_client_message_hides_internals() {
        let err = RoomError::Ledger(LedgerError::Unavailable("pg://secret@host".to_string()));
        assert_eq!(err.client_message(), "Ledger temporarily unavailable");

        let err = RoomError::Game(GameError::SettlementConsistency("pot 2".to_string()));
        assert_eq!(err.client_message(), "Room halted for audit");

        let err = RoomError::Game(GameError::NotYourTurn);
        assert_eq!(err.client_message(), "not your turn");
    }
}
