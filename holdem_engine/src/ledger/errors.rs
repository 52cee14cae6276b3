//! Ledger error types.

use thiserror::Error;

use crate::game::entities::{Chips, PlayerId};

use super::models::SessionId;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not enough balance to reserve or top up
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Chips, required: Chips },

    #[error("Account not found for player {0}")]
    AccountNotFound(PlayerId),

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// One active session per player per room
    #[error("Player {0} already has an active session in this room")]
    SessionAlreadyActive(PlayerId),

    #[error("Session {0} has already ended")]
    SessionEnded(SessionId),

    /// Invalid amount (must be positive and fit the store)
    #[error("Invalid amount: {0}")]
    InvalidAmount(Chips),

    /// The ledger service could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak internals
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::Unavailable(_) => {
                "Ledger temporarily unavailable".to_string()
            }
            LedgerError::AccountNotFound(_) => "Account not found".to_string(),
            LedgerError::SessionNotFound(_) => "Session not found".to_string(),
            _ => self.to_string(),
        }
    }

    /// Worth retrying: the failure says nothing about the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Unavailable(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
