//! Engine error types.

use thiserror::Error;

use super::{betting::Street, entities::PlayerId};

/// Errors raised by the hand engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    /// Action from a seat that is not the current actor
    #[error("not your turn")]
    NotYourTurn,

    /// Action that is not legal in the current betting state
    #[error("illegal action: {0}")]
    IllegalAction(String),

    #[error("player {0} is not seated")]
    NotSeated(PlayerId),

    #[error("player {0} is already seated")]
    AlreadySeated(PlayerId),

    #[error("table is full")]
    TableFull,

    #[error("not enough eligible players to start a hand")]
    NotEnoughPlayers,

    #[error("a hand is already in progress")]
    HandInProgress,

    #[error("no hand in progress")]
    NoHandInProgress,

    /// Edge missing from the street transition table
    #[error("invalid street transition from {from} to {to}")]
    InvalidTransition { from: Street, to: Street },

    #[error("deck exhausted")]
    DeckExhausted,

    /// Chip conservation broken or a pot without eligible winners. Fatal for
    /// the hand; the room halts for manual audit.
    #[error("settlement consistency error: {0}")]
    SettlementConsistency(String),
}

impl GameError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GameError::SettlementConsistency(_)
                | GameError::InvalidTransition { .. }
                | GameError::DeckExhausted
        )
    }

    pub(crate) fn illegal(reason: impl Into<String>) -> Self {
        GameError::IllegalAction(reason.into())
    }
}

pub type GameResult<T> = Result<T, GameError>;
