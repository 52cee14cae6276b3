//! Hand engine: deck, betting rounds, pots, hand ranking and the per-room
//! game engine that composes them.

pub mod betting;
pub mod engine;
pub mod entities;
pub mod errors;
pub mod eval;
pub mod pot;

pub use betting::{BettingRound, Street};
pub use engine::{
    GameEngine, GameSettings, Hand, HandProgress, HandSettlement, LeaveOutcome, MAX_SEATS,
    ShownHand, TopUp,
};
pub use entities::{
    Action, Card, Chips, Deck, GameView, PlayerId, RoomId, Seat, SeatStatus, SeatView, Suit,
};
pub use errors::{GameError, GameResult};
pub use eval::{HandEvaluator, HandRank, Rank, StandardEvaluator};
pub use pot::{Contribution, Pot, PotAward, RakePolicy, Settlement, WinnerShare};
