//! # Hold'em Engine
//!
//! An authoritative Texas Hold'em cash-game engine. Clients only propose
//! actions; the room validates each one, advances the hand and tells every
//! observer what happened.
//!
//! ## Core Modules
//!
//! - [`game`]: Deck, betting rounds, side pots, hand ranking and the
//!   per-room [`GameEngine`]
//! - [`table`]: Room actors (one Tokio task per room), turn timers,
//!   bankruptcy countdowns and the [`RoomRegistry`]
//! - [`ledger`]: Boundary to the account ledger that reserves buy-ins and
//!   settles cash-outs
//! - [`bot`]: Bot decision making for filling empty seats
//! - [`db`]: PostgreSQL connection pool and migrations for [`PgLedger`]
//!
//! ## Example
//!
//! ```
//! use holdem_engine::{Action, GameEngine, GameSettings, HandProgress};
//!
//! let mut engine = GameEngine::new(GameSettings::default(), 7);
//! engine.seat_player(1, "alice", 1_000, false).unwrap();
//! engine.seat_player(2, "bob", 1_000, false).unwrap();
//!
//! let HandProgress::NextTurn { player_id, .. } = engine.start_hand().unwrap() else {
//!     unreachable!("two seats with chips always produce a turn");
//! };
//! let progress = engine.apply_action(player_id, Action::Fold).unwrap();
//! assert!(matches!(progress, HandProgress::Settled(_)));
//! assert_eq!(engine.chips_on_table() + engine.house_rake(), 2_000);
//! ```

/// Bot players that fill empty seats.
pub mod bot;

/// Database pool and migrations.
pub mod db;

/// Hand engine, entities and poker rules.
pub mod game;
pub use game::{
    Action, Card, Chips, GameEngine, GameError, GameResult, GameSettings, GameView, HandProgress,
    HandSettlement, PlayerId, RakePolicy, RoomId, SeatStatus, Street,
};

/// Account ledger boundary.
pub mod ledger;
pub use ledger::{InMemoryLedger, Ledger, LedgerError, PgLedger};

/// Room actors and registry.
pub mod table;
pub use table::{RoomActor, RoomConfig, RoomError, RoomEvent, RoomHandle, RoomRegistry};
