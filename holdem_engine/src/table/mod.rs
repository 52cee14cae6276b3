//! Rooms: one async actor per table plus the registry that spawns them.
//!
//! Each room runs in its own Tokio task with an mpsc inbox. The actor owns
//! the [`GameEngine`](crate::game::engine::GameEngine), the turn timer and
//! the ledger sessions of its seats, so every mutation of a room is applied
//! in a single serialized order.
//!
//! ## Example
//!
//! ```no_run
//! use holdem_engine::{ledger::InMemoryLedger, table::{RoomActor, RoomConfig}};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), holdem_engine::table::RoomError> {
//! let ledger = Arc::new(InMemoryLedger::with_balances([(1, 5_000)]));
//! let (actor, handle) = RoomActor::new(1, RoomConfig::default(), ledger);
//! tokio::spawn(actor.run());
//!
//! let snapshot = handle.join(1, "alice", 1_000).await?;
//! assert_eq!(snapshot.game.seats.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod bankruptcy;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod scheduler;

pub use actor::{RoomActor, RoomHandle, Subscription};
pub use config::RoomConfig;
pub use errors::{RoomError, RoomResult};
pub use manager::RoomRegistry;
pub use messages::{HaltReason, RoomEvent, RoomMessage, RoomSnapshot, RoomSummary};
