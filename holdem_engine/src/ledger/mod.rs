//! External ledger boundary.
//!
//! The room never moves chips onto or off the table without the ledger: a
//! seat is created only after its buy-in was reserved, every departure ends
//! the session exactly once, and top-ups are reserved before they are
//! credited. Implementations must make `end_session` idempotent, since a
//! cash-out can race between a disconnect and a timeout.

use async_trait::async_trait;

use crate::game::entities::{Chips, PlayerId, RoomId};

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;

pub use errors::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use models::{EntryType, LedgerEntry, LedgerSession, SessionEnd, SessionId};
pub use postgres::PgLedger;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Move `amount` from the player's balance into a new room session.
    async fn reserve_session(
        &self,
        player_id: PlayerId,
        amount: Chips,
        room_id: RoomId,
    ) -> LedgerResult<SessionId>;

    /// Close the session and return `final_chips - exit_fee` to the balance.
    ///
    /// Ending a session that already ended is a no-op.
    async fn end_session(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        end: SessionEnd,
    ) -> LedgerResult<()>;

    /// Reserve more chips for an active session.
    async fn add_chips(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        amount: Chips,
    ) -> LedgerResult<()>;
}
