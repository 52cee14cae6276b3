//! In-process ledger for development and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Ledger,
    errors::{LedgerError, LedgerResult},
    models::{EntryType, LedgerEntry, LedgerSession, SessionEnd, SessionId},
};
use crate::game::entities::{Chips, PlayerId, RoomId};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<PlayerId, Chips>,
    sessions: HashMap<SessionId, LedgerSession>,
    entries: Vec<LedgerEntry>,
    /// Every call fails with `Unavailable` while set.
    offline: bool,
    /// Number of upcoming `end_session` calls that fail.
    failing_cashouts: usize,
}

impl LedgerState {
    fn check_online(&self) -> LedgerResult<()> {
        if self.offline {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }

    fn debit(&mut self, player_id: PlayerId, amount: Chips) -> LedgerResult<Chips> {
        let balance = self
            .balances
            .get_mut(&player_id)
            .ok_or(LedgerError::AccountNotFound(player_id))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                available: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    fn record(
        &mut self,
        player_id: PlayerId,
        session_id: SessionId,
        amount: i64,
        balance_after: Chips,
        entry_type: EntryType,
    ) {
        self.entries.push(LedgerEntry {
            player_id,
            session_id,
            amount,
            balance_after,
            entry_type,
            created_at: Utc::now(),
        });
    }

    fn active_session(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
    ) -> LedgerResult<&LedgerSession> {
        let session = self
            .sessions
            .get(&session_id)
            .filter(|session| session.player_id == player_id)
            .ok_or(LedgerError::SessionNotFound(session_id))?;
        if !session.is_active() {
            return Err(LedgerError::SessionEnded(session_id));
        }
        Ok(session)
    }
}

/// Balances and sessions kept in memory behind a single lock, so every
/// operation is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with the given opening balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (PlayerId, Chips)>) -> Self {
        let state = LedgerState {
            balances: balances.into_iter().collect(),
            ..LedgerState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Credit an account, creating it if needed.
    pub async fn deposit(&self, player_id: PlayerId, amount: Chips) -> Chips {
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(player_id).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }

    pub async fn balance(&self, player_id: PlayerId) -> Option<Chips> {
        self.state.lock().await.balances.get(&player_id).copied()
    }

    pub async fn session(&self, session_id: SessionId) -> Option<LedgerSession> {
        self.state.lock().await.sessions.get(&session_id).cloned()
    }

    pub async fn active_sessions(&self) -> Vec<LedgerSession> {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .filter(|session| session.is_active())
            .cloned()
            .collect()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }

    /// Simulate an outage of the backing service.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Make the next `count` session ends fail with `Unavailable`.
    pub async fn fail_next_cashouts(&self, count: usize) {
        self.state.lock().await.failing_cashouts = count;
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn reserve_session(
        &self,
        player_id: PlayerId,
        amount: Chips,
        room_id: RoomId,
    ) -> LedgerResult<SessionId> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        state.check_online()?;

        let already_seated = state
            .sessions
            .values()
            .any(|s| s.player_id == player_id && s.room_id == room_id && s.is_active());
        if already_seated {
            return Err(LedgerError::SessionAlreadyActive(player_id));
        }

        let balance = state.debit(player_id, amount)?;
        let session_id = Uuid::new_v4();
        state.sessions.insert(
            session_id,
            LedgerSession {
                id: session_id,
                player_id,
                room_id,
                reserved: amount,
                started_at: Utc::now(),
                ended: None,
                ended_at: None,
            },
        );
        let signed = i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))?;
        state.record(player_id, session_id, -signed, balance, EntryType::BuyIn);
        Ok(session_id)
    }

    async fn end_session(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        end: SessionEnd,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.check_online()?;
        if state.failing_cashouts > 0 {
            state.failing_cashouts -= 1;
            return Err(LedgerError::Unavailable("cash-out rejected".to_string()));
        }

        let session = state
            .sessions
            .get_mut(&session_id)
            .filter(|session| session.player_id == player_id)
            .ok_or(LedgerError::SessionNotFound(session_id))?;
        if !session.is_active() {
            return Ok(());
        }
        session.ended = Some(end);
        session.ended_at = Some(Utc::now());

        let net = end.net_return();
        let balance = state.balances.entry(player_id).or_insert(0);
        *balance = balance.saturating_add(net);
        let balance = *balance;

        let to_signed = |amount: Chips| {
            i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))
        };
        if end.exit_fee > 0 {
            let fee = to_signed(end.exit_fee)?;
            state.record(player_id, session_id, -fee, balance, EntryType::ExitFee);
        }
        let gross = to_signed(end.final_chips)?;
        state.record(player_id, session_id, gross, balance, EntryType::CashOut);
        Ok(())
    }

    async fn add_chips(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        amount: Chips,
    ) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        state.check_online()?;
        state.active_session(player_id, session_id)?;

        let balance = state.debit(player_id, amount)?;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.reserved += amount;
        }
        let signed = i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))?;
        state.record(player_id, session_id, -signed, balance, EntryType::TopUp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(final_chips: Chips) -> SessionEnd {
        SessionEnd {
            final_chips,
            rake_paid: 0,
            exit_fee: 0,
        }
    }

    #[tokio::test]
    async fn test_reserve_debits_balance() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();

        assert_eq!(ledger.balance(1).await, Some(600));
        let session = ledger.session(session).await.unwrap();
        assert_eq!(session.reserved, 400);
        assert_eq!(session.room_id, 7);
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_reserve_insufficient_funds() {
        let ledger = InMemoryLedger::with_balances([(1, 100)]);
        let result = ledger.reserve_session(1, 400, 7).await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds {
                available: 100,
                required: 400
            })
        ));
        assert_eq!(ledger.balance(1).await, Some(100));
    }

    #[tokio::test]
    async fn test_reserve_unknown_account() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            ledger.reserve_session(9, 100, 1).await,
            Err(LedgerError::AccountNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_one_active_session_per_room() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        ledger.reserve_session(1, 200, 7).await.unwrap();

        assert!(matches!(
            ledger.reserve_session(1, 200, 7).await,
            Err(LedgerError::SessionAlreadyActive(1))
        ));
        assert!(ledger.reserve_session(1, 200, 8).await.is_ok());
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();

        ledger.end_session(1, session, end(550)).await.unwrap();
        ledger.end_session(1, session, end(550)).await.unwrap();

        assert_eq!(ledger.balance(1).await, Some(1150));
        let cashouts = ledger
            .entries()
            .await
            .iter()
            .filter(|e| e.entry_type == EntryType::CashOut)
            .count();
        assert_eq!(cashouts, 1);
    }

    #[tokio::test]
    async fn test_exit_fee_withheld() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();
        let end = SessionEnd {
            final_chips: 400,
            rake_paid: 12,
            exit_fee: 20,
        };
        ledger.end_session(1, session, end).await.unwrap();

        assert_eq!(ledger.balance(1).await, Some(980));
        assert_eq!(ledger.session(session).await.unwrap().ended, Some(end));
    }

    #[tokio::test]
    async fn test_add_chips() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();

        ledger.add_chips(1, session, 300).await.unwrap();
        assert_eq!(ledger.balance(1).await, Some(300));
        assert_eq!(ledger.session(session).await.unwrap().reserved, 700);

        assert!(matches!(
            ledger.add_chips(1, session, 500).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_chips_to_ended_session() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();
        ledger.end_session(1, session, end(400)).await.unwrap();

        assert!(matches!(
            ledger.add_chips(1, session, 100).await,
            Err(LedgerError::SessionEnded(_))
        ));
    }

    #[tokio::test]
    async fn test_session_owned_by_other_player() {
        let ledger = InMemoryLedger::with_balances([(1, 1000), (2, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();

        assert!(matches!(
            ledger.end_session(2, session, end(400)).await,
            Err(LedgerError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_cashouts_recover() {
        let ledger = InMemoryLedger::with_balances([(1, 1000)]);
        let session = ledger.reserve_session(1, 400, 7).await.unwrap();
        ledger.fail_next_cashouts(1).await;

        let err = ledger.end_session(1, session, end(400)).await.unwrap_err();
        assert!(err.is_transient());
        ledger.end_session(1, session, end(400)).await.unwrap();
        assert_eq!(ledger.balance(1).await, Some(1000));
    }
}
