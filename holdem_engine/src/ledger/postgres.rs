//! Postgres-backed ledger.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    Ledger,
    errors::{LedgerError, LedgerResult},
    models::{EntryType, SessionEnd, SessionId},
};
use crate::game::entities::{Chips, PlayerId, RoomId};

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Ledger over the `accounts`, `room_sessions` and `ledger_entries` tables.
///
/// Balance changes are single conditional updates, so concurrent rooms can
/// never overdraw an account.
#[derive(Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

fn to_db(amount: Chips) -> LedgerResult<i64> {
    i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))
}

fn from_db(amount: i64) -> Chips {
    Chips::try_from(amount).unwrap_or(0)
}

impl PgLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Current balance of an account.
    pub async fn balance(&self, player_id: PlayerId) -> LedgerResult<Chips> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE player_id = $1")
            .bind(player_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::AccountNotFound(player_id))?;
        Ok(from_db(row.get("balance")))
    }

    /// Atomically debit an account, distinguishing a missing account from a
    /// short balance.
    async fn debit(
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
        amount: i64,
    ) -> LedgerResult<i64> {
        let row = sqlx::query(
            "UPDATE accounts
             SET balance = balance - $1, updated_at = NOW()
             WHERE player_id = $2 AND balance >= $1
             RETURNING balance",
        )
        .bind(amount)
        .bind(player_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = row {
            return Ok(row.get("balance"));
        }

        let current = sqlx::query("SELECT balance FROM accounts WHERE player_id = $1")
            .bind(player_id)
            .fetch_optional(&mut **tx)
            .await?;
        match current {
            Some(row) => Err(LedgerError::InsufficientFunds {
                available: from_db(row.get("balance")),
                required: from_db(amount),
            }),
            None => Err(LedgerError::AccountNotFound(player_id)),
        }
    }

    async fn create_entry(
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
        session_id: SessionId,
        amount: i64,
        balance_after: i64,
        entry_type: EntryType,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (player_id, session_id, amount, balance_after, entry_type)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(player_id)
        .bind(session_id)
        .bind(amount)
        .bind(balance_after)
        .bind(entry_type.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn reserve_session(
        &self,
        player_id: PlayerId,
        amount: Chips,
        room_id: RoomId,
    ) -> LedgerResult<SessionId> {
        let db_amount = to_db(amount)?;
        if db_amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;
        let balance = Self::debit(&mut tx, player_id, db_amount).await?;

        let session_id = Uuid::new_v4();
        let inserted = sqlx::query(
            "INSERT INTO room_sessions (id, player_id, room_id, reserved)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(player_id)
        .bind(room_id)
        .bind(db_amount)
        .execute(&mut *tx)
        .await;

        // Partial unique index on active (player_id, room_id) rows.
        if let Err(sqlx::Error::Database(db_err)) = &inserted
            && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
        {
            return Err(LedgerError::SessionAlreadyActive(player_id));
        }
        inserted?;

        Self::create_entry(
            &mut tx,
            player_id,
            session_id,
            -db_amount,
            balance,
            EntryType::BuyIn,
        )
        .await?;
        tx.commit().await?;
        Ok(session_id)
    }

    async fn end_session(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        end: SessionEnd,
    ) -> LedgerResult<()> {
        let final_chips = to_db(end.final_chips)?;
        let rake_paid = to_db(end.rake_paid)?;
        let exit_fee = to_db(end.exit_fee)?;
        let net = to_db(end.net_return())?;

        let mut tx = self.pool.begin().await?;

        // Only one caller can flip ended_at; later calls find no active row.
        let closed = sqlx::query(
            "UPDATE room_sessions
             SET ended_at = NOW(), final_chips = $1, rake_paid = $2, exit_fee = $3
             WHERE id = $4 AND player_id = $5 AND ended_at IS NULL
             RETURNING id",
        )
        .bind(final_chips)
        .bind(rake_paid)
        .bind(exit_fee)
        .bind(session_id)
        .bind(player_id)
        .fetch_optional(&mut *tx)
        .await?;

        if closed.is_none() {
            let exists = sqlx::query("SELECT id FROM room_sessions WHERE id = $1 AND player_id = $2")
                .bind(session_id)
                .bind(player_id)
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                Some(_) => Ok(()),
                None => Err(LedgerError::SessionNotFound(session_id)),
            };
        }

        let row = sqlx::query(
            "UPDATE accounts
             SET balance = balance + $1, updated_at = NOW()
             WHERE player_id = $2
             RETURNING balance",
        )
        .bind(net)
        .bind(player_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::AccountNotFound(player_id))?;
        let balance: i64 = row.get("balance");

        if exit_fee > 0 {
            Self::create_entry(
                &mut tx,
                player_id,
                session_id,
                -exit_fee,
                balance,
                EntryType::ExitFee,
            )
            .await?;
        }
        Self::create_entry(
            &mut tx,
            player_id,
            session_id,
            final_chips,
            balance,
            EntryType::CashOut,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_chips(
        &self,
        player_id: PlayerId,
        session_id: SessionId,
        amount: Chips,
    ) -> LedgerResult<()> {
        let db_amount = to_db(amount)?;
        if db_amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let session = sqlx::query(
            "SELECT ended_at IS NOT NULL AS ended FROM room_sessions
             WHERE id = $1 AND player_id = $2
             FOR UPDATE",
        )
        .bind(session_id)
        .bind(player_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::SessionNotFound(session_id))?;
        if session.get::<bool, _>("ended") {
            return Err(LedgerError::SessionEnded(session_id));
        }

        let balance = Self::debit(&mut tx, player_id, db_amount).await?;
        sqlx::query("UPDATE room_sessions SET reserved = reserved + $1 WHERE id = $2")
            .bind(db_amount)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        Self::create_entry(
            &mut tx,
            player_id,
            session_id,
            -db_amount,
            balance,
            EntryType::TopUp,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
