//! Streets and per-street betting round state.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use super::entities::{Chips, PlayerId, Seat};

/// Phase of the room's hand cycle.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    WaitingForPlayers,
    PostingBlinds,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Street {
    /// The fixed transition table. Every edge not listed here is rejected.
    pub fn can_transition_to(self, next: Street) -> bool {
        use Street::*;
        matches!(
            (self, next),
            (WaitingForPlayers, PostingBlinds)
                | (PostingBlinds, PreFlop)
                | (PreFlop, Flop)
                | (PreFlop, Showdown)
                | (Flop, Turn)
                | (Flop, Showdown)
                | (Turn, River)
                | (Turn, Showdown)
                | (River, Showdown)
                | (Showdown, WaitingForPlayers)
                | (Showdown, PostingBlinds)
        )
    }

    pub fn is_betting(self) -> bool {
        matches!(
            self,
            Street::PreFlop | Street::Flop | Street::Turn | Street::River
        )
    }

    /// Next betting street, or showdown after the river.
    pub fn next_street(self) -> Option<Street> {
        match self {
            Street::PreFlop => Some(Street::Flop),
            Street::Flop => Some(Street::Turn),
            Street::Turn => Some(Street::River),
            Street::River => Some(Street::Showdown),
            _ => None,
        }
    }

    /// Community cards on the board once this street is reached.
    pub fn board_size(self) -> usize {
        match self {
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River | Street::Showdown => 5,
            _ => 0,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Street::WaitingForPlayers => "waiting for players",
            Street::PostingBlinds => "posting blinds",
            Street::PreFlop => "pre-flop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
            Street::Showdown => "showdown",
        };
        write!(f, "{repr}")
    }
}

/// Betting state for one street. Rebuilt whenever the street advances.
#[derive(Clone, Debug, Default)]
pub struct BettingRound {
    /// Seat whose bet the others must match.
    pub aggressor: Option<PlayerId>,
    /// Seats that have acted since the last raise.
    acted: HashSet<PlayerId>,
    pub complete: bool,
    /// Amount every live seat must match.
    pub table_bet: Chips,
    /// Table bet before the last full raise; sets the raise increment.
    pub previous_bet: Chips,
}

impl BettingRound {
    pub fn open(aggressor: Option<PlayerId>, table_bet: Chips) -> Self {
        Self {
            aggressor,
            acted: HashSet::new(),
            complete: false,
            table_bet,
            previous_bet: 0,
        }
    }

    /// `currentBet + max(bigBlind, currentBet - previousBet)`
    pub fn min_raise_to(&self, big_blind: Chips) -> Chips {
        let increment = self.table_bet.saturating_sub(self.previous_bet);
        self.table_bet + big_blind.max(increment)
    }

    pub fn record_action(&mut self, player_id: PlayerId) {
        self.acted.insert(player_id);
    }

    /// A bet above the table bet. Everyone else must act again.
    ///
    /// A short all-in moves the table bet without changing the raise
    /// increment, so the next full raise is measured from the last full one.
    pub fn record_raise(&mut self, player_id: PlayerId, new_table_bet: Chips, full_raise: bool) {
        if full_raise {
            self.previous_bet = self.table_bet;
        } else {
            let increment = self.table_bet.saturating_sub(self.previous_bet);
            self.previous_bet = new_table_bet.saturating_sub(increment);
        }
        self.table_bet = new_table_bet;
        self.aggressor = Some(player_id);
        self.acted.clear();
        self.acted.insert(player_id);
    }

    pub fn has_acted(&self, player_id: PlayerId) -> bool {
        self.acted.contains(&player_id)
    }

    /// Seat still owes a decision this street.
    pub fn needs_action(&self, seat: &Seat) -> bool {
        seat.can_act() && (!self.has_acted(seat.player_id) || seat.street_bet < self.table_bet)
    }

    /// Round-completion rule.
    ///
    /// Complete once at most one live seat remains, or every seat that can
    /// still bet has acted since the last raise and matched the table bet.
    /// Blind posts are not actions, so the big blind keeps its option
    /// pre-flop even when every bet already matches.
    pub fn is_complete<'a>(&self, seats: impl IntoIterator<Item = &'a Seat>) -> bool {
        let mut live = 0;
        for seat in seats.into_iter().filter(|seat| seat.is_live()) {
            live += 1;
            if self.needs_action(seat) {
                return false;
            }
        }
        live >= 1
    }
}
