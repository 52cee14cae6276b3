//! Per-room hand engine.
//!
//! [`GameEngine`] owns the seats and the current [`Hand`], validates every
//! action against the betting rules, advances streets and settles pots. It is
//! synchronous and clock-free; the room actor owns timers and the ledger.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{
    betting::{BettingRound, Street},
    entities::{Action, Card, Chips, Deck, GameView, PlayerId, Seat, SeatStatus, seat_view},
    errors::{GameError, GameResult},
    eval::{HandEvaluator, StandardEvaluator},
    pot::{self, Contribution, Pot, RakePolicy, Settlement},
};

/// Largest table the engine will seat. Two hole cards each plus a full board
/// must fit in one deck.
pub const MAX_SEATS: usize = 23;

/// Static table parameters.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameSettings {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: usize,
    pub rake: RakePolicy,
}

impl GameSettings {
    pub const fn new(small_blind: Chips, big_blind: Chips, max_seats: usize) -> Self {
        Self {
            small_blind,
            big_blind,
            max_seats,
            rake: RakePolicy::none(),
        }
    }

    pub const fn with_rake(mut self, rake: RakePolicy) -> Self {
        self.rake = rake;
        self
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self::new(10, 20, 9)
    }
}

/// One deal cycle.
#[derive(Clone, Debug)]
pub struct Hand {
    pub number: u64,
    /// Shuffle seed, kept for audit replay.
    pub seed: u64,
    deck: Deck,
    pub community: Vec<Card>,
    pub dealer: usize,
    pub small_blind: usize,
    pub big_blind: usize,
    pub actor: Option<usize>,
    pub round: BettingRound,
    /// Chips collected from finished streets.
    pub collected: Chips,
    /// Chips removed from seats since the hand started.
    pub committed: Chips,
    /// Bumped every time the turn moves. Timers carry it to detect staleness.
    pub turn: u64,
}

/// A hand shown down at settlement.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShownHand {
    pub player_id: PlayerId,
    pub cards: Vec<Card>,
    pub description: String,
}

/// Outcome of a finished hand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandSettlement {
    pub hand_number: u64,
    pub seed: u64,
    /// Won without a showdown because every other seat folded.
    pub walkover: bool,
    pub board: Vec<Card>,
    pub pots: Vec<Pot>,
    pub settlement: Settlement,
    pub shown: Vec<ShownHand>,
}

/// Where the hand stands after an accepted mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandProgress {
    /// Waiting on `player_id`. `turn` identifies this particular decision.
    NextTurn { player_id: PlayerId, turn: u64 },
    Settled(Box<HandSettlement>),
}

#[derive(Clone, Debug)]
pub enum LeaveOutcome {
    /// Seat removed; the caller owns cashing it out.
    Removed(Seat),
    /// Seat folded out of a running hand and will be removed at settlement.
    Deferred(Option<HandProgress>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopUp {
    Credited,
    /// Seat is in the running hand; chips land when it settles.
    Deferred,
}

pub struct GameEngine<E: HandEvaluator = StandardEvaluator> {
    settings: GameSettings,
    seats: Vec<Option<Seat>>,
    street: Street,
    hand: Option<Hand>,
    /// Board of the running hand, or of the last one until the next deal.
    board: Vec<Card>,
    dealer: Option<usize>,
    hand_number: u64,
    evaluator: E,
    seed_rng: ChaCha20Rng,
    house_rake: Chips,
    /// Every chip the engine is responsible for: stacks, bets, pot and
    /// pending top-ups.
    float: Chips,
}

impl GameEngine<StandardEvaluator> {
    pub fn new(settings: GameSettings, seed: u64) -> Self {
        Self::with_evaluator(settings, seed, StandardEvaluator)
    }
}

impl<E: HandEvaluator> GameEngine<E> {
    pub fn with_evaluator(settings: GameSettings, seed: u64, evaluator: E) -> Self {
        let max_seats = settings.max_seats.clamp(2, MAX_SEATS);
        Self {
            settings: GameSettings {
                max_seats,
                ..settings
            },
            seats: vec![None; max_seats],
            street: Street::WaitingForPlayers,
            hand: None,
            board: Vec::with_capacity(5),
            dealer: None,
            hand_number: 0,
            evaluator,
            seed_rng: ChaCha20Rng::seed_from_u64(seed),
            house_rake: 0,
            float: 0,
        }
    }

    // === Accessors ===

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn street(&self) -> Street {
        self.street
    }

    pub fn hand(&self) -> Option<&Hand> {
        self.hand.as_ref()
    }

    pub fn hand_in_progress(&self) -> bool {
        self.hand.is_some()
    }

    pub fn hand_number(&self) -> u64 {
        self.hand_number
    }

    pub fn board(&self) -> &[Card] {
        &self.board
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Rake collected over the engine's lifetime.
    pub fn house_rake(&self) -> Chips {
        self.house_rake
    }

    /// Chips held by the table: stacks, bets, pot and pending top-ups.
    pub fn chips_on_table(&self) -> Chips {
        self.float
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter().flatten()
    }

    pub fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats().find(|seat| seat.player_id == player_id)
    }

    pub fn seat_count(&self) -> usize {
        self.seats().count()
    }

    pub fn human_count(&self) -> usize {
        self.seats().filter(|seat| !seat.is_bot).count()
    }

    pub fn eligible_count(&self) -> usize {
        self.seats().filter(|seat| seat.is_eligible()).count()
    }

    pub fn is_full(&self) -> bool {
        self.seat_count() >= self.settings.max_seats
    }

    /// Current actor and the turn counter for their decision.
    pub fn current_actor(&self) -> Option<(PlayerId, u64)> {
        let hand = self.hand.as_ref()?;
        let seat = self.seat_at(hand.actor?)?;
        Some((seat.player_id, hand.turn))
    }

    /// Chips `player_id` must add to match the table bet.
    pub fn to_call(&self, player_id: PlayerId) -> Chips {
        match (self.hand.as_ref(), self.seat(player_id)) {
            (Some(hand), Some(seat)) => hand.round.table_bet.saturating_sub(seat.street_bet),
            _ => 0,
        }
    }

    pub fn can_check(&self, player_id: PlayerId) -> bool {
        self.hand.is_some() && self.to_call(player_id) == 0
    }

    /// Smallest legal "raise to" on the current street.
    pub fn min_raise_to(&self) -> Option<Chips> {
        self.hand
            .as_ref()
            .map(|hand| hand.round.min_raise_to(self.settings.big_blind))
    }

    /// Collected pot plus outstanding street bets.
    pub fn pot_total(&self) -> Chips {
        let collected = self.hand.as_ref().map_or(0, |hand| hand.collected);
        collected + self.seats().map(|seat| seat.street_bet).sum::<Chips>()
    }

    fn index_of(&self, player_id: PlayerId) -> Option<usize> {
        self.seats
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|seat| seat.player_id == player_id))
    }

    fn seat_at(&self, idx: usize) -> Option<&Seat> {
        self.seats.get(idx).and_then(Option::as_ref)
    }

    fn seat_at_mut(&mut self, idx: usize) -> GameResult<&mut Seat> {
        self.seats
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| GameError::SettlementConsistency(format!("seat {idx} vanished")))
    }

    /// First position after `from`, wrapping, whose seat satisfies `pred`.
    /// `from` itself is checked last.
    fn next_position(&self, from: usize, pred: impl Fn(&Seat) -> bool) -> Option<usize> {
        let len = self.seats.len();
        (1..=len)
            .map(|offset| (from + offset) % len)
            .find(|idx| self.seat_at(*idx).is_some_and(&pred))
    }

    fn transition(&mut self, next: Street) -> GameResult<()> {
        if !self.street.can_transition_to(next) {
            return Err(GameError::InvalidTransition {
                from: self.street,
                to: next,
            });
        }
        log::debug!("Hand #{}: {} -> {}", self.hand_number, self.street, next);
        self.street = next;
        Ok(())
    }

    // === Seating ===

    /// Seat a player with chips that were already reserved for them.
    pub fn seat_player(
        &mut self,
        player_id: PlayerId,
        name: impl Into<String>,
        chips: Chips,
        is_bot: bool,
    ) -> GameResult<usize> {
        if self.index_of(player_id).is_some() {
            return Err(GameError::AlreadySeated(player_id));
        }
        let idx = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::TableFull)?;
        self.seats[idx] = Some(Seat::new(player_id, name, chips, is_bot));
        self.float += chips;
        Ok(idx)
    }

    fn remove_at(&mut self, idx: usize) -> GameResult<Seat> {
        let seat = self
            .seats
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or_else(|| GameError::SettlementConsistency(format!("seat {idx} vanished")))?;
        self.float -= seat.chips + seat.pending_top_up;
        Ok(seat)
    }

    /// Leave the table. A seat contesting the running hand folds now and is
    /// removed once the hand settles. An all-in seat keeps its claim on the
    /// pots it is eligible for and leaves after showdown.
    pub fn request_leave(&mut self, player_id: PlayerId) -> GameResult<LeaveOutcome> {
        let idx = self.index_of(player_id).ok_or(GameError::NotSeated(player_id))?;
        let (in_hand, live) = self
            .seat_at(idx)
            .map(|seat| (seat.in_hand, seat.can_act()))
            .unwrap_or_default();

        if self.hand.is_none() || !in_hand {
            return self.remove_at(idx).map(LeaveOutcome::Removed);
        }

        self.seat_at_mut(idx)?.leaving = true;
        if !live {
            return Ok(LeaveOutcome::Deferred(None));
        }
        let is_actor = self.hand.as_ref().and_then(|hand| hand.actor) == Some(idx);
        let progress = if is_actor {
            self.apply_action(player_id, Action::Fold)?
        } else {
            self.seat_at_mut(idx)?.folded = true;
            self.progress(idx, true)?
        };
        Ok(LeaveOutcome::Deferred(Some(progress)))
    }

    /// Remove seats whose leave was deferred. Only between hands.
    pub fn take_departures(&mut self) -> GameResult<Vec<Seat>> {
        if self.hand.is_some() {
            return Ok(Vec::new());
        }
        let leaving: Vec<usize> = (0..self.seats.len())
            .filter(|idx| self.seat_at(*idx).is_some_and(|seat| seat.leaving))
            .collect();
        leaving.into_iter().map(|idx| self.remove_at(idx)).collect()
    }

    /// Remove a seat outright, e.g. when a rebuy window expires.
    pub fn remove_player(&mut self, player_id: PlayerId) -> GameResult<Seat> {
        let idx = self.index_of(player_id).ok_or(GameError::NotSeated(player_id))?;
        if self.seat_at(idx).is_some_and(|seat| seat.in_hand) && self.hand.is_some() {
            return Err(GameError::HandInProgress);
        }
        self.remove_at(idx)
    }

    /// Credit reserved chips to a seat. Refused for the seat currently on turn.
    pub fn add_chips(&mut self, player_id: PlayerId, amount: Chips) -> GameResult<TopUp> {
        if amount == 0 {
            return Err(GameError::illegal("top-up must be positive"));
        }
        let idx = self.index_of(player_id).ok_or(GameError::NotSeated(player_id))?;
        if self.hand.as_ref().and_then(|hand| hand.actor) == Some(idx) {
            return Err(GameError::illegal("cannot add chips while acting"));
        }
        let hand_running = self.hand.is_some();
        let seat = self.seat_at_mut(idx)?;
        let outcome = if hand_running && seat.in_hand {
            seat.pending_top_up += amount;
            TopUp::Deferred
        } else {
            seat.chips += amount;
            TopUp::Credited
        };
        self.float += amount;
        Ok(outcome)
    }

    pub fn set_status(&mut self, player_id: PlayerId, status: SeatStatus) -> GameResult<()> {
        let idx = self.index_of(player_id).ok_or(GameError::NotSeated(player_id))?;
        self.seat_at_mut(idx)?.status = status;
        Ok(())
    }

    /// Playing seats left without chips after a settlement.
    pub fn bankrupt_players(&self) -> Vec<PlayerId> {
        if self.hand.is_some() {
            return Vec::new();
        }
        self.seats()
            .filter(|seat| {
                seat.status == SeatStatus::Playing
                    && seat.chips == 0
                    && seat.pending_top_up == 0
                    && !seat.leaving
            })
            .map(|seat| seat.player_id)
            .collect()
    }

    // === Hand lifecycle ===

    /// Move the button, post blinds, deal hole cards and open pre-flop.
    pub fn start_hand(&mut self) -> GameResult<HandProgress> {
        if self.hand.is_some() {
            return Err(GameError::HandInProgress);
        }
        let eligible = self.eligible_count();
        if eligible < 2 {
            if self.street == Street::Showdown {
                self.transition(Street::WaitingForPlayers)?;
            }
            return Err(GameError::NotEnoughPlayers);
        }
        self.transition(Street::PostingBlinds)?;

        for seat in self.seats.iter_mut().flatten() {
            seat.reset_for_hand();
            seat.in_hand = seat.is_eligible();
        }
        let in_hand = |seat: &Seat| seat.in_hand;
        let last = self.seats.len() - 1;
        let dealer = self
            .next_position(self.dealer.unwrap_or(last), in_hand)
            .ok_or(GameError::NotEnoughPlayers)?;
        let (small_blind, big_blind) = if eligible == 2 {
            let other = self.next_position(dealer, in_hand).ok_or(GameError::NotEnoughPlayers)?;
            (dealer, other)
        } else {
            let sb = self.next_position(dealer, in_hand).ok_or(GameError::NotEnoughPlayers)?;
            let bb = self.next_position(sb, in_hand).ok_or(GameError::NotEnoughPlayers)?;
            (sb, bb)
        };
        self.dealer = Some(dealer);
        self.hand_number += 1;
        let seed = self.seed_rng.next_u64();
        let mut deck = Deck::shuffled(seed);

        let GameSettings {
            small_blind: sb_amount,
            big_blind: bb_amount,
            ..
        } = self.settings;
        let mut committed = self.seat_at_mut(small_blind)?.commit(sb_amount);
        committed += self.seat_at_mut(big_blind)?.commit(bb_amount);

        for _ in 0..2 {
            let mut idx = dealer;
            while let Some(next) = self.next_position(idx, in_hand) {
                let card = deck.deal_card().ok_or(GameError::DeckExhausted)?;
                self.seat_at_mut(next)?.hole_cards.push(card);
                idx = next;
                if next == dealer {
                    break;
                }
            }
        }

        let bb_player = self.seat_at(big_blind).map(|seat| seat.player_id);
        self.board.clear();
        self.hand = Some(Hand {
            number: self.hand_number,
            seed,
            deck,
            community: Vec::with_capacity(5),
            dealer,
            small_blind,
            big_blind,
            actor: None,
            round: BettingRound::open(bb_player, bb_amount),
            collected: 0,
            committed,
            turn: 0,
        });
        log::debug!(
            "Hand #{} started: {} players, dealer seat {}",
            self.hand_number,
            eligible,
            dealer
        );
        self.transition(Street::PreFlop)?;
        let progress = self.progress(big_blind, false)?;
        self.verify_invariants()?;
        Ok(progress)
    }

    /// Validate and apply an action from the current actor.
    pub fn apply_action(&mut self, player_id: PlayerId, action: Action) -> GameResult<HandProgress> {
        let (idx, table_bet, min_raise_to) = {
            let hand = self.hand.as_ref().ok_or(GameError::NotYourTurn)?;
            let idx = hand.actor.ok_or(GameError::NotYourTurn)?;
            let seat = self.seat_at(idx).ok_or(GameError::NotYourTurn)?;
            if seat.player_id != player_id {
                return Err(GameError::NotYourTurn);
            }
            if !seat.can_act() {
                return Err(GameError::illegal("seat has folded or is all-in"));
            }
            (
                idx,
                hand.round.table_bet,
                hand.round.min_raise_to(self.settings.big_blind),
            )
        };
        let (street_bet, chips) = self
            .seat_at(idx)
            .map(|seat| (seat.street_bet, seat.chips))
            .unwrap_or_default();
        let owed = table_bet.saturating_sub(street_bet);
        let max_to = street_bet + chips;

        // Validate everything before touching state.
        let raise_to = match action {
            Action::Fold | Action::Call => None,
            Action::Check if owed > 0 => {
                return Err(GameError::illegal(format!(
                    "cannot check facing a bet of {owed}"
                )));
            }
            Action::Check => None,
            Action::Bet(to) | Action::Raise(to) => {
                if to <= table_bet {
                    return Err(GameError::illegal(format!(
                        "raise to {to} does not exceed the current bet of {table_bet}"
                    )));
                }
                if to > max_to {
                    return Err(GameError::illegal(format!(
                        "raise to {to} exceeds the available {max_to}"
                    )));
                }
                if to < min_raise_to && to != max_to {
                    return Err(GameError::illegal(format!(
                        "minimum raise is to {min_raise_to}"
                    )));
                }
                Some(to)
            }
            Action::AllIn => (max_to > table_bet).then_some(max_to),
        };

        let seat = self.seat_at_mut(idx)?;
        let committed = match (action, raise_to) {
            (Action::Fold, _) => {
                seat.folded = true;
                0
            }
            (_, Some(to)) => seat.commit(to - street_bet),
            // Check, call, or an all-in that does not exceed the table bet.
            (Action::AllIn, None) => seat.commit(chips),
            _ => seat.commit(owed),
        };
        log::debug!("Hand #{}: player {} {}", self.hand_number, player_id, action);

        let hand = self.hand.as_mut().ok_or(GameError::NoHandInProgress)?;
        hand.committed += committed;
        match raise_to {
            Some(to) => hand.round.record_raise(player_id, to, to >= min_raise_to),
            None => hand.round.record_action(player_id),
        }

        let progress = self.progress(idx, false)?;
        self.verify_invariants()?;
        Ok(progress)
    }

    /// Check when free, otherwise fold. Used for timeouts and sat-out seats.
    pub fn apply_passive_action(&mut self, player_id: PlayerId) -> GameResult<HandProgress> {
        let action = if self.can_check(player_id) {
            Action::Check
        } else {
            Action::Fold
        };
        self.apply_action(player_id, action)
    }

    fn live_count(&self) -> usize {
        self.seats().filter(|seat| seat.is_live()).count()
    }

    /// Nobody left who could answer a bet: at most one seat still holds
    /// chips and it has already matched the table bet.
    fn should_run_out(&self) -> bool {
        let Some(hand) = self.hand.as_ref() else {
            return false;
        };
        let mut can_act = self.seats().filter(|seat| seat.can_act());
        let first = can_act.next();
        if can_act.next().is_some() {
            return false;
        }
        first.is_none_or(|seat| seat.street_bet >= hand.round.table_bet)
    }

    /// Advance after a mutation: settle, move to the next street, or pass the
    /// turn. With `keep_current`, a current actor who still owes a decision
    /// keeps the same turn.
    fn progress(&mut self, from: usize, keep_current: bool) -> GameResult<HandProgress> {
        let mut from = from;
        loop {
            if self.live_count() <= 1 {
                return self.finish_hand(true);
            }
            if self.should_run_out() {
                self.run_out()?;
                return self.finish_hand(false);
            }

            let hand = self.hand.as_ref().ok_or(GameError::NoHandInProgress)?;
            if keep_current {
                if let Some(idx) = hand.actor {
                    if let Some(seat) = self.seat_at(idx).filter(|s| hand.round.needs_action(s)) {
                        return Ok(HandProgress::NextTurn {
                            player_id: seat.player_id,
                            turn: hand.turn,
                        });
                    }
                }
            }

            if !hand.round.is_complete(self.seats.iter().flatten()) {
                let round = &hand.round;
                let next = self
                    .next_position(from, |seat| round.needs_action(seat))
                    .ok_or_else(|| {
                        GameError::SettlementConsistency("open round without an actor".into())
                    })?;
                let player_id = self.seat_at(next).map(|seat| seat.player_id).unwrap_or_default();
                let hand = self.hand.as_mut().ok_or(GameError::NoHandInProgress)?;
                hand.actor = Some(next);
                hand.turn += 1;
                return Ok(HandProgress::NextTurn {
                    player_id,
                    turn: hand.turn,
                });
            }

            self.collect_bets()?;
            let next_street = self.street.next_street().ok_or(GameError::NoHandInProgress)?;
            if next_street == Street::Showdown {
                self.transition(Street::Showdown)?;
                return self.finish_hand(false);
            }
            self.deal_board(next_street.board_size())?;
            self.transition(next_street)?;

            let dealer = self.hand.as_ref().map_or(0, |hand| hand.dealer);
            let first = self
                .next_position(dealer, Seat::can_act)
                .and_then(|idx| self.seat_at(idx))
                .map(|seat| seat.player_id);
            let hand = self.hand.as_mut().ok_or(GameError::NoHandInProgress)?;
            hand.round = BettingRound::open(first, 0);
            hand.actor = None;
            from = dealer;
        }
    }

    /// Move street bets into the collected pot.
    fn collect_bets(&mut self) -> GameResult<()> {
        let mut collected = 0;
        for seat in self.seats.iter_mut().flatten() {
            collected += seat.street_bet;
            seat.street_bet = 0;
        }
        let hand = self.hand.as_mut().ok_or(GameError::NoHandInProgress)?;
        hand.collected += collected;
        Ok(())
    }

    fn deal_board(&mut self, target: usize) -> GameResult<()> {
        let hand = self.hand.as_mut().ok_or(GameError::NoHandInProgress)?;
        while hand.community.len() < target {
            let card = hand.deck.deal_card().ok_or(GameError::DeckExhausted)?;
            hand.community.push(card);
        }
        self.board = hand.community.clone();
        Ok(())
    }

    /// Reveal the rest of the board with no further betting.
    fn run_out(&mut self) -> GameResult<()> {
        log::debug!("Hand #{}: all-in, running out the board", self.hand_number);
        self.collect_bets()?;
        self.deal_board(5)?;
        self.transition(Street::Showdown)
    }

    /// Build pots, rank live hands, pay winners and close the hand.
    fn finish_hand(&mut self, walkover: bool) -> GameResult<HandProgress> {
        self.collect_bets()?;
        if self.street != Street::Showdown {
            self.transition(Street::Showdown)?;
        }
        let hand = self.hand.as_ref().ok_or(GameError::NoHandInProgress)?;

        let contributions: Vec<Contribution> = self
            .seats()
            .filter(|seat| seat.in_hand)
            .map(|seat| Contribution {
                player_id: seat.player_id,
                amount: seat.contribution,
                folded: seat.folded,
            })
            .collect();
        let pots = pot::calculate_pots(&contributions);

        let mut shown = Vec::new();
        let results: Vec<_> = self
            .seats()
            .filter(|seat| seat.is_live())
            .map(|seat| {
                let mut cards = seat.hole_cards.clone();
                cards.extend_from_slice(&hand.community);
                let rank = self.evaluator.rank(&cards);
                if !walkover {
                    shown.push(ShownHand {
                        player_id: seat.player_id,
                        cards: seat.hole_cards.clone(),
                        description: rank.description(),
                    });
                }
                (seat.player_id, rank)
            })
            .collect();

        let settlement = pot::settle(&pots, &results, &self.settings.rake, &self.evaluator)?;
        let pot_total: Chips = pots.iter().map(|pot| pot.amount).sum();
        if pot_total != hand.collected {
            return Err(GameError::SettlementConsistency(format!(
                "pots hold {} but {} was collected",
                pot_total, hand.collected
            )));
        }

        let summary = HandSettlement {
            hand_number: hand.number,
            seed: hand.seed,
            walkover,
            board: hand.community.clone(),
            pots,
            settlement,
            shown,
        };

        for seat in self.seats.iter_mut().flatten() {
            if let Some(won) = summary.settlement.payouts.get(&seat.player_id) {
                seat.chips += won;
            }
            if let Some(rake) = summary.settlement.rake_by_player.get(&seat.player_id) {
                seat.total_rake_paid += rake;
            }
            if seat.is_live() && !walkover {
                seat.revealed = true;
            }
            seat.chips += std::mem::take(&mut seat.pending_top_up);
            seat.contribution = 0;
            seat.in_hand = false;
        }
        self.float -= summary.settlement.rake_total;
        self.house_rake += summary.settlement.rake_total;
        self.hand = None;
        self.verify_invariants()?;

        log::info!(
            "Hand #{} settled: {} paid, {} rake{}",
            summary.hand_number,
            summary.settlement.total_paid(),
            summary.settlement.rake_total,
            if walkover { ", walkover" } else { "" }
        );
        Ok(HandProgress::Settled(Box::new(summary)))
    }

    /// Cancel the running hand and return every contribution to its seat.
    /// Administrative only: room teardown or operator reset.
    pub fn abort_hand(&mut self) -> GameResult<Option<u64>> {
        let Some(hand) = self.hand.take() else {
            return Ok(None);
        };
        for seat in self.seats.iter_mut().flatten() {
            if seat.in_hand {
                seat.chips += seat.contribution;
            }
            seat.chips += std::mem::take(&mut seat.pending_top_up);
            seat.street_bet = 0;
            seat.contribution = 0;
            seat.in_hand = false;
            seat.hole_cards.clear();
        }
        if self.street.is_betting() {
            self.transition(Street::Showdown)?;
        }
        if self.street == Street::Showdown {
            self.transition(Street::WaitingForPlayers)?;
        }
        log::warn!("Hand #{} aborted, contributions refunded", hand.number);
        self.verify_invariants()?;
        Ok(Some(hand.number))
    }

    /// Chip conservation and seat-state invariants.
    pub fn verify_invariants(&self) -> GameResult<()> {
        let stacks: Chips = self
            .seats()
            .map(|seat| seat.chips + seat.street_bet + seat.pending_top_up)
            .sum();
        let collected = self.hand.as_ref().map_or(0, |hand| hand.collected);
        if stacks + collected != self.float {
            return Err(GameError::SettlementConsistency(format!(
                "table holds {} but {} was brought to it",
                stacks + collected,
                self.float
            )));
        }

        let Some(hand) = self.hand.as_ref() else {
            return Ok(());
        };
        let outstanding: Chips = self.seats().map(|seat| seat.street_bet).sum();
        if outstanding + hand.collected != hand.committed {
            return Err(GameError::SettlementConsistency(format!(
                "bets {} plus pot {} differ from {} committed",
                outstanding, hand.collected, hand.committed
            )));
        }
        if let Some(seat) = self
            .seats()
            .find(|seat| seat.is_live() && seat.chips == 0 && !seat.all_in)
        {
            return Err(GameError::SettlementConsistency(format!(
                "player {} has no chips but is not all-in",
                seat.player_id
            )));
        }
        if let Some(idx) = hand.actor {
            if !self.seat_at(idx).is_some_and(Seat::can_act) {
                return Err(GameError::SettlementConsistency(format!(
                    "seat {idx} is on turn but cannot act"
                )));
            }
        }
        Ok(())
    }

    /// Table view for `viewer` (their own hole cards are included).
    pub fn view(&self, viewer: Option<PlayerId>, sitting_out: &HashSet<PlayerId>) -> GameView {
        let seats = self
            .seats
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| {
                slot.as_ref()
                    .map(|seat| seat_view(position, seat, viewer, sitting_out))
            })
            .collect();
        let actor = self.current_actor().map(|(player_id, _)| player_id);
        GameView {
            hand_number: self.hand_number,
            street: self.street,
            pot: self.pot_total(),
            community: self.board.clone(),
            seats,
            dealer: self
                .dealer
                .and_then(|idx| self.seat_at(idx))
                .map(|seat| seat.player_id),
            actor,
            table_bet: self.hand.as_ref().map_or(0, |hand| hand.round.table_bet),
            min_raise_to: self.min_raise_to(),
            to_call: actor.map(|player_id| self.to_call(player_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(stacks: &[Chips]) -> GameEngine {
        let mut engine = GameEngine::new(GameSettings::new(10, 20, 6), 11);
        for (idx, chips) in stacks.iter().enumerate() {
            engine
                .seat_player(idx as PlayerId + 1, format!("p{}", idx + 1), *chips, false)
                .unwrap();
        }
        engine
    }

    fn actor(engine: &GameEngine) -> PlayerId {
        engine.current_actor().unwrap().0
    }

    #[test]
    fn test_start_requires_two_eligible_seats() {
        let mut engine = engine_with(&[1000]);
        assert_eq!(engine.start_hand().unwrap_err(), GameError::NotEnoughPlayers);
        assert_eq!(engine.street(), Street::WaitingForPlayers);
    }

    #[test]
    fn test_three_handed_blinds_and_first_actor() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        // Dealer seat 0, small blind seat 1, big blind seat 2, first to act seat 0.
        assert_eq!(engine.seat(2).unwrap().street_bet, 10);
        assert_eq!(engine.seat(3).unwrap().street_bet, 20);
        assert_eq!(actor(&engine), 1);
        assert_eq!(engine.pot_total(), 30);
        assert_eq!(engine.street(), Street::PreFlop);
        assert!(engine.seats().all(|seat| seat.hole_cards.len() == 2));
    }

    #[test]
    fn test_heads_up_dealer_posts_small_blind_and_acts_first() {
        let mut engine = engine_with(&[1000, 1000]);
        engine.start_hand().unwrap();
        assert_eq!(engine.seat(1).unwrap().street_bet, 10);
        assert_eq!(engine.seat(2).unwrap().street_bet, 20);
        assert_eq!(actor(&engine), 1);
    }

    #[test]
    fn test_out_of_turn_action_rejected() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        let (_, turn) = engine.current_actor().unwrap();
        assert_eq!(
            engine.apply_action(2, Action::Call).unwrap_err(),
            GameError::NotYourTurn
        );
        assert_eq!(engine.current_actor().unwrap(), (1, turn));
    }

    #[test]
    fn test_min_raise_enforced() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        assert!(matches!(
            engine.apply_action(1, Action::Raise(25)),
            Err(GameError::IllegalAction(_))
        ));
        engine.apply_action(1, Action::Raise(40)).unwrap();
        assert_eq!(engine.hand().unwrap().round.table_bet, 40);
        assert_eq!(engine.min_raise_to(), Some(60));
    }

    #[test]
    fn test_check_when_owing_rejected() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        assert!(matches!(
            engine.apply_action(1, Action::Check),
            Err(GameError::IllegalAction(_))
        ));
    }

    #[test]
    fn test_big_blind_keeps_option() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::Call).unwrap();
        engine.apply_action(2, Action::Call).unwrap();
        // Every bet matches, but the big blind has not acted yet.
        assert_eq!(engine.street(), Street::PreFlop);
        assert_eq!(actor(&engine), 3);
        engine.apply_action(3, Action::Check).unwrap();
        assert_eq!(engine.street(), Street::Flop);
        assert_eq!(engine.board().len(), 3);
        // Post-flop action starts left of the dealer.
        assert_eq!(actor(&engine), 2);
    }

    #[test]
    fn test_fold_to_walkover() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::Fold).unwrap();
        let progress = engine.apply_action(2, Action::Fold).unwrap();
        let HandProgress::Settled(summary) = progress else {
            panic!("hand should settle");
        };
        assert!(summary.walkover);
        assert!(summary.shown.is_empty());
        assert_eq!(summary.settlement.payouts[&3], 30);
        assert_eq!(engine.seat(3).unwrap().chips, 1010);
        assert_eq!(engine.street(), Street::Showdown);
        assert!(!engine.hand_in_progress());
    }

    #[test]
    fn test_all_in_call_runs_out_board() {
        let mut engine = engine_with(&[1000, 300]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::AllIn).unwrap();
        let progress = engine.apply_action(2, Action::Call).unwrap();
        let HandProgress::Settled(summary) = progress else {
            panic!("hand should settle after the all-in is called");
        };
        assert_eq!(summary.board.len(), 5);
        assert!(!summary.walkover);
        assert_eq!(summary.pots.len(), 2);
        assert_eq!(summary.pots[1].amount, 700);
        assert_eq!(summary.pots[1].eligible, vec![1]);
        assert_eq!(engine.chips_on_table(), 1300);
        assert_eq!(engine.seats().map(|seat| seat.chips).sum::<Chips>(), 1300);
    }

    #[test]
    fn test_big_blind_shove_reopens_action() {
        let mut engine = engine_with(&[1000, 1000, 50]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::Raise(30)).unwrap_err();
        engine.apply_action(1, Action::Call).unwrap();
        engine.apply_action(2, Action::Call).unwrap();
        // Big blind shoves for 50 total, a full raise over 20.
        engine.apply_action(3, Action::AllIn).unwrap();
        assert_eq!(engine.hand().unwrap().round.table_bet, 50);
        engine.apply_action(1, Action::Call).unwrap();
        engine.apply_action(2, Action::Call).unwrap();
        assert_eq!(engine.street(), Street::Flop);
        assert_eq!(engine.pot_total(), 150);
    }

    #[test]
    fn test_leave_mid_hand_folds_and_defers_removal() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        // Seat 2 is not on turn; leaving folds it without moving the turn.
        let (_, turn) = engine.current_actor().unwrap();
        let outcome = engine.request_leave(2).unwrap();
        assert!(matches!(outcome, LeaveOutcome::Deferred(Some(HandProgress::NextTurn { player_id: 1, turn: t })) if t == turn));
        assert!(engine.seat(2).unwrap().folded);
        engine.apply_action(1, Action::Fold).unwrap();
        assert!(!engine.hand_in_progress());
        let departed = engine.take_departures().unwrap();
        assert_eq!(departed.len(), 1);
        assert_eq!(departed[0].chips, 990);
        assert!(engine.seat(2).is_none());
        assert_eq!(engine.chips_on_table(), 2010);
    }

    #[test]
    fn test_all_in_seat_leaving_stays_in_showdown() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::AllIn).unwrap();
        let outcome = engine.request_leave(1).unwrap();
        assert!(matches!(outcome, LeaveOutcome::Deferred(None)));
        let seat = engine.seat(1).unwrap();
        assert!(seat.leaving);
        assert!(seat.all_in);
        assert!(!seat.folded);

        // Both callers are all-in too, so the board runs out to showdown.
        engine.apply_action(2, Action::Call).unwrap();
        engine.apply_action(3, Action::Call).unwrap();
        assert!(!engine.hand_in_progress());
        let departed = engine.take_departures().unwrap();
        assert_eq!(departed.len(), 1);
        assert_eq!(departed[0].player_id, 1);
        assert_eq!(
            departed[0].chips + engine.seats().map(|seat| seat.chips).sum::<Chips>(),
            3000
        );
        engine.verify_invariants().unwrap();
    }

    #[test]
    fn test_top_up_refused_while_acting_and_deferred_in_hand() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        assert!(matches!(
            engine.add_chips(1, 100),
            Err(GameError::IllegalAction(_))
        ));
        assert_eq!(engine.add_chips(2, 100).unwrap(), TopUp::Deferred);
        assert_eq!(engine.seat(2).unwrap().chips, 990);
        engine.apply_action(1, Action::Fold).unwrap();
        engine.apply_action(2, Action::Fold).unwrap();
        assert_eq!(engine.seat(2).unwrap().chips, 1090);
        engine.verify_invariants().unwrap();
    }

    #[test]
    fn test_bankrupt_players_after_losing_all_in() {
        let mut engine = engine_with(&[1000, 300]);
        let mut busted = None;
        for _ in 0..50 {
            let mut progress = engine.start_hand().unwrap();
            while let HandProgress::NextTurn { player_id, .. } = progress {
                progress = engine.apply_action(player_id, Action::AllIn).unwrap();
            }
            let bankrupt = engine.bankrupt_players();
            if !bankrupt.is_empty() {
                busted = Some(bankrupt);
                break;
            }
        }
        let busted = busted.expect("someone busts within 50 all-in hands");
        assert_eq!(busted.len(), 1);
        assert_eq!(engine.seat(busted[0]).unwrap().chips, 0);
        assert_eq!(engine.chips_on_table(), 1300);
    }

    #[test]
    fn test_abort_hand_refunds_contributions() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        engine.apply_action(1, Action::Raise(100)).unwrap();
        engine.abort_hand().unwrap();
        assert!(engine.seats().all(|seat| seat.chips == 1000));
        assert_eq!(engine.street(), Street::WaitingForPlayers);
    }

    #[test]
    fn test_view_shows_turn_and_minimum() {
        let mut engine = engine_with(&[1000, 1000, 1000]);
        engine.start_hand().unwrap();
        let view = engine.view(Some(1), &HashSet::new());
        assert_eq!(view.actor, Some(1));
        assert_eq!(view.min_raise_to, Some(40));
        assert_eq!(view.to_call, Some(20));
        assert_eq!(view.pot, 30);
        assert!(view.seat(1).unwrap().hole_cards.is_some());
        assert!(view.seat(2).unwrap().hole_cards.is_none());
    }
}
