//! Cards, deck, seats, actions and the public table views.

use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use super::betting::Street;

/// Chip amounts. Chips are whole units; there is no fractional currency.
pub type Chips = u64;

/// Stable player identity, resolved once when a session joins a room and
/// independent of whatever connection the player happens to be using.
pub type PlayerId = i64;

/// Room identifier.
pub type RoomId = i64;

/// Card value, 2 through 14 where 14 is the ace.
pub type Value = u8;

pub const ACE: Value = 14;
pub const DECK_SIZE: usize = 52;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Club,
    Diamond,
    Heart,
    Spade,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Diamond, Suit::Heart, Suit::Spade];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Suit::Club => "c",
            Suit::Diamond => "d",
            Suit::Heart => "h",
            Suit::Spade => "s",
        };
        write!(f, "{repr}")
    }
}

/// A playing card: value and suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl Card {
    pub fn value(&self) -> Value {
        self.0
    }

    pub fn suit(&self) -> Suit {
        self.1
    }
}

pub(crate) fn value_name(value: Value) -> &'static str {
    match value {
        2 => "Two",
        3 => "Three",
        4 => "Four",
        5 => "Five",
        6 => "Six",
        7 => "Seven",
        8 => "Eight",
        9 => "Nine",
        10 => "Ten",
        11 => "Jack",
        12 => "Queen",
        13 => "King",
        _ => "Ace",
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self.0 {
            10 => "T".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            ACE => "A".to_string(),
            v => v.to_string(),
        };
        write!(f, "{value}{}", self.1)
    }
}

/// A 52-card deck dealt sequentially without replacement.
///
/// Shuffles are driven by a ChaCha20 stream seeded per hand, so a hand can be
/// replayed from its seed during an audit.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
    deck_idx: usize,
}

impl Deck {
    /// Ordered deck, clubs first, deuces first within a suit.
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(DECK_SIZE);
        for suit in Suit::ALL {
            for value in 2..=ACE {
                cards.push(Card(value, suit));
            }
        }
        Self { cards, deck_idx: 0 }
    }

    pub fn shuffled(seed: u64) -> Self {
        let mut deck = Self::new();
        deck.shuffle(seed);
        deck
    }

    /// Fisher-Yates shuffle of the full deck. Resets the deal position.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        self.cards.shuffle(&mut rng);
        self.deck_idx = 0;
    }

    /// Deal the next card, or `None` once all 52 are out.
    pub fn deal_card(&mut self) -> Option<Card> {
        let card = self.cards.get(self.deck_idx).copied()?;
        self.deck_idx += 1;
        Some(card)
    }

    pub fn remaining(&self) -> usize {
        DECK_SIZE - self.deck_idx
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// Player actions. Bet and raise amounts are the seat's total bet for the
/// street after the action ("raise to"), not the increment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum Action {
    Fold,
    Check,
    Call,
    Bet(Chips),
    Raise(Chips),
    AllIn,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Fold => write!(f, "folds"),
            Action::Check => write!(f, "checks"),
            Action::Call => write!(f, "calls"),
            Action::Bet(amount) => write!(f, "bets {amount}"),
            Action::Raise(amount) => write!(f, "raises to {amount}"),
            Action::AllIn => write!(f, "goes all-in"),
        }
    }
}

/// Seat lifecycle.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Playing,
    WaitingForRebuy,
    Eliminated,
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatStatus::Playing => write!(f, "playing"),
            SeatStatus::WaitingForRebuy => write!(f, "waiting for rebuy"),
            SeatStatus::Eliminated => write!(f, "eliminated"),
        }
    }
}

/// One player slot at a room. Owned by exactly one engine.
#[derive(Clone, Debug)]
pub struct Seat {
    pub player_id: PlayerId,
    pub name: String,
    pub chips: Chips,
    /// Bet on the current street, not yet collected into the pot.
    pub street_bet: Chips,
    /// Everything this seat has put in during the current hand.
    pub contribution: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub hole_cards: Vec<Card>,
    pub is_bot: bool,
    pub total_rake_paid: Chips,
    pub status: SeatStatus,
    /// Dealt into the current hand.
    pub in_hand: bool,
    /// Hole cards shown at the last showdown.
    pub revealed: bool,
    /// Top-up received while the seat was in a hand, credited at settlement.
    pub pending_top_up: Chips,
    /// Leave requested mid-hand; removed once the hand settles.
    pub leaving: bool,
}

impl Seat {
    pub fn new(player_id: PlayerId, name: impl Into<String>, chips: Chips, is_bot: bool) -> Self {
        Self {
            player_id,
            name: name.into(),
            chips,
            street_bet: 0,
            contribution: 0,
            folded: false,
            all_in: false,
            hole_cards: Vec::with_capacity(2),
            is_bot,
            total_rake_paid: 0,
            status: SeatStatus::Playing,
            in_hand: false,
            revealed: false,
            pending_top_up: 0,
            leaving: false,
        }
    }

    /// Can be dealt into the next hand.
    pub fn is_eligible(&self) -> bool {
        self.status == SeatStatus::Playing && self.chips > 0 && !self.leaving
    }

    /// Still contesting the current hand.
    pub fn is_live(&self) -> bool {
        self.in_hand && !self.folded
    }

    /// Live and still holding chips to bet with.
    pub fn can_act(&self) -> bool {
        self.is_live() && !self.all_in
    }

    /// Move up to `amount` chips from the stack onto the street bet.
    /// Returns what was actually committed.
    pub(crate) fn commit(&mut self, amount: Chips) -> Chips {
        let committed = amount.min(self.chips);
        self.chips -= committed;
        self.street_bet += committed;
        self.contribution += committed;
        if self.chips == 0 {
            self.all_in = true;
        }
        committed
    }

    pub(crate) fn reset_for_hand(&mut self) {
        self.street_bet = 0;
        self.contribution = 0;
        self.folded = false;
        self.all_in = false;
        self.hole_cards.clear();
        self.in_hand = false;
        self.revealed = false;
    }
}

/// Public view of a seat. Hole cards are present only for the viewing
/// player or after a showdown reveal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatView {
    pub position: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub chips: Chips,
    pub street_bet: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub is_bot: bool,
    pub status: SeatStatus,
    pub sitting_out: bool,
    pub total_rake_paid: Chips,
    pub hole_cards: Option<Vec<Card>>,
}

/// Full table view sent to observers after every accepted mutation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameView {
    pub hand_number: u64,
    pub street: Street,
    /// Collected pot plus every outstanding street bet.
    pub pot: Chips,
    pub community: Vec<Card>,
    pub seats: Vec<SeatView>,
    pub dealer: Option<PlayerId>,
    pub actor: Option<PlayerId>,
    pub table_bet: Chips,
    /// Smallest legal "raise to" for the current actor, if a hand is running.
    pub min_raise_to: Option<Chips>,
    pub to_call: Option<Chips>,
}

impl GameView {
    pub fn seat(&self, player_id: PlayerId) -> Option<&SeatView> {
        self.seats.iter().find(|seat| seat.player_id == player_id)
    }
}

pub(crate) fn seat_view(
    position: usize,
    seat: &Seat,
    viewer: Option<PlayerId>,
    sitting_out: &HashSet<PlayerId>,
) -> SeatView {
    let visible = seat.revealed || viewer == Some(seat.player_id);
    SeatView {
        position,
        player_id: seat.player_id,
        name: seat.name.clone(),
        chips: seat.chips,
        street_bet: seat.street_bet,
        folded: seat.folded,
        all_in: seat.all_in,
        is_bot: seat.is_bot,
        status: seat.status,
        sitting_out: sitting_out.contains(&seat.player_id),
        total_rake_paid: seat.total_rake_paid,
        hole_cards: (visible && !seat.hole_cards.is_empty()).then(|| seat.hole_cards.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    // === Deck Tests ===

    #[test]
    fn test_new_deck_has_52_unique_cards() {
        let mut deck = Deck::new();
        let mut seen = BTreeSet::new();
        while let Some(card) = deck.deal_card() {
            assert!((2..=ACE).contains(&card.value()));
            seen.insert(card);
        }
        assert_eq!(seen.len(), DECK_SIZE);
        assert_eq!(deck.remaining(), 0);
    }

    #[test]
    fn test_deck_exhaustion_returns_none() {
        let mut deck = Deck::shuffled(7);
        for _ in 0..DECK_SIZE {
            assert!(deck.deal_card().is_some());
        }
        assert!(deck.deal_card().is_none());
    }

    #[test]
    fn test_same_seed_same_order() {
        let mut a = Deck::shuffled(42);
        let mut b = Deck::shuffled(42);
        for _ in 0..DECK_SIZE {
            assert_eq!(a.deal_card(), b.deal_card());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a: Vec<_> = std::iter::from_fn({
            let mut deck = Deck::shuffled(1);
            move || deck.deal_card()
        })
        .collect();
        let b: Vec<_> = std::iter::from_fn({
            let mut deck = Deck::shuffled(2);
            move || deck.deal_card()
        })
        .collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_shuffle_is_roughly_uniform() {
        // Position of the ace of spades over many seeds should spread across the deck.
        let mut first_half = 0;
        let trials = 2000;
        for seed in 0..trials {
            let mut deck = Deck::shuffled(seed);
            let position = std::iter::from_fn(|| deck.deal_card())
                .position(|card| card == Card(ACE, Suit::Spade))
                .unwrap();
            if position < DECK_SIZE / 2 {
                first_half += 1;
            }
        }
        assert!((800..1200).contains(&first_half), "first half hits: {first_half}");
    }

    // === Card Tests ===

    #[test]
    fn test_card_display() {
        assert_eq!(Card(ACE, Suit::Spade).to_string(), "As");
        assert_eq!(Card(10, Suit::Heart).to_string(), "Th");
        assert_eq!(Card(2, Suit::Club).to_string(), "2c");
    }

    // === Seat Tests ===

    #[test]
    fn test_commit_caps_at_stack_and_marks_all_in() {
        let mut seat = Seat::new(1, "alice", 30, false);
        assert_eq!(seat.commit(50), 30);
        assert_eq!(seat.chips, 0);
        assert_eq!(seat.street_bet, 30);
        assert_eq!(seat.contribution, 30);
        assert!(seat.all_in);
    }

    #[test]
    fn test_eligibility() {
        let mut seat = Seat::new(1, "alice", 100, false);
        assert!(seat.is_eligible());
        seat.status = SeatStatus::WaitingForRebuy;
        assert!(!seat.is_eligible());
        seat.status = SeatStatus::Playing;
        seat.chips = 0;
        assert!(!seat.is_eligible());
    }

    #[test]
    fn test_seat_view_hides_other_players_cards() {
        let mut seat = Seat::new(1, "alice", 100, false);
        seat.hole_cards = vec![Card(ACE, Suit::Spade), Card(13, Suit::Spade)];
        let none = HashSet::new();
        assert!(seat_view(0, &seat, Some(2), &none).hole_cards.is_none());
        assert!(seat_view(0, &seat, Some(1), &none).hole_cards.is_some());
        seat.revealed = true;
        assert!(seat_view(0, &seat, None, &none).hole_cards.is_some());
    }

    #[test]
    fn test_action_serde_shape() {
        let json = serde_json::to_string(&Action::Raise(40)).unwrap();
        assert_eq!(json, r#"{"type":"raise","amount":40}"#);
        let fold: Action = serde_json::from_str(r#"{"type":"fold"}"#).unwrap();
        assert_eq!(fold, Action::Fold);
    }
}
