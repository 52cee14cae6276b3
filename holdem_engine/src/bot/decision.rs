//! Bot decision-making logic with difficulty-based behavior.

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::models::DifficultyParams;
use crate::game::{
    entities::{ACE, Action, Card, Chips},
    eval::{Rank, eval},
};

// === Hand Strength Base Values ===

const STRENGTH_HIGH_CARD: f32 = 0.1;
const STRENGTH_ONE_PAIR: f32 = 0.25;
const STRENGTH_TWO_PAIR: f32 = 0.40;
const STRENGTH_THREE_OF_A_KIND: f32 = 0.55;
const STRENGTH_STRAIGHT: f32 = 0.70;
const STRENGTH_FLUSH: f32 = 0.75;
const STRENGTH_FULL_HOUSE: f32 = 0.85;
const STRENGTH_FOUR_OF_A_KIND: f32 = 0.95;
const STRENGTH_STRAIGHT_FLUSH: f32 = 0.99;

/// Tuning shared by every difficulty.
#[derive(Debug, Clone)]
pub struct BotDecisionConfig {
    /// Bluff size as a multiplier of the current pot.
    pub bluff_size_multiplier: f32,

    /// Pot odds above this add `pot_odds_bonus_value` to the call chance.
    pub pot_odds_bonus_threshold: f32,
    pub pot_odds_bonus_value: f32,

    /// call_prob = base + aggression / divisor
    pub base_call_probability: f32,
    pub call_aggression_divisor: f32,

    /// raise_prob = base + aggression / divisor
    pub base_raise_probability: f32,
    pub raise_aggression_divisor: f32,

    /// Raise sizing in multiples of pot plus call, by aggression band.
    pub passive_raise_multiplier: f32,
    pub moderate_raise_multiplier: f32,
    pub aggressive_raise_multiplier: f32,

    /// Raise amount varies by ±this fraction.
    pub raise_variance: f32,

    // Position adjustments to hand strength.
    pub late_position_bonus: f32,
    pub middle_position_bonus: f32,
    pub early_middle_position_penalty: f32,
    pub utg_position_penalty: f32,
}

impl Default for BotDecisionConfig {
    fn default() -> Self {
        Self {
            bluff_size_multiplier: 1.5,
            pot_odds_bonus_threshold: 0.25,
            pot_odds_bonus_value: 0.2,
            base_call_probability: 0.3,
            call_aggression_divisor: 5.0,
            base_raise_probability: 0.4,
            raise_aggression_divisor: 4.0,
            passive_raise_multiplier: 2.0,
            moderate_raise_multiplier: 2.5,
            aggressive_raise_multiplier: 3.0,
            raise_variance: 0.2,
            late_position_bonus: 0.08,
            middle_position_bonus: 0.04,
            early_middle_position_penalty: -0.03,
            utg_position_penalty: -0.05,
        }
    }
}

/// What the bot can see when it is on turn.
#[derive(Debug, Clone)]
pub struct BotDecisionContext<'a> {
    pub hole_cards: &'a [Card],
    pub board_cards: &'a [Card],

    /// Collected pot plus outstanding bets
    pub pot: Chips,

    /// Chips needed to match the table bet
    pub to_call: Chips,

    /// Bet every seat must match this street
    pub table_bet: Chips,

    /// Smallest legal raise target
    pub min_raise_to: Chips,

    /// What the bot already put in this street
    pub street_bet: Chips,

    /// Bot's remaining stack
    pub chips: Chips,

    /// Seats acting after the bot this street (0 = last to act)
    pub position: Option<usize>,

    /// Players still contesting the hand
    pub players_remaining: usize,
}

impl BotDecisionContext<'_> {
    fn can_check(&self) -> bool {
        self.to_call == 0
    }

    /// Largest "raise to" the bot can reach.
    fn max_raise_to(&self) -> Chips {
        self.street_bet + self.chips
    }
}

/// Bot decision maker
pub struct BotDecisionMaker {
    rng: StdRng,
    config: BotDecisionConfig,
}

impl BotDecisionMaker {
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, BotDecisionConfig::default())
    }

    pub fn with_config(seed: u64, config: BotDecisionConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Pick an action from hand strength, position and pot odds.
    ///
    /// Raises are always sized at or above `min_raise_to`; anything the
    /// bot cannot afford becomes `AllIn`.
    pub fn decide_action(&mut self, params: &DifficultyParams, ctx: &BotDecisionContext) -> Action {
        let position_modifier =
            self.calculate_position_modifier(ctx.position, ctx.players_remaining);
        let hand_strength = (estimate_hand_strength(ctx.hole_cards, ctx.board_cards)
            + position_modifier)
            .clamp(0.0, 1.0);

        // Critically short: calling already means all-in.
        if ctx.to_call > 0 && ctx.chips <= ctx.to_call {
            return if hand_strength >= params.fold_threshold {
                Action::AllIn
            } else {
                Action::Fold
            };
        }

        let pot_odds = self.calculate_pot_odds(ctx.pot, ctx.to_call);

        if hand_strength < params.fold_threshold {
            if ctx.can_check() {
                return Action::Check;
            }
            if params.bluff_frequency > 0.0 && self.rng.random_bool(params.bluff_frequency as f64)
            {
                let bluff = (ctx.pot as f32 * self.config.bluff_size_multiplier) as Chips;
                return self.raise_to(ctx, ctx.table_bet + bluff);
            }
            return Action::Fold;
        }

        if hand_strength < params.raise_threshold {
            if ctx.can_check() {
                return Action::Check;
            }
            let pot_odds_bonus = if pot_odds > self.config.pot_odds_bonus_threshold {
                self.config.pot_odds_bonus_value
            } else {
                0.0
            };
            let call_probability = self.config.base_call_probability
                + (params.aggression_factor / self.config.call_aggression_divisor)
                + pot_odds_bonus;
            if self.rng.random_bool(call_probability.min(1.0) as f64) {
                return Action::Call;
            }
            return Action::Fold;
        }

        let raise_probability = self.config.base_raise_probability
            + (params.aggression_factor / self.config.raise_aggression_divisor);
        if self.rng.random_bool(raise_probability.min(1.0) as f64) {
            let size = self.calculate_raise_size(params, ctx.pot, ctx.to_call);
            self.raise_to(ctx, ctx.table_bet + size)
        } else if ctx.can_check() {
            // Slow-play
            Action::Check
        } else {
            Action::Call
        }
    }

    /// Clamp a raise target into the legal range.
    fn raise_to(&self, ctx: &BotDecisionContext, target: Chips) -> Action {
        let target = target.max(ctx.min_raise_to);
        if target >= ctx.max_raise_to() {
            Action::AllIn
        } else if ctx.table_bet == 0 {
            Action::Bet(target)
        } else {
            Action::Raise(target)
        }
    }

    fn calculate_raise_size(&mut self, params: &DifficultyParams, pot: Chips, to_call: Chips) -> Chips {
        let base_multiplier = match params.aggression_factor {
            x if x < 1.0 => self.config.passive_raise_multiplier,
            x if x < 2.0 => self.config.moderate_raise_multiplier,
            _ => self.config.aggressive_raise_multiplier,
        };
        let variance = self
            .rng
            .random_range(-self.config.raise_variance..=self.config.raise_variance);
        ((pot + to_call) as f32 * base_multiplier * (1.0 + variance)) as Chips
    }

    /// pot / (pot + call); 1.0 when calling is free.
    fn calculate_pot_odds(&self, pot: Chips, call_amount: Chips) -> f32 {
        if call_amount == 0 {
            return 1.0;
        }
        pot as f32 / (pot + call_amount) as f32
    }

    fn calculate_position_modifier(&self, position: Option<usize>, players_remaining: usize) -> f32 {
        // Heads-up, position matters less.
        if players_remaining <= 2 {
            return 0.0;
        }
        let pos = position.unwrap_or(players_remaining / 2);
        let relative_pos = pos as f32 / players_remaining as f32;

        match relative_pos {
            x if x < 0.2 => self.config.late_position_bonus,
            x if x < 0.4 => self.config.middle_position_bonus,
            x if x < 0.6 => 0.0,
            x if x < 0.8 => self.config.early_middle_position_penalty,
            _ => self.config.utg_position_penalty,
        }
    }
}

/// Rough strength in `[0, 1]` from the made hand and its top card.
pub fn estimate_hand_strength(hole_cards: &[Card], board_cards: &[Card]) -> f32 {
    let mut all_cards = Vec::with_capacity(hole_cards.len() + board_cards.len());
    all_cards.extend_from_slice(hole_cards);
    all_cards.extend_from_slice(board_cards);
    if all_cards.len() < 2 {
        return 0.0;
    }

    let hand = eval(&all_cards);
    let base_strength = match hand.rank {
        Rank::HighCard => STRENGTH_HIGH_CARD,
        Rank::OnePair => STRENGTH_ONE_PAIR,
        Rank::TwoPair => STRENGTH_TWO_PAIR,
        Rank::ThreeOfAKind => STRENGTH_THREE_OF_A_KIND,
        Rank::Straight => STRENGTH_STRAIGHT,
        Rank::Flush => STRENGTH_FLUSH,
        Rank::FullHouse => STRENGTH_FULL_HOUSE,
        Rank::FourOfAKind => STRENGTH_FOUR_OF_A_KIND,
        Rank::StraightFlush => STRENGTH_STRAIGHT_FLUSH,
    };
    let top = hand.values.iter().copied().max().unwrap_or(0);
    let kicker_bonus = (top as f32 / ACE as f32) * 0.1;
    (base_strength + kicker_bonus).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::models::BotDifficulty;
    use crate::game::entities::Suit;

    fn ctx<'a>(hole_cards: &'a [Card], board_cards: &'a [Card]) -> BotDecisionContext<'a> {
        BotDecisionContext {
            hole_cards,
            board_cards,
            pot: 100,
            to_call: 20,
            table_bet: 40,
            min_raise_to: 60,
            street_bet: 20,
            chips: 1000,
            position: Some(0),
            players_remaining: 6,
        }
    }

    fn params(difficulty: BotDifficulty) -> DifficultyParams {
        DifficultyParams::from_difficulty(difficulty)
    }

    #[test]
    fn test_tag_bot_folds_weak_hands() {
        let mut decision_maker = BotDecisionMaker::new(7);
        let hole_cards = [Card(7, Suit::Club), Card(2, Suit::Diamond)];

        let mut fold_count = 0;
        let trials = 500;
        for _ in 0..trials {
            let ctx = BotDecisionContext {
                position: Some(5),
                ..ctx(&hole_cards, &[])
            };
            let action = decision_maker.decide_action(&params(BotDifficulty::Tag), &ctx);
            if action == Action::Fold {
                fold_count += 1;
            }
        }

        // Only the 25% bluffs escape the fold.
        assert!(
            fold_count > 300,
            "TAG bot folded {fold_count} times out of {trials}"
        );
    }

    #[test]
    fn test_tag_bot_is_aggressive() {
        let mut decision_maker = BotDecisionMaker::new(3);
        let hole_cards = [Card(13, Suit::Spade), Card(13, Suit::Heart)];

        let mut raise_count = 0;
        for _ in 0..100 {
            let action =
                decision_maker.decide_action(&params(BotDifficulty::Tag), &ctx(&hole_cards, &[]));
            if matches!(action, Action::Raise(_) | Action::AllIn) {
                raise_count += 1;
            }
        }
        // Raise probability is capped at 1.0 for TAG.
        assert_eq!(raise_count, 100);
    }

    #[test]
    fn test_weak_hand_checks_when_free() {
        let mut decision_maker = BotDecisionMaker::new(5);
        let hole_cards = [Card(7, Suit::Club), Card(2, Suit::Diamond)];
        let free = BotDecisionContext {
            to_call: 0,
            table_bet: 0,
            street_bet: 0,
            min_raise_to: 20,
            position: Some(5),
            ..ctx(&hole_cards, &[])
        };
        for difficulty in [BotDifficulty::Easy, BotDifficulty::Standard, BotDifficulty::Tag] {
            for _ in 0..50 {
                assert_eq!(
                    decision_maker.decide_action(&params(difficulty), &free),
                    Action::Check
                );
            }
        }
    }

    #[test]
    fn test_raises_are_always_legal() {
        let mut decision_maker = BotDecisionMaker::new(42);
        let hole_cards = [Card(14, Suit::Spade), Card(14, Suit::Heart)];
        let context = ctx(&hole_cards, &[]);
        for difficulty in [BotDifficulty::Easy, BotDifficulty::Standard, BotDifficulty::Tag] {
            for _ in 0..200 {
                match decision_maker.decide_action(&params(difficulty), &context) {
                    Action::Raise(to) | Action::Bet(to) => {
                        assert!(to >= context.min_raise_to);
                        assert!(to < context.street_bet + context.chips);
                    }
                    Action::AllIn | Action::Call | Action::Check => {}
                    Action::Fold => panic!("folded aces"),
                }
            }
        }
    }

    #[test]
    fn test_opening_bet_uses_bet() {
        let mut decision_maker = BotDecisionMaker::new(9);
        let hole_cards = [Card(14, Suit::Spade), Card(14, Suit::Heart)];
        let board = [Card(14, Suit::Club), Card(9, Suit::Diamond), Card(4, Suit::Heart)];
        let open = BotDecisionContext {
            to_call: 0,
            table_bet: 0,
            street_bet: 0,
            min_raise_to: 20,
            ..ctx(&hole_cards, &board)
        };
        let action = decision_maker.decide_action(&params(BotDifficulty::Tag), &open);
        assert!(matches!(action, Action::Bet(to) if to >= 20), "{action:?}");
    }

    #[test]
    fn test_short_stack_shoves_or_folds() {
        let mut decision_maker = BotDecisionMaker::new(1);
        let hole_cards = [Card(12, Suit::Spade), Card(12, Suit::Heart)];
        let short = BotDecisionContext {
            chips: 15,
            ..ctx(&hole_cards, &[])
        };
        assert_eq!(
            decision_maker.decide_action(&params(BotDifficulty::Standard), &short),
            Action::AllIn
        );
    }

    #[test]
    fn test_pot_odds_calculation() {
        let decision_maker = BotDecisionMaker::new(0);

        let good = decision_maker.calculate_pot_odds(100, 20);
        assert!((good - 0.833).abs() < 0.01);
        let medium = decision_maker.calculate_pot_odds(100, 50);
        assert!((medium - 0.667).abs() < 0.01);
        let bad = decision_maker.calculate_pot_odds(50, 100);
        assert!((bad - 0.333).abs() < 0.01);
        assert_eq!(decision_maker.calculate_pot_odds(100, 0), 1.0);
    }

    #[test]
    fn test_hand_strength_ordering() {
        let trips = estimate_hand_strength(
            &[Card(9, Suit::Spade), Card(9, Suit::Heart)],
            &[Card(9, Suit::Club), Card(4, Suit::Diamond), Card(2, Suit::Heart)],
        );
        let pair = estimate_hand_strength(&[Card(9, Suit::Spade), Card(9, Suit::Heart)], &[]);
        let junk = estimate_hand_strength(&[Card(7, Suit::Club), Card(2, Suit::Diamond)], &[]);
        assert!(trips > pair && pair > junk);
        assert_eq!(estimate_hand_strength(&[Card(7, Suit::Club)], &[]), 0.0);
    }
}
