//! Pot partitioning and settlement.
//!
//! Pots are derived from per-seat contributions at showdown time, never
//! stored. Settlement takes the rake from each pot, splits the rest among the
//! best eligible hands and sends floor-division leftovers to the rake bucket,
//! so every chip in a pot is accounted for exactly once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    entities::{Chips, PlayerId},
    errors::{GameError, GameResult},
    eval::{HandEvaluator, HandRank},
};

/// Basis points in one whole.
pub const RAKE_DENOMINATOR: u64 = 10_000;

/// One seat's chips in the pot for the current hand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Contribution {
    pub player_id: PlayerId,
    pub amount: Chips,
    pub folded: bool,
}

/// A main or side pot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pot {
    pub amount: Chips,
    /// Contribution level that caps this pot.
    pub level: Chips,
    /// Live seats that contributed at least `level`.
    pub eligible: Vec<PlayerId>,
    /// Seats, folded or not, that put chips into this slice.
    pub contributors: usize,
}

/// Partition contributions into a main pot and side pots.
///
/// Levels come from the distinct contributions of live seats, ascending. Each
/// slice collects every seat's chips between the previous level and this one,
/// including folded seats, which feed pots but never win them. Folded chips
/// above the top live level go into the last pot.
pub fn calculate_pots(contributions: &[Contribution]) -> Vec<Pot> {
    let mut levels: Vec<Chips> = contributions
        .iter()
        .filter(|c| !c.folded && c.amount > 0)
        .map(|c| c.amount)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let total: Chips = contributions.iter().map(|c| c.amount).sum();
    if levels.is_empty() {
        // Nobody live put anything in; settlement rejects the ownerless pot.
        return if total > 0 {
            vec![Pot {
                amount: total,
                level: 0,
                eligible: Vec::new(),
                contributors: contributions.iter().filter(|c| c.amount > 0).count(),
            }]
        } else {
            Vec::new()
        };
    }

    let top = levels.last().copied().unwrap_or_default();
    let mut pots = Vec::with_capacity(levels.len());
    let mut previous = 0;
    for level in levels {
        let mut amount: Chips = contributions
            .iter()
            .map(|c| c.amount.clamp(previous, level) - previous)
            .sum();
        let mut contributors = contributions.iter().filter(|c| c.amount > previous).count();
        if level == top {
            amount += contributions
                .iter()
                .filter(|c| c.folded)
                .map(|c| c.amount.saturating_sub(top))
                .sum::<Chips>();
            contributors = contributors.max(1);
        }
        let eligible = contributions
            .iter()
            .filter(|c| !c.folded && c.amount >= level)
            .map(|c| c.player_id)
            .collect();
        pots.push(Pot {
            amount,
            level,
            eligible,
            contributors,
        });
        previous = level;
    }
    pots
}

/// House cut of each pot.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RakePolicy {
    /// Rake fraction in basis points (1000 = 10%).
    pub bps: u32,
    /// Upper bound on rake taken from one hand, odd chips excluded.
    pub cap: Option<Chips>,
}

impl RakePolicy {
    pub const fn none() -> Self {
        Self { bps: 0, cap: None }
    }

    /// `floor(amount * fraction)`
    pub fn rake_for(&self, amount: Chips) -> Chips {
        amount.saturating_mul(self.bps as Chips) / RAKE_DENOMINATOR
    }
}

/// What one winner took from one pot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WinnerShare {
    pub player_id: PlayerId,
    pub amount: Chips,
    /// Part of the pot's rake attributed to this winner.
    pub rake: Chips,
}

/// Resolution of a single pot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PotAward {
    pub pot_index: usize,
    pub amount: Chips,
    /// Percentage rake taken from the pot.
    pub rake: Chips,
    /// Floor-division leftover, added to the rake bucket.
    pub odd_chips: Chips,
    pub winners: Vec<WinnerShare>,
}

/// Settlement of every pot in a hand.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Settlement {
    pub awards: Vec<PotAward>,
    /// Rake plus odd chips across all pots.
    pub rake_total: Chips,
    /// Winnings per player across all pots.
    pub payouts: BTreeMap<PlayerId, Chips>,
    /// Rake attributed per player across all pots.
    pub rake_by_player: BTreeMap<PlayerId, Chips>,
}

impl Settlement {
    pub fn total_paid(&self) -> Chips {
        self.payouts.values().sum()
    }
}

/// Settle pots in formation order, main pot first. `evaluator` picks the
/// winners of each pot among its eligible hands.
///
/// `results` holds a rank for every live seat. A pot whose eligible set has
/// no ranked hand is a consistency error; so is any mismatch between chips
/// in and chips out.
pub fn settle<E: HandEvaluator + ?Sized>(
    pots: &[Pot],
    results: &[(PlayerId, HandRank)],
    rake: &RakePolicy,
    evaluator: &E,
) -> GameResult<Settlement> {
    let mut settlement = Settlement::default();
    let mut rake_budget = rake.cap;

    for (pot_index, pot) in pots.iter().enumerate() {
        let contenders: Vec<(PlayerId, HandRank)> = results
            .iter()
            .filter(|(player_id, _)| pot.eligible.contains(player_id))
            .cloned()
            .collect();
        let winners = evaluator.best_of(&contenders);
        if winners.is_empty() {
            return Err(GameError::SettlementConsistency(format!(
                "pot {} of {} chips has no eligible winner",
                pot_index, pot.amount
            )));
        }

        // An uncalled slice is returned, not raked.
        let mut pot_rake = if pot.contributors > 1 {
            rake.rake_for(pot.amount)
        } else {
            0
        };
        if let Some(budget) = rake_budget.as_mut() {
            pot_rake = pot_rake.min(*budget);
            *budget -= pot_rake;
        }

        let distributable = pot.amount - pot_rake;
        let count = winners.len() as Chips;
        let share = distributable / count;
        let odd_chips = distributable % count;
        let house_take = pot_rake + odd_chips;

        let rake_share = house_take / count;
        let rake_leftover = house_take % count;
        let mut shares = Vec::with_capacity(winners.len());
        for (idx, player_id) in winners.into_iter().enumerate() {
            let attributed = rake_share + if idx == 0 { rake_leftover } else { 0 };
            *settlement.payouts.entry(player_id).or_default() += share;
            *settlement.rake_by_player.entry(player_id).or_default() += attributed;
            shares.push(WinnerShare {
                player_id,
                amount: share,
                rake: attributed,
            });
        }

        settlement.rake_total += house_take;
        settlement.awards.push(PotAward {
            pot_index,
            amount: pot.amount,
            rake: pot_rake,
            odd_chips,
            winners: shares,
        });
    }

    let pot_total: Chips = pots.iter().map(|pot| pot.amount).sum();
    if settlement.total_paid() + settlement.rake_total != pot_total {
        return Err(GameError::SettlementConsistency(format!(
            "paid {} plus rake {} does not equal pot {}",
            settlement.total_paid(),
            settlement.rake_total,
            pot_total
        )));
    }
    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::eval::{Rank, StandardEvaluator};

    fn live(player_id: PlayerId, amount: Chips) -> Contribution {
        Contribution {
            player_id,
            amount,
            folded: false,
        }
    }

    fn folded(player_id: PlayerId, amount: Chips) -> Contribution {
        Contribution {
            player_id,
            amount,
            folded: true,
        }
    }

    fn rank(rank: Rank, values: &[u8]) -> HandRank {
        HandRank {
            rank,
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_main_and_side_pot() {
        let pots = calculate_pots(&[live(1, 100), live(2, 100), live(3, 300)]);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 300);
        assert_eq!(pots[0].eligible, vec![1, 2, 3]);
        assert_eq!(pots[1].amount, 200);
        assert_eq!(pots[1].eligible, vec![3]);
        assert_eq!(pots.iter().map(|p| p.amount).sum::<Chips>(), 500);
    }

    #[test]
    fn test_three_distinct_all_ins() {
        let pots = calculate_pots(&[live(1, 25), live(2, 75), live(3, 150), live(4, 150)]);
        let amounts: Vec<Chips> = pots.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![100, 150, 150]);
        assert_eq!(pots[2].eligible, vec![3, 4]);
    }

    #[test]
    fn test_folded_chips_feed_pots_without_eligibility() {
        let pots = calculate_pots(&[folded(1, 50), live(2, 100), live(3, 100)]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 250);
        assert_eq!(pots[0].eligible, vec![2, 3]);
    }

    #[test]
    fn test_folded_excess_above_top_level_goes_to_last_pot() {
        // Seat 1 bet 200, seat 2 called all-in for 120, then seat 1 left the table.
        let pots = calculate_pots(&[folded(1, 200), live(2, 120)]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 320);
        assert_eq!(pots[0].eligible, vec![2]);
    }

    #[test]
    fn test_pot_levels_strictly_increase() {
        let pots = calculate_pots(&[live(1, 40), live(2, 40), live(3, 90), folded(4, 60)]);
        assert!(pots.windows(2).all(|w| w[0].level < w[1].level));
    }

    #[test]
    fn test_split_pot_odd_chip_goes_to_rake() {
        let pots = vec![Pot {
            amount: 101,
            level: 50,
            eligible: vec![1, 2],
            contributors: 2,
        }];
        let results = vec![
            (1, rank(Rank::Straight, &[9])),
            (2, rank(Rank::Straight, &[9])),
        ];
        let rake = RakePolicy { bps: 1000, cap: None };
        let settlement = settle(&pots, &results, &rake, &StandardEvaluator).unwrap();
        let award = &settlement.awards[0];
        assert_eq!(award.rake, 10);
        assert_eq!(award.odd_chips, 1);
        assert_eq!(settlement.payouts[&1], 45);
        assert_eq!(settlement.payouts[&2], 45);
        assert_eq!(settlement.rake_total, 11);
        assert_eq!(settlement.total_paid() + settlement.rake_total, 101);
        assert_eq!(settlement.rake_by_player.values().sum::<Chips>(), 11);
    }

    #[test]
    fn test_side_pot_goes_to_best_eligible_hand() {
        let pots = calculate_pots(&[live(1, 100), live(2, 100), live(3, 300)]);
        // Seat 1 has the best hand but is only eligible for the main pot.
        let results = vec![
            (1, rank(Rank::Flush, &[14, 9, 7, 4, 2])),
            (2, rank(Rank::OnePair, &[8, 14, 9, 7])),
            (3, rank(Rank::TwoPair, &[9, 7, 14])),
        ];
        let settlement = settle(&pots, &results, &RakePolicy::none(), &StandardEvaluator).unwrap();
        assert_eq!(settlement.payouts[&1], 300);
        assert_eq!(settlement.payouts[&3], 200);
        assert!(!settlement.payouts.contains_key(&2));
    }

    #[test]
    fn test_uncalled_slice_is_not_raked() {
        let pots = calculate_pots(&[live(1, 100), live(2, 300)]);
        let results = vec![
            (1, rank(Rank::HighCard, &[14])),
            (2, rank(Rank::HighCard, &[13])),
        ];
        let rake = RakePolicy { bps: 500, cap: None };
        let settlement = settle(&pots, &results, &rake, &StandardEvaluator).unwrap();
        assert_eq!(settlement.awards[0].rake, 10);
        assert_eq!(settlement.awards[1].rake, 0);
        assert_eq!(settlement.payouts[&1], 190);
        assert_eq!(settlement.payouts[&2], 200);
    }

    #[test]
    fn test_rake_cap_limits_hand_rake() {
        let pots = vec![Pot {
            amount: 1000,
            level: 500,
            eligible: vec![1, 2],
            contributors: 2,
        }];
        let results = vec![(1, rank(Rank::Flush, &[14])), (2, rank(Rank::HighCard, &[14]))];
        let rake = RakePolicy {
            bps: 1000,
            cap: Some(30),
        };
        let settlement = settle(&pots, &results, &rake, &StandardEvaluator).unwrap();
        assert_eq!(settlement.rake_total, 30);
        assert_eq!(settlement.payouts[&1], 970);
    }

    /// Pays every tied or beaten hand in a pot the same share.
    struct SplitEveryPot;

    impl HandEvaluator for SplitEveryPot {
        fn rank(&self, cards: &[crate::game::Card]) -> HandRank {
            StandardEvaluator.rank(cards)
        }

        fn best_of(&self, hands: &[(PlayerId, HandRank)]) -> Vec<PlayerId> {
            hands.iter().map(|(player_id, _)| *player_id).collect()
        }
    }

    #[test]
    fn test_settlement_uses_evaluator_winners() {
        let pots = calculate_pots(&[live(1, 100), live(2, 100)]);
        let results = vec![
            (1, rank(Rank::Flush, &[14, 9, 7, 4, 2])),
            (2, rank(Rank::HighCard, &[13])),
        ];
        let standard = settle(&pots, &results, &RakePolicy::none(), &StandardEvaluator).unwrap();
        assert_eq!(standard.payouts[&1], 200);
        assert!(!standard.payouts.contains_key(&2));

        let split = settle(&pots, &results, &RakePolicy::none(), &SplitEveryPot).unwrap();
        assert_eq!(split.payouts[&1], 100);
        assert_eq!(split.payouts[&2], 100);
    }

    #[test]
    fn test_pot_without_eligible_winner_is_fatal() {
        let pots = vec![Pot {
            amount: 80,
            level: 40,
            eligible: vec![9],
            contributors: 2,
        }];
        let results = vec![(1, rank(Rank::HighCard, &[14]))];
        let err = settle(&pots, &results, &RakePolicy::none(), &StandardEvaluator).unwrap_err();
        assert!(matches!(err, GameError::SettlementConsistency(_)));
    }
}
