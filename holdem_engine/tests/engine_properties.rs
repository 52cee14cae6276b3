//! Property-based tests for hand ranking, pot construction and chip
//! conservation over random play.

use holdem_engine::game::{
    Action, Card, Chips, Contribution, Deck, GameEngine, GameError, GameSettings, HandProgress,
    PlayerId, RakePolicy, StandardEvaluator, Suit,
    eval::eval,
    pot::{calculate_pots, settle},
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn card_strategy() -> impl Strategy<Value = Card> {
    (2u8..=14, 0usize..4).prop_map(|(value, suit)| Card(value, Suit::ALL[suit]))
}

fn unique_cards(count: usize) -> impl Strategy<Value = Vec<Card>> {
    prop::collection::vec(card_strategy(), count).prop_filter("cards must be unique", |cards| {
        cards.iter().collect::<BTreeSet<_>>().len() == cards.len()
    })
}

fn contributions_strategy() -> impl Strategy<Value = Vec<Contribution>> {
    prop::collection::vec((0u64..500, any::<bool>()), 2..=7)
        .prop_map(|seats| {
            seats
                .into_iter()
                .enumerate()
                .map(|(idx, (amount, folded))| Contribution {
                    player_id: idx as PlayerId + 1,
                    amount,
                    folded,
                })
                .collect::<Vec<_>>()
        })
        .prop_filter("at least one live contributor", |contributions| {
            contributions.iter().any(|c| !c.folded && c.amount > 0)
        })
}

#[test]
fn test_three_way_side_pot() {
    let contributions = [
        Contribution { player_id: 1, amount: 50, folded: false },
        Contribution { player_id: 2, amount: 100, folded: false },
        Contribution { player_id: 3, amount: 100, folded: false },
    ];
    let pots = calculate_pots(&contributions);
    assert_eq!(pots.len(), 2);
    assert_eq!(pots[0].amount, 150);
    assert_eq!(pots[0].eligible, vec![1, 2, 3]);
    assert_eq!(pots[1].amount, 100);
    assert_eq!(pots[1].eligible, vec![2, 3]);
}

#[test]
fn test_folded_chips_feed_pots_they_cannot_win() {
    let contributions = [
        Contribution { player_id: 1, amount: 200, folded: true },
        Contribution { player_id: 2, amount: 80, folded: false },
        Contribution { player_id: 3, amount: 150, folded: false },
    ];
    let pots = calculate_pots(&contributions);
    assert_eq!(pots.iter().map(|pot| pot.amount).sum::<Chips>(), 430);
    assert!(pots.iter().all(|pot| !pot.eligible.contains(&1)));
    assert_eq!(pots.last().unwrap().eligible, vec![3]);
}

proptest! {
    #[test]
    fn test_best_of_seven_beats_every_five(cards in unique_cards(7)) {
        let best = eval(&cards);
        for skip_a in 0..7 {
            for skip_b in (skip_a + 1)..7 {
                let five: Vec<Card> = cards
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| *idx != skip_a && *idx != skip_b)
                    .map(|(_, card)| *card)
                    .collect();
                prop_assert!(best >= eval(&five));
            }
        }
    }

    #[test]
    fn test_eval_ignores_card_order(cards in unique_cards(7)) {
        let mut reversed = cards.clone();
        reversed.reverse();
        prop_assert_eq!(eval(&cards), eval(&reversed));
    }

    #[test]
    fn test_pots_hold_every_contributed_chip(contributions in contributions_strategy()) {
        let pots = calculate_pots(&contributions);
        let total: Chips = contributions.iter().map(|c| c.amount).sum();
        prop_assert_eq!(pots.iter().map(|pot| pot.amount).sum::<Chips>(), total);

        // Later pots are contested by a subset of the earlier ones.
        for pair in pots.windows(2) {
            prop_assert!(pair[0].level < pair[1].level);
            prop_assert!(pair[1].eligible.iter().all(|id| pair[0].eligible.contains(id)));
        }
        for pot in &pots {
            prop_assert!(!pot.eligible.is_empty());
        }
    }

    #[test]
    fn test_settlement_pays_out_every_pot(
        contributions in contributions_strategy(),
        seed in any::<u64>(),
        bps in 0u32..1_000,
        cap in prop::option::of(1u64..100),
    ) {
        let pots = calculate_pots(&contributions);
        let mut deck = Deck::shuffled(seed);
        let results: Vec<_> = contributions
            .iter()
            .filter(|c| !c.folded)
            .map(|c| {
                let cards: Vec<Card> = (0..7).filter_map(|_| deck.deal_card()).collect();
                (c.player_id, eval(&cards))
            })
            .collect();

        let rake = RakePolicy { bps, cap };
        let settlement = settle(&pots, &results, &rake, &StandardEvaluator).unwrap();
        let total: Chips = pots.iter().map(|pot| pot.amount).sum();
        prop_assert_eq!(settlement.total_paid() + settlement.rake_total, total);
        for award in &settlement.awards {
            let shares: Chips = award.winners.iter().map(|w| w.amount).sum();
            prop_assert_eq!(shares + award.rake + award.odd_chips, award.amount);
        }
    }

    #[test]
    fn test_random_play_conserves_chips(
        stacks in prop::collection::vec(50u64..2_000, 2..=6),
        seed in any::<u64>(),
        choices in prop::collection::vec((0u8..6, 0u64..400), 1..200),
        bps in 0u32..1_000,
        cap in prop::option::of(1u64..200),
    ) {
        let settings = GameSettings::new(5, 10, 6).with_rake(RakePolicy { bps, cap });
        let mut engine = GameEngine::new(settings, seed);
        for (idx, chips) in stacks.iter().enumerate() {
            engine
                .seat_player(idx as PlayerId + 1, format!("p{idx}"), *chips, false)
                .unwrap();
        }
        let total: Chips = stacks.iter().sum();
        let mut choices = choices.into_iter();

        for _ in 0..20 {
            let mut progress = match engine.start_hand() {
                Ok(progress) => progress,
                Err(GameError::NotEnoughPlayers) => break,
                Err(err) => return Err(TestCaseError::fail(err.to_string())),
            };
            while let HandProgress::NextTurn { player_id, .. } = progress {
                prop_assert!(engine.verify_invariants().is_ok());
                prop_assert_eq!(engine.chips_on_table() + engine.house_rake(), total);

                let (choice, extra) = choices.next().unwrap_or((1, 0));
                let action = match choice {
                    0 => Action::Fold,
                    1 if engine.can_check(player_id) => Action::Check,
                    1 | 2 => Action::Call,
                    3 => Action::Raise(engine.min_raise_to().unwrap_or_default() + extra),
                    4 => Action::AllIn,
                    _ => Action::Bet(extra),
                };
                progress = match engine.apply_action(player_id, action) {
                    Ok(next) => next,
                    Err(err) => {
                        prop_assert!(!err.is_fatal(), "fatal error: {}", err);
                        engine
                            .apply_passive_action(player_id)
                            .map_err(|err| TestCaseError::fail(err.to_string()))?
                    }
                };
            }
            prop_assert!(!engine.hand_in_progress());
            prop_assert_eq!(engine.chips_on_table() + engine.house_rake(), total);
        }
    }
}
