//! Hand ranking.
//!
//! The engine only depends on the [`HandEvaluator`] contract: a total order
//! over hands plus a human-readable description, with identical hands
//! comparing equal so they split a pot. [`StandardEvaluator`] is the default
//! implementation.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

use super::entities::{ACE, Card, PlayerId, Suit, Value, value_name};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Rank::HighCard => "High Card",
            Rank::OnePair => "One Pair",
            Rank::TwoPair => "Two Pair",
            Rank::ThreeOfAKind => "Three of a Kind",
            Rank::Straight => "Straight",
            Rank::Flush => "Flush",
            Rank::FullHouse => "Full House",
            Rank::FourOfAKind => "Four of a Kind",
            Rank::StraightFlush => "Straight Flush",
        };
        write!(f, "{repr}")
    }
}

/// A ranked hand: category plus tiebreak values, most significant first.
///
/// Ordering is by category, then lexicographically by `values`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandRank {
    pub rank: Rank,
    pub values: Vec<Value>,
}

impl HandRank {
    pub fn description(&self) -> String {
        let name = |idx: usize| self.values.get(idx).copied().map(value_name).unwrap_or("?");
        let plural = |idx: usize| match name(idx) {
            "Six" => "Sixes".to_string(),
            other => format!("{other}s"),
        };
        match self.rank {
            Rank::HighCard => format!("High Card, {}", name(0)),
            Rank::OnePair => format!("Pair of {}", plural(0)),
            Rank::TwoPair => format!("Two Pair, {} and {}", plural(0), plural(1)),
            Rank::ThreeOfAKind => format!("Three of a Kind, {}", plural(0)),
            Rank::Straight => format!("Straight, {} high", name(0)),
            Rank::Flush => format!("Flush, {} high", name(0)),
            Rank::FullHouse => format!("Full House, {} over {}", plural(0), plural(1)),
            Rank::FourOfAKind => format!("Four of a Kind, {}", plural(0)),
            Rank::StraightFlush if self.values.first() == Some(&ACE) => "Royal Flush".to_string(),
            Rank::StraightFlush => format!("Straight Flush, {} high", name(0)),
        }
    }
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Hand ranking capability consumed by settlement and bots.
pub trait HandEvaluator: Send + Sync {
    /// Rank the best hand available from `cards` (hole plus community).
    fn rank(&self, cards: &[Card]) -> HandRank;

    /// Players holding a maximal hand. Several on a tie, empty only when
    /// `hands` is empty.
    fn best_of(&self, hands: &[(PlayerId, HandRank)]) -> Vec<PlayerId> {
        argmax(hands)
    }
}

/// All keys whose rank equals the maximum, in input order.
pub fn argmax<K: Copy>(hands: &[(K, HandRank)]) -> Vec<K> {
    let mut best: Vec<K> = Vec::new();
    let mut best_rank: Option<&HandRank> = None;
    for (key, rank) in hands {
        match best_rank.map(|current| rank.cmp(current)) {
            None | Some(Ordering::Greater) => {
                best.clear();
                best.push(*key);
                best_rank = Some(rank);
            }
            Some(Ordering::Equal) => best.push(*key),
            Some(Ordering::Less) => {}
        }
    }
    best
}

/// Direct evaluator over 2 to 7 cards.
///
/// With fewer than five cards only pair-based categories and high cards are
/// possible; bots use that for pre-flop strength estimates.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardEvaluator;

impl HandEvaluator for StandardEvaluator {
    fn rank(&self, cards: &[Card]) -> HandRank {
        eval(cards)
    }
}

/// Highest card of a five-long run in `values` (descending, deduplicated),
/// treating the ace as low for the wheel.
fn straight_high(values: &[Value]) -> Option<Value> {
    let mut run: Vec<Value> = values.to_vec();
    if run.first() == Some(&ACE) {
        run.push(1);
    }
    run.windows(5)
        .find(|window| window[0] - window[4] == 4)
        .map(|window| window[0])
}

pub fn eval(cards: &[Card]) -> HandRank {
    let mut counts = [0u8; (ACE + 1) as usize];
    for card in cards {
        counts[card.value() as usize] += 1;
    }

    // Distinct values, high to low.
    let distinct: Vec<Value> = (2..=ACE).rev().filter(|v| counts[*v as usize] > 0).collect();

    // Straight flush and flush.
    for suit in Suit::ALL {
        let mut suited: Vec<Value> = cards
            .iter()
            .filter(|card| card.suit() == suit)
            .map(Card::value)
            .collect();
        if suited.len() < 5 {
            continue;
        }
        suited.sort_unstable_by(|a, b| b.cmp(a));
        if let Some(high) = straight_high(&suited) {
            return HandRank {
                rank: Rank::StraightFlush,
                values: vec![high],
            };
        }
        let flush = HandRank {
            rank: Rank::Flush,
            values: suited.into_iter().take(5).collect(),
        };
        // Quads and full houses outrank a flush.
        if let Some(better) = made_hand(&counts, &distinct).filter(|h| h.rank > Rank::Flush) {
            return better;
        }
        return flush;
    }

    if let Some(better) = made_hand(&counts, &distinct).filter(|h| h.rank > Rank::Straight) {
        return better;
    }
    if let Some(high) = straight_high(&distinct) {
        return HandRank {
            rank: Rank::Straight,
            values: vec![high],
        };
    }
    made_hand(&counts, &distinct).unwrap_or_else(|| HandRank {
        rank: Rank::HighCard,
        values: distinct.iter().copied().take(5).collect(),
    })
}

/// Pair-based categories (and high card) from value counts.
fn made_hand(counts: &[u8], distinct: &[Value]) -> Option<HandRank> {
    let with_count = |n: u8| -> Vec<Value> {
        distinct
            .iter()
            .copied()
            .filter(|v| counts[*v as usize] >= n)
            .collect()
    };
    let kickers = |exclude: &[Value], n: usize| -> Vec<Value> {
        distinct
            .iter()
            .copied()
            .filter(|v| !exclude.contains(v))
            .take(n)
            .collect()
    };

    let quads = with_count(4);
    let trips = with_count(3);
    let pairs = with_count(2);

    if let Some(&quad) = quads.first() {
        let mut values = vec![quad];
        values.extend(kickers(&[quad], 1));
        return Some(HandRank {
            rank: Rank::FourOfAKind,
            values,
        });
    }
    if let Some(&trip) = trips.first() {
        if let Some(&pair) = pairs.iter().find(|v| **v != trip) {
            return Some(HandRank {
                rank: Rank::FullHouse,
                values: vec![trip, pair],
            });
        }
        let mut values = vec![trip];
        values.extend(kickers(&[trip], 2));
        return Some(HandRank {
            rank: Rank::ThreeOfAKind,
            values,
        });
    }
    match pairs.as_slice() {
        [high, low, ..] => {
            let mut values = vec![*high, *low];
            values.extend(kickers(&[*high, *low], 1));
            Some(HandRank {
                rank: Rank::TwoPair,
                values,
            })
        }
        [pair] => {
            let mut values = vec![*pair];
            values.extend(kickers(&[*pair], 3));
            Some(HandRank {
                rank: Rank::OnePair,
                values,
            })
        }
        [] => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Suit::*;

    fn c(value: Value, suit: Suit) -> Card {
        Card(value, suit)
    }

    #[test]
    fn test_royal_flush() {
        let hand = eval(&[
            c(14, Spade),
            c(13, Spade),
            c(12, Spade),
            c(11, Spade),
            c(10, Spade),
            c(2, Heart),
            c(3, Club),
        ]);
        assert_eq!(hand.rank, Rank::StraightFlush);
        assert_eq!(hand.description(), "Royal Flush");
    }

    #[test]
    fn test_wheel_straight() {
        let hand = eval(&[
            c(14, Spade),
            c(2, Heart),
            c(3, Club),
            c(4, Diamond),
            c(5, Spade),
            c(9, Heart),
            c(13, Club),
        ]);
        assert_eq!(hand.rank, Rank::Straight);
        assert_eq!(hand.values, vec![5]);
    }

    #[test]
    fn test_flush_beats_straight() {
        let hand = eval(&[
            c(9, Heart),
            c(10, Spade),
            c(11, Heart),
            c(12, Club),
            c(13, Heart),
            c(2, Heart),
            c(4, Heart),
        ]);
        assert_eq!(hand.rank, Rank::Flush);
        assert_eq!(hand.values, vec![13, 11, 9, 4, 2]);
    }

    #[test]
    fn test_full_house_from_trips_and_pair() {
        let hand = eval(&[
            c(9, Heart),
            c(9, Spade),
            c(9, Club),
            c(4, Heart),
            c(4, Spade),
            c(2, Heart),
            c(7, Heart),
        ]);
        assert_eq!(hand.rank, Rank::FullHouse);
        assert_eq!(hand.values, vec![9, 4]);
        assert_eq!(hand.description(), "Full House, Nines over Fours");
    }

    #[test]
    fn test_two_trips_make_full_house() {
        let hand = eval(&[
            c(8, Heart),
            c(8, Spade),
            c(8, Club),
            c(6, Heart),
            c(6, Spade),
            c(6, Club),
            c(2, Diamond),
        ]);
        assert_eq!(hand.rank, Rank::FullHouse);
        assert_eq!(hand.values, vec![8, 6]);
    }

    #[test]
    fn test_three_pairs_use_best_two_and_best_kicker() {
        let hand = eval(&[
            c(10, Heart),
            c(10, Spade),
            c(7, Club),
            c(7, Heart),
            c(3, Spade),
            c(3, Club),
            c(2, Diamond),
        ]);
        assert_eq!(hand.rank, Rank::TwoPair);
        assert_eq!(hand.values, vec![10, 7, 3]);
    }

    #[test]
    fn test_kicker_decides() {
        let board = [c(13, Heart), c(13, Spade), c(8, Club), c(5, Diamond), c(2, Heart)];
        let mut a = board.to_vec();
        a.extend([c(14, Club), c(3, Club)]);
        let mut b = board.to_vec();
        b.extend([c(12, Club), c(3, Diamond)]);
        assert!(eval(&a) > eval(&b));
    }

    #[test]
    fn test_board_plays_ties() {
        let board = [c(14, Heart), c(13, Spade), c(12, Club), c(11, Diamond), c(10, Heart)];
        let mut a = board.to_vec();
        a.extend([c(2, Club), c(3, Club)]);
        let mut b = board.to_vec();
        b.extend([c(4, Diamond), c(5, Diamond)]);
        assert_eq!(eval(&a), eval(&b));
        let ranked = vec![(1, eval(&a)), (2, eval(&b))];
        assert_eq!(StandardEvaluator.best_of(&ranked), vec![1, 2]);
    }

    #[test]
    fn test_two_cards() {
        assert_eq!(eval(&[c(14, Spade), c(14, Heart)]).rank, Rank::OnePair);
        let high = eval(&[c(7, Club), c(2, Diamond)]);
        assert_eq!(high.rank, Rank::HighCard);
        assert_eq!(high.values, vec![7, 2]);
    }

    #[test]
    fn test_argmax_single_winner() {
        let hands = vec![
            (1, eval(&[c(2, Club), c(2, Diamond)])),
            (2, eval(&[c(9, Club), c(9, Diamond)])),
            (3, eval(&[c(14, Club), c(13, Diamond)])),
        ];
        assert_eq!(argmax(&hands), vec![2]);
    }
}
