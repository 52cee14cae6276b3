//! Bot difficulty presets.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Bot difficulty preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotDifficulty {
    /// Loose-passive
    Easy,
    /// Balanced
    #[default]
    Standard,
    /// Tight-aggressive
    Tag,
}

impl fmt::Display for BotDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            BotDifficulty::Easy => "easy",
            BotDifficulty::Standard => "standard",
            BotDifficulty::Tag => "tag",
        };
        write!(f, "{repr}")
    }
}

/// Bot difficulty parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyParams {
    /// Hand strength below this folds unless checking is free.
    pub fold_threshold: f32,

    /// Hand strength at or above this considers raising.
    pub raise_threshold: f32,

    /// Aggression factor (ratio of bets/raises to calls)
    pub aggression_factor: f32,

    /// Bluff frequency with a hand below the fold threshold (0.0 to 1.0)
    pub bluff_frequency: f32,

    /// Where in the room's think window this bot tends to land (0.0 fast,
    /// 1.0 slow).
    pub deliberation: f32,
}

impl DifficultyParams {
    /// Loose-passive: plays many hands, rarely aggressive, never bluffs
    pub fn easy() -> Self {
        Self {
            fold_threshold: 0.08,
            raise_threshold: 0.20,
            aggression_factor: 0.5,
            bluff_frequency: 0.0,
            deliberation: 0.3,
        }
    }

    /// Balanced, semi-aggressive
    pub fn standard() -> Self {
        Self {
            fold_threshold: 0.12,
            raise_threshold: 0.28,
            aggression_factor: 1.5,
            bluff_frequency: 0.15,
            deliberation: 0.5,
        }
    }

    /// Very tight, very aggressive when playing
    pub fn tag() -> Self {
        Self {
            fold_threshold: 0.18,
            raise_threshold: 0.33,
            aggression_factor: 2.5,
            bluff_frequency: 0.25,
            deliberation: 0.7,
        }
    }

    pub fn from_difficulty(difficulty: BotDifficulty) -> Self {
        match difficulty {
            BotDifficulty::Easy => Self::easy(),
            BotDifficulty::Standard => Self::standard(),
            BotDifficulty::Tag => Self::tag(),
        }
    }

    /// Thinking delay drawn from `[min, max]`, centred on this preset's
    /// deliberation point with ±25% of the window as jitter.
    pub fn think_delay<R: Rng + ?Sized>(&self, rng: &mut R, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let window = (max - min).as_secs_f32();
        let jitter = rng.random_range(-0.25f32..=0.25);
        let point = (self.deliberation + jitter).clamp(0.0, 1.0);
        min + Duration::from_secs_f32(window * point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_presets_get_tighter() {
        let easy = DifficultyParams::easy();
        let tag = DifficultyParams::tag();
        assert!(easy.fold_threshold < tag.fold_threshold);
        assert!(easy.aggression_factor < tag.aggression_factor);
        assert_eq!(easy.bluff_frequency, 0.0);
    }

    #[test]
    fn test_think_delay_stays_in_window() {
        let mut rng = StdRng::seed_from_u64(11);
        let min = Duration::from_millis(1000);
        let max = Duration::from_millis(3000);
        for difficulty in [BotDifficulty::Easy, BotDifficulty::Standard, BotDifficulty::Tag] {
            let params = DifficultyParams::from_difficulty(difficulty);
            for _ in 0..200 {
                let delay = params.think_delay(&mut rng, min, max);
                assert!(delay >= min && delay <= max, "{difficulty}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_think_delay_degenerate_window() {
        let mut rng = StdRng::seed_from_u64(1);
        let fixed = Duration::from_millis(500);
        assert_eq!(DifficultyParams::tag().think_delay(&mut rng, fixed, fixed), fixed);
    }

    #[test]
    fn test_difficulty_serde() {
        let json = serde_json::to_string(&BotDifficulty::Tag).unwrap();
        assert_eq!(json, "\"tag\"");
        let parsed: BotDifficulty = serde_json::from_str("\"easy\"").unwrap();
        assert_eq!(parsed, BotDifficulty::Easy);
    }
}
