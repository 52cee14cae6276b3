//! Room configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    bot::BotDifficulty,
    game::{
        engine::{GameSettings, MAX_SEATS},
        entities::Chips,
        pot::{RAKE_DENOMINATOR, RakePolicy},
    },
};

/// Room configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Room name
    pub name: String,

    /// Maximum number of seats (default: 9)
    pub max_seats: usize,

    pub small_blind: Chips,
    pub big_blind: Chips,

    /// Rake in basis points of each contested pot (500 = 5%)
    pub rake_bps: u32,

    /// Rake cap per hand, odd chips excluded
    pub rake_cap: Option<Chips>,

    /// Minimum buy-in in big blinds (e.g., 20 BB)
    pub min_buy_in_bb: u32,

    /// Maximum buy-in in big blinds (e.g., 100 BB). Also caps a top-up.
    pub max_buy_in_bb: u32,

    /// Withheld from a voluntary cash-out
    pub exit_fee: Chips,

    /// Time a human has to act before being auto-checked or folded
    pub action_timeout_ms: u64,

    /// Bot thinking delay window
    pub bot_think_min_ms: u64,
    pub bot_think_max_ms: u64,

    /// Time a bankrupt seat has to rebuy before it is removed
    pub rebuy_window_ms: u64,

    /// Pause between a settled hand and the next deal
    pub showdown_delay_ms: u64,

    /// Minimum time between two top-ups by the same seat
    pub top_up_cooldown_ms: u64,

    /// Whether bots fill empty seats while humans are seated
    pub bots_enabled: bool,

    /// Seats to fill, counting humans and bots
    pub target_seat_count: usize,

    pub bot_difficulty: BotDifficulty,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "Hold'em".to_string(),
            max_seats: 9,
            small_blind: 10,
            big_blind: 20,
            rake_bps: 500,
            rake_cap: Some(100),
            min_buy_in_bb: 20,
            max_buy_in_bb: 100,
            exit_fee: 0,
            action_timeout_ms: 15_000,
            bot_think_min_ms: 1_000,
            bot_think_max_ms: 3_000,
            rebuy_window_ms: 30_000,
            showdown_delay_ms: 3_000,
            top_up_cooldown_ms: 60_000,
            bots_enabled: false,
            target_seat_count: 5,
            bot_difficulty: BotDifficulty::Standard,
        }
    }
}

impl RoomConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.small_blind == 0 {
            return Err("Small blind must be positive".to_string());
        }

        if self.big_blind <= self.small_blind {
            return Err("Big blind must be greater than small blind".to_string());
        }

        if self.max_buy_in_bb < self.min_buy_in_bb || self.min_buy_in_bb == 0 {
            return Err("Buy-in range must be non-empty and start above zero".to_string());
        }

        if self.max_seats < 2 || self.max_seats > MAX_SEATS {
            return Err(format!("Max seats must be between 2 and {MAX_SEATS}"));
        }

        if u64::from(self.rake_bps) > RAKE_DENOMINATOR {
            return Err("Rake cannot exceed 100%".to_string());
        }

        if self.bot_think_max_ms < self.bot_think_min_ms {
            return Err("Bot think window is inverted".to_string());
        }

        if self.action_timeout_ms == 0 {
            return Err("Action timeout must be positive".to_string());
        }

        if self.bots_enabled && self.target_seat_count > self.max_seats {
            return Err("Bot fill target exceeds the seat count".to_string());
        }

        Ok(())
    }

    /// Engine parameters for this room.
    pub fn game_settings(&self) -> GameSettings {
        GameSettings::new(self.small_blind, self.big_blind, self.max_seats).with_rake(RakePolicy {
            bps: self.rake_bps,
            cap: self.rake_cap,
        })
    }

    pub fn min_buy_in_chips(&self) -> Chips {
        self.big_blind * Chips::from(self.min_buy_in_bb)
    }

    pub fn max_buy_in_chips(&self) -> Chips {
        self.big_blind * Chips::from(self.max_buy_in_bb)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn bot_think_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.bot_think_min_ms),
            Duration::from_millis(self.bot_think_max_ms),
        )
    }

    pub fn rebuy_window(&self) -> Duration {
        Duration::from_millis(self.rebuy_window_ms)
    }

    pub fn showdown_delay(&self) -> Duration {
        Duration::from_millis(self.showdown_delay_ms)
    }

    pub fn top_up_cooldown(&self) -> Duration {
        Duration::from_millis(self.top_up_cooldown_ms)
    }
}
