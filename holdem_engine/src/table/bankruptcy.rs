//! Rebuy countdowns for seats that went broke.

use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;

use crate::game::entities::PlayerId;

#[derive(Debug)]
pub struct BankruptcyMonitor {
    window: Duration,
    countdowns: HashMap<PlayerId, Instant>,
}

impl BankruptcyMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            countdowns: HashMap::new(),
        }
    }

    /// Start countdowns for seats left without chips by the last hand.
    /// Returns the seats whose countdown started now.
    pub fn on_hand_settled(&mut self, bankrupt: &[PlayerId], now: Instant) -> Vec<PlayerId> {
        let deadline = now + self.window;
        bankrupt
            .iter()
            .copied()
            .filter(|player_id| {
                if self.countdowns.contains_key(player_id) {
                    return false;
                }
                self.countdowns.insert(*player_id, deadline);
                true
            })
            .collect()
    }

    /// Chips arrived in time. Returns whether the seat was waiting.
    pub fn on_rebuy(&mut self, player_id: PlayerId) -> bool {
        self.countdowns.remove(&player_id).is_some()
    }

    /// Seat left on its own.
    pub fn remove(&mut self, player_id: PlayerId) {
        self.countdowns.remove(&player_id);
    }

    /// Seats whose window closed, in id order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PlayerId> {
        let mut expired: Vec<PlayerId> = self
            .countdowns
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(player_id, _)| *player_id)
            .collect();
        expired.sort_unstable();
        for player_id in &expired {
            self.countdowns.remove(player_id);
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.countdowns.values().min().copied()
    }

    pub fn is_waiting(&self, player_id: PlayerId) -> bool {
        self.countdowns.contains_key(&player_id)
    }

    pub fn waiting_count(&self) -> usize {
        self.countdowns.len()
    }

    /// The only eligible seat wins once nobody is mid-rebuy.
    pub fn last_standing(&self, eligible: &[PlayerId]) -> Option<PlayerId> {
        match eligible {
            [winner] if self.countdowns.is_empty() => Some(*winner),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.countdowns.clear();
    }
}
