//! Turn timers for one room.
//!
//! At most one turn timer is outstanding per room. Arming a new one replaces
//! whatever was pending, and every timer carries the turn counter it was
//! armed for so the actor can drop it if the turn already moved on.

use rand::{SeedableRng, rngs::StdRng};
use std::{collections::HashSet, time::Duration};
use tokio::time::Instant;

use crate::{bot::DifficultyParams, game::entities::PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Bot finished "thinking" and should act.
    BotThink { player_id: PlayerId, turn: u64 },
    /// Human ran out of time.
    ActionDeadline { player_id: PlayerId, turn: u64 },
    /// Showdown pause is over; deal again.
    NextHand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledTimer {
    kind: TimerKind,
    deadline: Instant,
}

/// What the actor should do about a new turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPlan {
    /// A timer is pending; wait for it or for the player.
    Armed(Instant),
    /// Seat sits out: act for it now.
    AutoAct,
}

#[derive(Debug)]
pub struct TurnScheduler {
    pending: Option<ScheduledTimer>,
    sitting_out: HashSet<PlayerId>,
    action_timeout: Duration,
    think_min: Duration,
    think_max: Duration,
    rng: StdRng,
}

impl TurnScheduler {
    pub fn new(action_timeout: Duration, think_window: (Duration, Duration), seed: u64) -> Self {
        Self {
            pending: None,
            sitting_out: HashSet::new(),
            action_timeout,
            think_min: think_window.0,
            think_max: think_window.1,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Arm the timer for a new turn. `bot` carries the bot's preset when the
    /// actor is a bot.
    ///
    /// Re-planning the turn that is already armed keeps its deadline, so a
    /// player cannot buy time by triggering unrelated room updates.
    pub fn plan_turn(
        &mut self,
        player_id: PlayerId,
        turn: u64,
        bot: Option<&DifficultyParams>,
        now: Instant,
    ) -> TurnPlan {
        if let Some(timer) = self.pending {
            let same_turn = match timer.kind {
                TimerKind::BotThink { player_id: p, turn: t }
                | TimerKind::ActionDeadline { player_id: p, turn: t } => {
                    p == player_id && t == turn
                }
                TimerKind::NextHand => false,
            };
            if same_turn {
                return TurnPlan::Armed(timer.deadline);
            }
        }

        let (kind, delay) = match bot {
            Some(params) => {
                let delay = params.think_delay(&mut self.rng, self.think_min, self.think_max);
                (TimerKind::BotThink { player_id, turn }, delay)
            }
            None if self.sitting_out.contains(&player_id) => {
                self.pending = None;
                return TurnPlan::AutoAct;
            }
            None => (
                TimerKind::ActionDeadline { player_id, turn },
                self.action_timeout,
            ),
        };
        let deadline = now + delay;
        self.pending = Some(ScheduledTimer { kind, deadline });
        TurnPlan::Armed(deadline)
    }

    pub fn schedule_next_hand(&mut self, delay: Duration, now: Instant) -> Instant {
        let deadline = now + delay;
        self.pending = Some(ScheduledTimer {
            kind: TimerKind::NextHand,
            deadline,
        });
        deadline
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|timer| timer.deadline)
    }

    pub fn pending(&self) -> Option<TimerKind> {
        self.pending.map(|timer| timer.kind)
    }

    /// Take the pending timer if it has fired.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerKind> {
        match self.pending {
            Some(timer) if timer.deadline <= now => {
                self.pending = None;
                Some(timer.kind)
            }
            _ => None,
        }
    }

    pub fn sit_out(&mut self, player_id: PlayerId) {
        self.sitting_out.insert(player_id);
    }

    /// Any voluntary action wakes a sat-out seat. Returns whether it was
    /// sitting out.
    pub fn wake(&mut self, player_id: PlayerId) -> bool {
        self.sitting_out.remove(&player_id)
    }

    pub fn is_sitting_out(&self, player_id: PlayerId) -> bool {
        self.sitting_out.contains(&player_id)
    }

    pub fn sitting_out(&self) -> &HashSet<PlayerId> {
        &self.sitting_out
    }

    /// Drop all state about a player who left.
    pub fn forget(&mut self, player_id: PlayerId) {
        self.sitting_out.remove(&player_id);
        let owns_timer = matches!(
            self.pending.map(|timer| timer.kind),
            Some(TimerKind::BotThink { player_id: p, .. } | TimerKind::ActionDeadline { player_id: p, .. })
                if p == player_id
        );
        if owns_timer {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> TurnScheduler {
        TurnScheduler::new(
            Duration::from_secs(15),
            (Duration::from_secs(1), Duration::from_secs(3)),
            5,
        )
    }

    #[test]
    fn test_human_turn_arms_deadline() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        let plan = scheduler.plan_turn(1, 4, None, now);

        assert_eq!(plan, TurnPlan::Armed(now + Duration::from_secs(15)));
        assert_eq!(
            scheduler.pending(),
            Some(TimerKind::ActionDeadline {
                player_id: 1,
                turn: 4
            })
        );
        assert_eq!(scheduler.take_due(now + Duration::from_secs(14)), None);
        assert!(scheduler.take_due(now + Duration::from_secs(15)).is_some());
        assert_eq!(scheduler.pending(), None);
    }

    #[test]
    fn test_bot_turn_uses_think_window() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        let params = DifficultyParams::standard();
        let TurnPlan::Armed(deadline) = scheduler.plan_turn(9, 1, Some(&params), now) else {
            panic!("bot turn must arm a timer");
        };
        assert!(deadline >= now + Duration::from_secs(1));
        assert!(deadline <= now + Duration::from_secs(3));
    }

    #[test]
    fn test_new_turn_replaces_pending_timer() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        scheduler.plan_turn(1, 1, None, now);
        scheduler.plan_turn(2, 2, None, now + Duration::from_secs(5));

        assert_eq!(
            scheduler.pending(),
            Some(TimerKind::ActionDeadline {
                player_id: 2,
                turn: 2
            })
        );
        assert_eq!(scheduler.deadline(), Some(now + Duration::from_secs(20)));
    }

    #[test]
    fn test_replanning_same_turn_keeps_deadline() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        scheduler.plan_turn(1, 3, None, now);
        let plan = scheduler.plan_turn(1, 3, None, now + Duration::from_secs(10));
        assert_eq!(plan, TurnPlan::Armed(now + Duration::from_secs(15)));
    }

    #[test]
    fn test_sitting_out_acts_immediately() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        scheduler.schedule_next_hand(Duration::from_secs(3), now);
        scheduler.sit_out(1);

        assert_eq!(scheduler.plan_turn(1, 7, None, now), TurnPlan::AutoAct);
        assert_eq!(scheduler.pending(), None);

        assert!(scheduler.wake(1));
        assert!(!scheduler.wake(1));
        assert!(matches!(
            scheduler.plan_turn(1, 8, None, now),
            TurnPlan::Armed(_)
        ));
    }

    #[test]
    fn test_forget_drops_owned_timer() {
        let mut scheduler = scheduler();
        let now = Instant::now();
        scheduler.plan_turn(1, 1, None, now);
        scheduler.forget(2);
        assert!(scheduler.pending().is_some());
        scheduler.forget(1);
        assert!(scheduler.pending().is_none());
    }
}
