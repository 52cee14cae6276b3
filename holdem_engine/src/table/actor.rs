//! Room actor: the single serialized owner of one room's state.
//!
//! Every mutation arrives through the inbox or a timer owned by the actor,
//! so actions are applied strictly in arrival order and no two tasks ever
//! touch the same seat. The actor sleeps until the earlier of the turn timer
//! and the nearest rebuy deadline.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep, sleep_until},
};
use uuid::Uuid;

use super::{
    bankruptcy::BankruptcyMonitor,
    config::RoomConfig,
    errors::{RoomError, RoomResult},
    messages::{HaltReason, RoomEvent, RoomMessage, RoomSnapshot, RoomSummary},
    scheduler::{TimerKind, TurnPlan, TurnScheduler},
};
use crate::{
    bot::{BotDecisionContext, BotDecisionMaker, DifficultyParams},
    game::{
        engine::{GameEngine, HandProgress, HandSettlement, LeaveOutcome},
        entities::{Action, Chips, PlayerId, RoomId, Seat, SeatStatus},
        errors::GameError,
    },
    ledger::{Ledger, SessionEnd, SessionId},
};

const INBOX_CAPACITY: usize = 256;

/// Pause before the single retry of a failed cash-out.
const CASHOUT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Bots take negative ids so they never collide with ledger accounts.
const FIRST_BOT_ID: PlayerId = -1;

/// Room actor handle for sending messages
#[derive(Clone, Debug)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    room_id: RoomId,
}

/// Event stream returned by [`RoomHandle::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub events: mpsc::Receiver<RoomEvent>,
}

impl RoomHandle {
    pub fn new(sender: mpsc::Sender<RoomMessage>, room_id: RoomId) -> Self {
        Self { sender, room_id }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the room
    pub async fn send(&self, message: RoomMessage) -> RoomResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::RoomClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> RoomResult<T> {
        let (response, reply) = oneshot::channel();
        self.send(build(response)).await?;
        reply.await.map_err(|_| RoomError::RoomClosed)
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        name: impl Into<String>,
        buy_in: Chips,
    ) -> RoomResult<RoomSnapshot> {
        let name = name.into();
        self.request(|response| RoomMessage::Join {
            player_id,
            name,
            buy_in,
            response,
        })
        .await?
    }

    pub async fn leave(&self, player_id: PlayerId) -> RoomResult<()> {
        self.request(|response| RoomMessage::Leave {
            player_id,
            response,
        })
        .await?
    }

    pub async fn act(&self, player_id: PlayerId, action: Action) -> RoomResult<()> {
        self.request(|response| RoomMessage::Act {
            player_id,
            action,
            response,
        })
        .await?
    }

    pub async fn top_up(&self, player_id: PlayerId, amount: Chips) -> RoomResult<Chips> {
        self.request(|response| RoomMessage::TopUp {
            player_id,
            amount,
            response,
        })
        .await?
    }

    pub async fn add_bots(&self, count: usize) -> RoomResult<usize> {
        self.request(|response| RoomMessage::AddBots { count, response })
            .await?
    }

    pub async fn snapshot(&self, viewer: Option<PlayerId>) -> RoomResult<RoomSnapshot> {
        self.request(|response| RoomMessage::GetSnapshot { viewer, response })
            .await
    }

    pub async fn summary(&self) -> RoomResult<RoomSummary> {
        self.request(|response| RoomMessage::GetSummary { response })
            .await
    }

    /// Stream room events. The current snapshot arrives first.
    pub async fn subscribe(
        &self,
        viewer: Option<PlayerId>,
        capacity: usize,
    ) -> RoomResult<Subscription> {
        let (sender, events) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.send(RoomMessage::Subscribe {
            subscriber_id: id,
            viewer,
            sender,
        })
        .await?;
        Ok(Subscription { id, events })
    }

    pub async fn unsubscribe(&self, subscriber_id: Uuid) {
        let _ = self.send(RoomMessage::Unsubscribe { subscriber_id }).await;
    }

    pub async fn disconnect(&self, player_id: PlayerId) {
        let _ = self.send(RoomMessage::Disconnect { player_id }).await;
    }

    /// Returns the number of cash-outs still unresolved.
    pub async fn retry_cashouts(&self) -> RoomResult<usize> {
        self.request(|response| RoomMessage::RetryCashouts { response })
            .await?
    }

    pub async fn close(&self) -> RoomResult<()> {
        self.request(|response| RoomMessage::Close { response })
            .await?
    }
}

#[derive(Debug)]
struct Subscriber {
    viewer: Option<PlayerId>,
    sender: mpsc::Sender<RoomEvent>,
}

/// A session end the ledger has not accepted yet.
#[derive(Debug, Clone, Copy)]
struct PendingCashout {
    player_id: PlayerId,
    session_id: SessionId,
    end: SessionEnd,
}

/// Room actor managing a single table
pub struct RoomActor {
    id: RoomId,
    config: RoomConfig,
    engine: GameEngine,
    inbox: mpsc::Receiver<RoomMessage>,
    ledger: Arc<dyn Ledger>,
    scheduler: TurnScheduler,
    bankruptcy: BankruptcyMonitor,

    /// Ledger session per seated human
    sessions: HashMap<PlayerId, SessionId>,

    /// Seated bots and their presets
    bots: HashMap<PlayerId, DifficultyParams>,
    bot_brain: BotDecisionMaker,
    next_bot_id: PlayerId,

    last_top_up: HashMap<PlayerId, Instant>,
    unresolved: Vec<PendingCashout>,
    halt: Option<HaltReason>,

    /// Close requested; stays set while cash-outs are unresolved.
    closing: bool,
    /// Actor loop should exit.
    closed: bool,

    /// When the last human left
    idle_since: Option<Instant>,
    subscribers: HashMap<Uuid, Subscriber>,
    /// Open subscriptions per player
    connections: HashMap<PlayerId, usize>,
    /// Deferred departures caused by a lost connection
    dropped: HashSet<PlayerId>,
}

impl RoomActor {
    /// Create a new room actor with a random seed
    pub fn new(id: RoomId, config: RoomConfig, ledger: Arc<dyn Ledger>) -> (Self, RoomHandle) {
        Self::with_seed(id, config, ledger, rand::random())
    }

    /// Create a room whose shuffles, bot timings and bot decisions all derive
    /// from `seed`.
    pub fn with_seed(
        id: RoomId,
        config: RoomConfig,
        ledger: Arc<dyn Ledger>,
        seed: u64,
    ) -> (Self, RoomHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let scheduler = TurnScheduler::new(
            config.action_timeout(),
            config.bot_think_window(),
            seed.rotate_left(21),
        );
        let actor = Self {
            id,
            engine: GameEngine::new(config.game_settings(), seed),
            inbox,
            ledger,
            scheduler,
            bankruptcy: BankruptcyMonitor::new(config.rebuy_window()),
            sessions: HashMap::new(),
            bots: HashMap::new(),
            bot_brain: BotDecisionMaker::new(seed.rotate_left(42)),
            next_bot_id: FIRST_BOT_ID,
            last_top_up: HashMap::new(),
            unresolved: Vec::new(),
            halt: None,
            closing: false,
            closed: false,
            idle_since: Some(Instant::now()),
            subscribers: HashMap::new(),
            connections: HashMap::new(),
            dropped: HashSet::new(),
            config,
        };
        (actor, RoomHandle::new(sender, id))
    }

    /// Run the room event loop until the room closes
    pub async fn run(mut self) {
        log::info!("Room {}: '{}' open", self.id, self.config.name);

        loop {
            let wake = self.next_wake();
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        log::info!("Room {}: every handle dropped, closing", self.id);
                        self.close(None).await;
                        if !self.unresolved.is_empty() {
                            log::error!(
                                "Room {}: UNRESOLVED {} cash-outs abandoned with the room",
                                self.id,
                                self.unresolved.len()
                            );
                        }
                        break;
                    }
                },
                () = sleep_until_opt(wake) => self.on_timer().await,
            }

            if self.closed {
                break;
            }
        }

        log::info!("Room {}: '{}' closed", self.id, self.config.name);
    }

    fn next_wake(&self) -> Option<Instant> {
        match (self.scheduler.deadline(), self.bankruptcy.next_deadline()) {
            (Some(turn), Some(rebuy)) => Some(turn.min(rebuy)),
            (turn, rebuy) => turn.or(rebuy),
        }
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                player_id,
                name,
                buy_in,
                response,
            } => {
                let result = self.handle_join(player_id, name, buy_in).await;
                let _ = response.send(result);
            }

            RoomMessage::Leave {
                player_id,
                response,
            } => {
                let result = self.handle_leave(player_id).await;
                let _ = response.send(result);
            }

            RoomMessage::Act {
                player_id,
                action,
                response,
            } => {
                let result = self.handle_action(player_id, action).await;
                let _ = response.send(result);
            }

            RoomMessage::TopUp {
                player_id,
                amount,
                response,
            } => {
                let result = self.handle_top_up(player_id, amount).await;
                let _ = response.send(result);
            }

            RoomMessage::AddBots { count, response } => {
                let result = self.handle_add_bots(count);
                let _ = response.send(result);
            }

            RoomMessage::GetSnapshot { viewer, response } => {
                let _ = response.send(self.snapshot(viewer));
            }

            RoomMessage::GetSummary { response } => {
                let _ = response.send(self.summary());
            }

            RoomMessage::Subscribe {
                subscriber_id,
                viewer,
                sender,
            } => {
                let snapshot = RoomEvent::Snapshot(self.snapshot(viewer));
                if deliver(self.id, &subscriber_id, &sender, snapshot) {
                    if let Some(player_id) = viewer {
                        *self.connections.entry(player_id).or_default() += 1;
                    }
                    self.subscribers
                        .insert(subscriber_id, Subscriber { viewer, sender });
                    log::debug!("Room {}: subscriber {} added", self.id, subscriber_id);
                }
            }

            RoomMessage::Unsubscribe { subscriber_id } => {
                if let Some(subscriber) = self.subscribers.remove(&subscriber_id) {
                    if let Some(player_id) = subscriber.viewer {
                        self.release_connection(player_id);
                    }
                    log::debug!("Room {}: subscriber {} removed", self.id, subscriber_id);
                }
            }

            RoomMessage::Disconnect { player_id } => {
                let open = self.connections.get(&player_id).copied().unwrap_or(0);
                if open > 0 {
                    log::debug!(
                        "Room {}: player {} still has {} connections, keeping seat",
                        self.id,
                        player_id,
                        open
                    );
                } else if let Err(err) = self.depart(player_id, false).await {
                    log::debug!(
                        "Room {}: disconnect of player {} ignored: {}",
                        self.id,
                        player_id,
                        err
                    );
                }
            }

            RoomMessage::RetryCashouts { response } => {
                let remaining = self.retry_unresolved().await;
                if remaining == 0 {
                    self.ensure_next_hand();
                }
                self.broadcast_snapshot();
                let _ = response.send(Ok(remaining));
            }

            RoomMessage::Close { response } => {
                self.close(None).await;
                let _ = response.send(Ok(()));
            }
        }
    }

    // === Commands ===

    async fn handle_join(
        &mut self,
        player_id: PlayerId,
        name: String,
        buy_in: Chips,
    ) -> RoomResult<RoomSnapshot> {
        self.ensure_accepting()?;
        if player_id <= 0 {
            return Err(GameError::illegal("player ids must be positive").into());
        }

        let (min_buy_in, max_buy_in) = (
            self.config.min_buy_in_chips(),
            self.config.max_buy_in_chips(),
        );
        if buy_in < min_buy_in || buy_in > max_buy_in {
            return Err(RoomError::InvalidBuyIn(format!(
                "buy-in must be between {min_buy_in} and {max_buy_in} chips"
            )));
        }
        if self.engine.seat(player_id).is_some() || self.sessions.contains_key(&player_id) {
            return Err(GameError::AlreadySeated(player_id).into());
        }
        if self.engine.is_full() && !self.make_room_for_human() {
            return Err(GameError::TableFull.into());
        }

        let session_id = self
            .ledger
            .reserve_session(player_id, buy_in, self.id)
            .await?;

        if let Err(err) = self.engine.seat_player(player_id, name.clone(), buy_in, false) {
            log::warn!(
                "Room {}: seating player {} failed after reservation: {}",
                self.id,
                player_id,
                err
            );
            let release = PendingCashout {
                player_id,
                session_id,
                end: SessionEnd {
                    final_chips: buy_in,
                    rake_paid: 0,
                    exit_fee: 0,
                },
            };
            if !self.settle_session(&release).await {
                self.unresolved.push(release);
                self.halt_for_cashouts();
            }
            return Err(err.into());
        }

        self.sessions.insert(player_id, session_id);
        self.idle_since = None;
        log::info!(
            "Room {}: player {} ({}) joined with {} chips",
            self.id,
            player_id,
            name,
            buy_in
        );

        self.refill_bots();
        self.ensure_next_hand();
        self.broadcast_snapshot();
        Ok(self.snapshot(Some(player_id)))
    }

    async fn handle_leave(&mut self, player_id: PlayerId) -> RoomResult<()> {
        self.depart(player_id, true).await
    }

    /// Release a seat. Only a voluntary departure pays the exit fee.
    async fn depart(&mut self, player_id: PlayerId, voluntary: bool) -> RoomResult<()> {
        if self.audit_halted() {
            return Err(RoomError::RoomHalted);
        }
        if self.bots.contains_key(&player_id) {
            return Err(GameError::NotSeated(player_id).into());
        }

        let outcome = self
            .engine
            .request_leave(player_id)
            .map_err(|err| self.fail(err))?;
        match outcome {
            LeaveOutcome::Removed(seat) => {
                log::info!(
                    "Room {}: player {} left with {} chips",
                    self.id,
                    player_id,
                    seat.chips
                );
                self.forget_player(player_id);
                self.cash_out(seat, voluntary).await;
                self.refill_bots();
                self.broadcast_snapshot();
            }
            LeaveOutcome::Deferred(progress) => {
                log::info!(
                    "Room {}: player {} leaves after this hand",
                    self.id,
                    player_id
                );
                if voluntary {
                    self.dropped.remove(&player_id);
                } else {
                    self.dropped.insert(player_id);
                }
                match progress {
                    Some(progress) => self.drive(progress).await,
                    None => self.broadcast_snapshot(),
                }
            }
        }
        Ok(())
    }

    async fn handle_action(&mut self, player_id: PlayerId, action: Action) -> RoomResult<()> {
        if self.audit_halted() {
            return Err(RoomError::RoomHalted);
        }
        if self.engine.seat(player_id).is_none() {
            return Err(GameError::NotSeated(player_id).into());
        }
        if self.scheduler.wake(player_id) {
            log::info!("Room {}: player {} is back from sitting out", self.id, player_id);
        }

        // Rejected actions leave the pending timer untouched.
        let progress = self
            .engine
            .apply_action(player_id, action)
            .map_err(|err| self.fail(err))?;
        self.drive(progress).await;
        Ok(())
    }

    async fn handle_top_up(&mut self, player_id: PlayerId, amount: Chips) -> RoomResult<Chips> {
        let waiting = self
            .engine
            .seat(player_id)
            .is_some_and(|seat| seat.status == SeatStatus::WaitingForRebuy);
        // Rebuy windows keep running through a cash-out halt.
        let rebuy_during_halt = waiting
            && !self.closing
            && matches!(self.halt, Some(HaltReason::UnresolvedCashout { .. }));
        if !rebuy_during_halt {
            self.ensure_accepting()?;
        }
        if amount == 0 {
            return Err(RoomError::InvalidBuyIn("top-up must be positive".to_string()));
        }
        let seat = self
            .engine
            .seat(player_id)
            .filter(|seat| !seat.is_bot)
            .ok_or(GameError::NotSeated(player_id))?;
        let stack = seat.chips + seat.pending_top_up;

        let now = Instant::now();
        if !waiting && let Some(last) = self.last_top_up.get(&player_id) {
            let ready = *last + self.config.top_up_cooldown();
            if ready > now {
                let wait_ms = (ready - now).as_millis();
                return Err(RoomError::TopUpCooldown {
                    retry_after_secs: u64::try_from(wait_ms.div_ceil(1000)).unwrap_or(u64::MAX),
                });
            }
        }

        let max_stack = self.config.max_buy_in_chips();
        if stack + amount > max_stack {
            return Err(RoomError::InvalidBuyIn(format!(
                "stack would exceed the {max_stack} chip maximum"
            )));
        }
        if self
            .engine
            .current_actor()
            .is_some_and(|(actor, _)| actor == player_id)
        {
            return Err(GameError::illegal("cannot add chips while acting").into());
        }

        let session_id = *self
            .sessions
            .get(&player_id)
            .ok_or(GameError::NotSeated(player_id))?;
        self.ledger.add_chips(player_id, session_id, amount).await?;

        if let Err(err) = self.engine.add_chips(player_id, amount) {
            self.halt_for_audit(format!(
                "top-up of {amount} for player {player_id} reserved but not credited: {err}"
            ));
            return Err(err.into());
        }
        self.last_top_up.insert(player_id, now);
        log::info!(
            "Room {}: player {} topped up {} chips",
            self.id,
            player_id,
            amount
        );

        if waiting {
            self.engine
                .set_status(player_id, SeatStatus::Playing)
                .map_err(|err| self.fail(err))?;
            self.bankruptcy.on_rebuy(player_id);
            self.emit(RoomEvent::SeatStatusChanged {
                room_id: self.id,
                player_id,
                status: SeatStatus::Playing,
            });
        }

        self.ensure_next_hand();
        self.broadcast_snapshot();
        Ok(stack + amount)
    }

    fn handle_add_bots(&mut self, count: usize) -> RoomResult<usize> {
        self.ensure_accepting()?;
        let seated = self.seat_bots(count);
        if seated > 0 {
            self.ensure_next_hand();
            self.broadcast_snapshot();
        }
        Ok(seated)
    }

    // === Timers ===

    async fn on_timer(&mut self) {
        let now = Instant::now();

        let expired = self.bankruptcy.take_expired(now);
        if !expired.is_empty() {
            self.kick_bankrupt(expired).await;
            if self.closing {
                return;
            }
        }

        let Some(kind) = self.scheduler.take_due(now) else {
            return;
        };
        match kind {
            TimerKind::NextHand => self.on_next_hand().await,
            TimerKind::BotThink { player_id, turn } => {
                if self.is_current_turn(player_id, turn) {
                    self.play_bot(player_id).await;
                } else {
                    log::debug!("Room {}: stale bot timer for {}", self.id, player_id);
                }
            }
            TimerKind::ActionDeadline { player_id, turn } => {
                if self.is_current_turn(player_id, turn) {
                    self.on_timeout(player_id).await;
                } else {
                    log::debug!("Room {}: stale deadline for {}", self.id, player_id);
                }
            }
        }
    }

    fn is_current_turn(&self, player_id: PlayerId, turn: u64) -> bool {
        self.engine.current_actor() == Some((player_id, turn))
    }

    async fn on_next_hand(&mut self) {
        if !self.unresolved.is_empty() && self.retry_unresolved().await > 0 {
            self.scheduler
                .schedule_next_hand(self.config.showdown_delay(), Instant::now());
            return;
        }
        self.start_hand().await;
    }

    async fn start_hand(&mut self) {
        if self.halt.is_some() || self.closing || self.engine.hand_in_progress() {
            return;
        }
        match self.engine.start_hand() {
            Ok(progress) => self.drive(progress).await,
            Err(GameError::NotEnoughPlayers) => {
                log::debug!("Room {}: waiting for players", self.id);
                self.broadcast_snapshot();
            }
            Err(err) => {
                self.fail(err);
            }
        }
    }

    /// Deal again after the showdown pause, if nothing else is pending.
    fn ensure_next_hand(&mut self) {
        if self.halt.is_none()
            && !self.closing
            && !self.engine.hand_in_progress()
            && self.scheduler.pending().is_none()
            && self.engine.eligible_count() >= 2
        {
            self.scheduler
                .schedule_next_hand(self.config.showdown_delay(), Instant::now());
        }
    }

    async fn on_timeout(&mut self, player_id: PlayerId) {
        let action = if self.engine.can_check(player_id) {
            Action::Check
        } else {
            Action::Fold
        };
        match self.engine.apply_action(player_id, action) {
            Ok(progress) => {
                log::info!(
                    "Room {}: player {} timed out and {}",
                    self.id,
                    player_id,
                    action
                );
                self.scheduler.sit_out(player_id);
                self.emit(RoomEvent::PlayerTimedOut {
                    room_id: self.id,
                    player_id,
                    action,
                });
                self.drive(progress).await;
            }
            Err(err) => {
                self.fail(err);
            }
        }
    }

    async fn play_bot(&mut self, player_id: PlayerId) {
        let Some(params) = self.bots.get(&player_id).cloned() else {
            return;
        };
        let Some(ctx) = bot_context(&self.engine, player_id) else {
            return;
        };
        let action = self.bot_brain.decide_action(&params, &ctx);

        let progress = match self.engine.apply_action(player_id, action) {
            Ok(progress) => progress,
            Err(err) if !err.is_fatal() => {
                log::warn!(
                    "Room {}: bot {} chose an illegal {} ({}), folding",
                    self.id,
                    player_id,
                    action,
                    err
                );
                match self.engine.apply_action(player_id, Action::Fold) {
                    Ok(progress) => progress,
                    Err(err) => {
                        self.fail(err);
                        return;
                    }
                }
            }
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.drive(progress).await;
    }

    // === Hand flow ===

    /// Follow the engine until it waits on a timer, acting immediately for
    /// seats that sit out, then broadcast.
    async fn drive(&mut self, mut progress: HandProgress) {
        loop {
            match progress {
                HandProgress::NextTurn { player_id, turn } => {
                    let bot = self.bots.get(&player_id);
                    match self
                        .scheduler
                        .plan_turn(player_id, turn, bot, Instant::now())
                    {
                        TurnPlan::Armed(_) => break,
                        TurnPlan::AutoAct => {
                            log::debug!(
                                "Room {}: player {} sits out, acting passively",
                                self.id,
                                player_id
                            );
                            match self.engine.apply_passive_action(player_id) {
                                Ok(next) => progress = next,
                                Err(err) => {
                                    self.fail(err);
                                    return;
                                }
                            }
                        }
                    }
                }
                HandProgress::Settled(summary) => {
                    self.on_settled(*summary).await;
                    return;
                }
            }
        }
        self.broadcast_snapshot();
    }

    async fn on_settled(&mut self, summary: HandSettlement) {
        self.scheduler.cancel();
        self.emit(RoomEvent::HandSettled {
            room_id: self.id,
            settlement: summary,
        });

        let departed = match self.engine.take_departures() {
            Ok(departed) => departed,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        for seat in departed {
            let voluntary = !self.dropped.remove(&seat.player_id);
            self.forget_player(seat.player_id);
            self.cash_out(seat, voluntary).await;
        }

        let now = Instant::now();
        let (busted_bots, bankrupt): (Vec<PlayerId>, Vec<PlayerId>) = self
            .engine
            .bankrupt_players()
            .into_iter()
            .partition(|player_id| self.bots.contains_key(player_id));

        for player_id in self.bankruptcy.on_hand_settled(&bankrupt, now) {
            if let Err(err) = self.engine.set_status(player_id, SeatStatus::WaitingForRebuy) {
                self.fail(err);
                return;
            }
            log::info!(
                "Room {}: player {} is out of chips, rebuy window open",
                self.id,
                player_id
            );
            self.emit(RoomEvent::SeatStatusChanged {
                room_id: self.id,
                player_id,
                status: SeatStatus::WaitingForRebuy,
            });
        }

        if busted_bots.is_empty() {
            self.refill_bots();
        } else {
            for player_id in busted_bots {
                self.eliminate(player_id).await;
            }
            self.after_removal().await;
            if self.closing {
                return;
            }
        }

        if !self.audit_halted() {
            self.scheduler
                .schedule_next_hand(self.config.showdown_delay(), now);
        }
        self.broadcast_snapshot();
    }

    /// Remove seats whose rebuy window closed.
    async fn kick_bankrupt(&mut self, expired: Vec<PlayerId>) {
        for player_id in expired {
            log::info!(
                "Room {}: player {} missed the rebuy window",
                self.id,
                player_id
            );
            self.eliminate(player_id).await;
        }
        self.after_removal().await;
    }

    async fn eliminate(&mut self, player_id: PlayerId) {
        match self.engine.remove_player(player_id) {
            Ok(mut seat) => {
                seat.status = SeatStatus::Eliminated;
                self.emit(RoomEvent::SeatStatusChanged {
                    room_id: self.id,
                    player_id,
                    status: SeatStatus::Eliminated,
                });
                self.forget_player(player_id);
                self.cash_out(seat, false).await;
            }
            Err(err) => log::warn!(
                "Room {}: could not remove player {}: {}",
                self.id,
                player_id,
                err
            ),
        }
    }

    /// After seats were forced out: refill bots, then close the room if a
    /// single seat is left standing.
    async fn after_removal(&mut self) {
        self.refill_bots();
        if self.engine.hand_in_progress() {
            self.broadcast_snapshot();
            return;
        }
        let eligible: Vec<PlayerId> = self
            .engine
            .seats()
            .filter(|seat| seat.is_eligible())
            .map(|seat| seat.player_id)
            .collect();
        match self.bankruptcy.last_standing(&eligible) {
            Some(winner) => {
                log::info!("Room {}: player {} wins by walkover", self.id, winner);
                self.close(Some(winner)).await;
            }
            None => self.broadcast_snapshot(),
        }
    }

    // === Seats and bots ===

    fn release_connection(&mut self, player_id: PlayerId) {
        if let Some(open) = self.connections.get_mut(&player_id) {
            *open = open.saturating_sub(1);
            if *open == 0 {
                self.connections.remove(&player_id);
            }
        }
    }

    fn forget_player(&mut self, player_id: PlayerId) {
        self.scheduler.forget(player_id);
        self.dropped.remove(&player_id);
        self.bankruptcy.remove(player_id);
        self.last_top_up.remove(&player_id);
        if self.idle_since.is_none() && self.engine.human_count() == 0 {
            self.idle_since = Some(Instant::now());
        }
    }

    /// Keep the table at its bot fill target while humans are seated.
    fn refill_bots(&mut self) {
        if !self.config.bots_enabled || self.closing {
            return;
        }
        if self.engine.human_count() == 0 {
            self.remove_bots(usize::MAX);
            return;
        }
        let seated = self.engine.seat_count();
        let target = self.config.target_seat_count.min(self.config.max_seats);
        if seated < target {
            self.seat_bots(target - seated);
        } else if seated > target {
            self.remove_bots(seated - target);
        }
    }

    fn seat_bots(&mut self, count: usize) -> usize {
        let chips = self.config.max_buy_in_chips();
        let mut seated = 0;
        while seated < count && !self.engine.is_full() {
            let player_id = self.next_bot_id;
            self.next_bot_id -= 1;
            let name = format!("Bot {}", -player_id);
            if let Err(err) = self.engine.seat_player(player_id, name, chips, true) {
                log::warn!("Room {}: could not seat bot: {}", self.id, err);
                break;
            }
            self.bots.insert(
                player_id,
                DifficultyParams::from_difficulty(self.config.bot_difficulty),
            );
            seated += 1;
        }
        if seated > 0 {
            log::debug!("Room {}: seated {} bots", self.id, seated);
        }
        seated
    }

    /// Remove up to `count` bots that are not dealt into a running hand.
    fn remove_bots(&mut self, count: usize) -> usize {
        let idle: Vec<PlayerId> = self
            .engine
            .seats()
            .filter(|seat| seat.is_bot && !(seat.in_hand && self.engine.hand_in_progress()))
            .map(|seat| seat.player_id)
            .take(count)
            .collect();
        let mut removed = 0;
        for player_id in idle {
            if self.engine.remove_player(player_id).is_ok() {
                self.bots.remove(&player_id);
                self.scheduler.forget(player_id);
                removed += 1;
            }
        }
        removed
    }

    fn make_room_for_human(&mut self) -> bool {
        self.remove_bots(1) == 1
    }

    // === Ledger ===

    /// End the seat's ledger session. Bots hold house chips and skip this.
    async fn cash_out(&mut self, seat: Seat, voluntary: bool) {
        if seat.is_bot {
            self.bots.remove(&seat.player_id);
            return;
        }
        let Some(session_id) = self.sessions.remove(&seat.player_id) else {
            log::error!(
                "Room {}: player {} left without a ledger session",
                self.id,
                seat.player_id
            );
            return;
        };
        let final_chips = seat.chips + seat.pending_top_up;
        let exit_fee = if voluntary {
            self.config.exit_fee.min(final_chips)
        } else {
            0
        };
        let cashout = PendingCashout {
            player_id: seat.player_id,
            session_id,
            end: SessionEnd {
                final_chips,
                rake_paid: seat.total_rake_paid,
                exit_fee,
            },
        };
        if !self.settle_session(&cashout).await {
            self.unresolved.push(cashout);
            self.halt_for_cashouts();
        }
    }

    /// One attempt plus a single retry.
    async fn settle_session(&self, cashout: &PendingCashout) -> bool {
        let PendingCashout {
            player_id,
            session_id,
            end,
        } = *cashout;

        match self.ledger.end_session(player_id, session_id, end).await {
            Ok(()) => return true,
            Err(err) => log::warn!(
                "Room {}: cash-out for player {} failed ({}), retrying",
                self.id,
                player_id,
                err
            ),
        }
        sleep(CASHOUT_RETRY_DELAY).await;
        match self.ledger.end_session(player_id, session_id, end).await {
            Ok(()) => true,
            Err(err) => {
                log::error!(
                    "Room {}: UNRESOLVED cash-out of {} chips for player {} (session {}): {}",
                    self.id,
                    end.final_chips,
                    player_id,
                    session_id,
                    err
                );
                false
            }
        }
    }

    /// Returns how many cash-outs are still unresolved.
    async fn retry_unresolved(&mut self) -> usize {
        let pending = std::mem::take(&mut self.unresolved);
        for cashout in pending {
            if self.settle_session(&cashout).await {
                log::info!(
                    "Room {}: cash-out for player {} resolved",
                    self.id,
                    cashout.player_id
                );
            } else {
                self.unresolved.push(cashout);
            }
        }

        if self.unresolved.is_empty() {
            if matches!(self.halt, Some(HaltReason::UnresolvedCashout { .. })) {
                log::info!("Room {}: all cash-outs resolved, resuming", self.id);
                self.halt = None;
            }
            if self.closing {
                self.closed = true;
            }
        } else if let Some(HaltReason::UnresolvedCashout { player_ids }) = self.halt.as_mut() {
            *player_ids = self.unresolved.iter().map(|c| c.player_id).collect();
        }
        self.unresolved.len()
    }

    // === Halting and closing ===

    fn audit_halted(&self) -> bool {
        matches!(self.halt, Some(HaltReason::SettlementConsistency { .. }))
    }

    fn ensure_accepting(&self) -> RoomResult<()> {
        if self.closing {
            return Err(RoomError::RoomClosed);
        }
        if self.halt.is_some() {
            return Err(RoomError::RoomHalted);
        }
        Ok(())
    }

    /// Log an engine error, halting the room if it is fatal.
    fn fail(&mut self, err: GameError) -> RoomError {
        if err.is_fatal() {
            self.halt_for_audit(err.to_string());
        } else {
            log::debug!("Room {}: rejected: {}", self.id, err);
        }
        RoomError::Game(err)
    }

    /// Stop dealing until an operator has looked at the room. The running
    /// hand is cancelled and contributions go back to their seats.
    fn halt_for_audit(&mut self, detail: String) {
        log::error!("Room {}: halted for audit: {}", self.id, detail);
        self.scheduler.cancel();
        if let Err(err) = self.engine.abort_hand() {
            log::error!("Room {}: abort after halt failed: {}", self.id, err);
        }
        let reason = HaltReason::SettlementConsistency { detail };
        self.halt = Some(reason.clone());
        self.emit(RoomEvent::RoomHalted {
            room_id: self.id,
            reason,
        });
        self.broadcast_snapshot();
    }

    fn halt_for_cashouts(&mut self) {
        if self.audit_halted() {
            return;
        }
        let reason = HaltReason::UnresolvedCashout {
            player_ids: self.unresolved.iter().map(|c| c.player_id).collect(),
        };
        self.halt = Some(reason.clone());
        self.emit(RoomEvent::RoomHalted {
            room_id: self.id,
            reason,
        });
    }

    /// Cancel timers, refund the running hand and cash every seat out.
    /// The loop exits once no cash-out is left unresolved.
    async fn close(&mut self, winner: Option<PlayerId>) {
        if self.closing {
            if self.unresolved.is_empty() || self.retry_unresolved().await == 0 {
                self.closed = true;
            }
            return;
        }
        self.closing = true;
        self.scheduler.cancel();
        self.bankruptcy.clear();

        match self.engine.abort_hand() {
            Ok(Some(hand)) => log::info!("Room {}: hand #{} aborted on close", self.id, hand),
            Ok(None) => {}
            Err(err) => log::error!("Room {}: abort on close failed: {}", self.id, err),
        }

        let player_ids: Vec<PlayerId> = self.engine.seats().map(|seat| seat.player_id).collect();
        for player_id in player_ids {
            match self.engine.remove_player(player_id) {
                Ok(seat) => self.cash_out(seat, false).await,
                Err(err) => log::error!(
                    "Room {}: could not remove player {} on close: {}",
                    self.id,
                    player_id,
                    err
                ),
            }
        }

        self.broadcast_snapshot();
        self.emit(RoomEvent::RoomClosed {
            room_id: self.id,
            winner,
        });
        if self.unresolved.is_empty() {
            self.closed = true;
        } else {
            log::error!(
                "Room {}: closing with {} unresolved cash-outs",
                self.id,
                self.unresolved.len()
            );
        }
    }

    // === Views and broadcast ===

    fn snapshot(&self, viewer: Option<PlayerId>) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id,
            name: self.config.name.clone(),
            halt: self.halt.clone(),
            closed: self.closing,
            game: self.engine.view(viewer, self.scheduler.sitting_out()),
        }
    }

    fn summary(&self) -> RoomSummary {
        let now = Instant::now();
        RoomSummary {
            room_id: self.id,
            name: self.config.name.clone(),
            seated: self.engine.seat_count(),
            humans: self.engine.human_count(),
            max_seats: self.engine.settings().max_seats,
            small_blind: self.config.small_blind,
            big_blind: self.config.big_blind,
            hand_number: self.engine.hand_number(),
            street: self.engine.street(),
            halted: self.halt.is_some(),
            idle_ms: self.idle_since.map(|since| {
                u64::try_from(now.duration_since(since).as_millis()).unwrap_or(u64::MAX)
            }),
        }
    }

    /// Send each subscriber its own view. Never sends a state that fails the
    /// invariant check.
    fn broadcast_snapshot(&mut self) {
        if let Err(err) = self.engine.verify_invariants() {
            if !self.audit_halted() {
                self.halt_for_audit(err.to_string());
            }
            return;
        }
        let room_id = self.id;
        let engine = &self.engine;
        let sitting_out = self.scheduler.sitting_out();
        let name = &self.config.name;
        let halt = &self.halt;
        let closed = self.closing;
        let mut lost = Vec::new();
        self.subscribers.retain(|subscriber_id, subscriber| {
            let snapshot = RoomSnapshot {
                room_id,
                name: name.clone(),
                halt: halt.clone(),
                closed,
                game: engine.view(subscriber.viewer, sitting_out),
            };
            let keep = deliver(
                room_id,
                subscriber_id,
                &subscriber.sender,
                RoomEvent::Snapshot(snapshot),
            );
            if !keep {
                lost.extend(subscriber.viewer);
            }
            keep
        });
        for player_id in lost {
            self.release_connection(player_id);
        }
    }

    fn emit(&mut self, event: RoomEvent) {
        let room_id = self.id;
        let mut lost = Vec::new();
        self.subscribers.retain(|subscriber_id, subscriber| {
            let keep = deliver(room_id, subscriber_id, &subscriber.sender, event.clone());
            if !keep {
                lost.extend(subscriber.viewer);
            }
            keep
        });
        for player_id in lost {
            self.release_connection(player_id);
        }
    }
}

/// Push without waiting. Returns whether to keep the subscriber.
fn deliver(
    room_id: RoomId,
    subscriber_id: &Uuid,
    sender: &mpsc::Sender<RoomEvent>,
    event: RoomEvent,
) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            log::warn!(
                "Room {}: subscriber {} channel full, dropping event",
                room_id,
                subscriber_id
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::debug!("Room {}: subscriber {} disconnected", room_id, subscriber_id);
            false
        }
    }
}

/// What a bot can see on its turn.
fn bot_context(engine: &GameEngine, player_id: PlayerId) -> Option<BotDecisionContext<'_>> {
    let hand = engine.hand()?;
    let seat = engine.seat(player_id)?;
    let position = engine
        .seats()
        .filter(|other| other.player_id != player_id && hand.round.needs_action(other))
        .count();
    Some(BotDecisionContext {
        hole_cards: &seat.hole_cards,
        board_cards: engine.board(),
        pot: engine.pot_total(),
        to_call: engine.to_call(player_id),
        table_bet: hand.round.table_bet,
        min_raise_to: engine.min_raise_to().unwrap_or(hand.round.table_bet),
        street_bet: seat.street_bet,
        chips: seat.chips,
        position: Some(position),
        players_remaining: engine.seats().filter(|seat| seat.is_live()).count(),
    })
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
