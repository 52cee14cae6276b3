//! Prometheus metrics for room and connection health.
//!
//! Room events reach this module through the registry observer channel, so
//! the engine itself never touches the recorder.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use holdem_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//! metrics::websocket_connections_total();
//! ```

use holdem_engine::{
    RoomEvent,
    table::{HaltReason, RoomSnapshot},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::{sync::mpsc, task::JoinHandle};

/// Initialize the Prometheus exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Set current active WebSocket connections count.
pub fn websocket_connections_active(count: u64) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

// ============================================================================
// Room Metrics
// ============================================================================

/// Set current open rooms count.
pub fn active_rooms(count: usize) {
    metrics::gauge!("active_rooms").set(count as f64);
}

/// Set seated humans for one room.
pub fn room_players(room_id: i64, humans: usize) {
    metrics::gauge!("room_players", "room_id" => room_id.to_string()).set(humans as f64);
}

pub fn hands_settled_total(walkover: bool) {
    metrics::counter!("hands_settled_total", "walkover" => walkover.to_string()).increment(1);
}

/// Record pot size distribution.
pub fn pot_size_chips(size: u64) {
    metrics::histogram!("pot_size_chips").record(size as f64);
}

/// Rake and odd chips kept by the house.
pub fn rake_collected_chips(amount: u64) {
    metrics::counter!("rake_collected_chips").increment(amount);
}

pub fn player_timeouts_total() {
    metrics::counter!("player_timeouts_total").increment(1);
}

/// One increment per player whose forced cash-out the ledger refused.
pub fn unresolved_cashouts_total(count: usize) {
    metrics::counter!("unresolved_cashouts_total").increment(count as u64);
}

pub fn room_halts_total(reason: &str) {
    metrics::counter!("room_halts_total", "reason" => reason.to_string()).increment(1);
}

pub fn rooms_closed_total(walkover: bool) {
    metrics::counter!("rooms_closed_total", "walkover" => walkover.to_string()).increment(1);
}

// ============================================================================
// Event Recording
// ============================================================================

/// Update metrics for one room event.
pub fn record_event(event: &RoomEvent) {
    match event {
        RoomEvent::Snapshot(snapshot) => record_snapshot(snapshot),
        RoomEvent::HandSettled { settlement, .. } => {
            hands_settled_total(settlement.walkover);
            for award in &settlement.settlement.awards {
                pot_size_chips(award.amount);
            }
            if settlement.settlement.rake_total > 0 {
                rake_collected_chips(settlement.settlement.rake_total);
            }
        }
        RoomEvent::PlayerTimedOut { .. } => player_timeouts_total(),
        RoomEvent::RoomHalted { reason, .. } => match reason {
            HaltReason::UnresolvedCashout { player_ids } => {
                room_halts_total("unresolved_cashout");
                unresolved_cashouts_total(player_ids.len());
            }
            HaltReason::SettlementConsistency { .. } => {
                room_halts_total("settlement_consistency");
            }
        },
        RoomEvent::RoomClosed { winner, .. } => rooms_closed_total(winner.is_some()),
        RoomEvent::SeatStatusChanged { .. } => {}
    }
}

fn record_snapshot(snapshot: &RoomSnapshot) {
    let humans = snapshot
        .game
        .seats
        .iter()
        .filter(|seat| !seat.is_bot)
        .count();
    room_players(snapshot.room_id, humans);
}

/// Drain the registry observer channel into the recorder.
pub fn spawn_observer(mut events: mpsc::Receiver<RoomEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            record_event(&event);
        }
        tracing::debug!("Room event observer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdem_engine::{Action, SeatStatus};

    #[test]
    fn test_record_event_without_recorder() {
        // No recorder installed: every macro is a no-op.
        record_event(&RoomEvent::PlayerTimedOut {
            room_id: 1,
            player_id: 2,
            action: Action::Fold,
        });
        record_event(&RoomEvent::RoomHalted {
            room_id: 1,
            reason: HaltReason::UnresolvedCashout {
                player_ids: vec![2, 3],
            },
        });
        record_event(&RoomEvent::SeatStatusChanged {
            room_id: 1,
            player_id: 2,
            status: SeatStatus::WaitingForRebuy,
        });
        record_event(&RoomEvent::RoomClosed {
            room_id: 1,
            winner: Some(3),
        });
    }

    #[tokio::test]
    async fn test_observer_stops_when_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        let task = spawn_observer(rx);
        tx.send(RoomEvent::RoomClosed {
            room_id: 9,
            winner: None,
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();
    }
}
