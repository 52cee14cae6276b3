//! Room registry for spawning and tracking room actors.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{RwLock, mpsc},
    task::JoinHandle,
};

use super::{
    actor::{RoomActor, RoomHandle},
    config::RoomConfig,
    errors::{RoomError, RoomResult},
    messages::{RoomEvent, RoomSummary},
};
use crate::{game::entities::RoomId, ledger::Ledger};

/// Capacity of the per-room channel feeding the observer.
const OBSERVER_CAPACITY: usize = 1024;

/// Rooms with no humans are closed after this long.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

/// Registry of running rooms
#[derive(Clone)]
pub struct RoomRegistry {
    ledger: Arc<dyn Ledger>,

    /// Active room handles
    rooms: Arc<RwLock<HashMap<RoomId, RoomHandle>>>,

    next_room_id: Arc<RwLock<RoomId>>,
    default_config: RoomConfig,
    idle_ttl: Duration,

    /// Receives every room's public events (metrics, audit trail)
    observer: Option<mpsc::Sender<RoomEvent>>,
}

impl RoomRegistry {
    pub fn new(ledger: Arc<dyn Ledger>, default_config: RoomConfig) -> Self {
        Self {
            ledger,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            next_room_id: Arc::new(RwLock::new(1)),
            default_config,
            idle_ttl: DEFAULT_IDLE_TTL,
            observer: None,
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn with_observer(mut self, observer: mpsc::Sender<RoomEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn default_config(&self) -> &RoomConfig {
        &self.default_config
    }

    /// Validate `config` and spawn a room for it.
    pub async fn create_room(&self, config: RoomConfig) -> RoomResult<RoomId> {
        config.validate().map_err(RoomError::InvalidConfig)?;

        let room_id = {
            let mut next_id = self.next_room_id.write().await;
            let id = *next_id;
            *next_id += 1;
            id
        };

        let name = config.name.clone();
        let (actor, handle) = RoomActor::new(room_id, config, self.ledger.clone());
        tokio::spawn(actor.run());

        if let Some(observer) = &self.observer {
            self.attach_observer(&handle, observer.clone()).await;
        }

        self.rooms.write().await.insert(room_id, handle);
        log::info!("Created room {} ('{}')", room_id, name);
        Ok(room_id)
    }

    async fn attach_observer(&self, handle: &RoomHandle, observer: mpsc::Sender<RoomEvent>) {
        match handle.subscribe(None, OBSERVER_CAPACITY).await {
            Ok(mut subscription) => {
                tokio::spawn(async move {
                    while let Some(event) = subscription.events.recv().await {
                        if observer.send(event).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(err) => log::warn!(
                "Could not observe room {}: {}",
                handle.room_id(),
                err
            ),
        }
    }

    pub async fn get(&self, room_id: RoomId) -> RoomResult<RoomHandle> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::RoomNotFound(room_id))
    }

    /// Return the first open room, creating one from the default config when
    /// none exists.
    pub async fn get_or_create(&self) -> RoomResult<RoomHandle> {
        let existing = {
            let rooms = self.rooms.read().await;
            let mut ids: Vec<&RoomId> = rooms.keys().collect();
            ids.sort();
            ids.into_iter()
                .filter_map(|id| rooms.get(id))
                .find(|handle| !handle.is_closed())
                .cloned()
        };
        if let Some(handle) = existing {
            return Ok(handle);
        }
        let room_id = self.create_room(self.default_config.clone()).await?;
        self.get(room_id).await
    }

    /// Summaries of every live room, ordered by id.
    pub async fn list(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(summary) = handle.summary().await {
                summaries.push(summary);
            }
        }
        summaries.sort_by_key(|summary| summary.room_id);
        summaries
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Close a room and drop it from the registry.
    pub async fn destroy(&self, room_id: RoomId) -> RoomResult<()> {
        let handle = self.get(room_id).await?;
        let result = handle.close().await;
        if handle.is_closed() || result.is_ok() {
            self.rooms.write().await.remove(&room_id);
            log::info!("Destroyed room {}", room_id);
        }
        match result {
            Err(RoomError::RoomClosed) => Ok(()),
            other => other,
        }
    }

    /// Drop stopped rooms and close rooms that sat without humans for the
    /// idle TTL. Returns the ids removed.
    pub async fn sweep(&self) -> Vec<RoomId> {
        let handles: Vec<(RoomId, RoomHandle)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        let mut removed = Vec::new();
        for (room_id, handle) in handles {
            if handle.is_closed() {
                removed.push(room_id);
                continue;
            }
            let Ok(summary) = handle.summary().await else {
                removed.push(room_id);
                continue;
            };
            let idle = summary
                .idle_ms
                .is_some_and(|ms| Duration::from_millis(ms) >= self.idle_ttl);
            if summary.humans == 0 && idle {
                log::info!("Closing idle room {}", room_id);
                match handle.close().await {
                    Ok(()) | Err(RoomError::RoomClosed) => removed.push(room_id),
                    Err(err) => log::warn!("Idle room {} did not close: {}", room_id, err),
                }
            }
        }

        if !removed.is_empty() {
            let mut rooms = self.rooms.write().await;
            for room_id in &removed {
                rooms.remove(room_id);
            }
        }
        removed
    }

    /// Run [`RoomRegistry::sweep`] on a fixed interval.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = registry.sweep().await;
                if !removed.is_empty() {
                    log::debug!("Sweeper removed rooms {:?}", removed);
                }
            }
        })
    }

    /// Close every room, cashing out all seats.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(RoomId, RoomHandle)> = self.rooms.write().await.drain().collect();
        for (room_id, handle) in handles {
            if let Err(err) = handle.close().await {
                log::warn!("Room {} shutdown: {}", room_id, err);
            }
        }
        log::info!("All rooms closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn registry() -> RoomRegistry {
        let ledger = Arc::new(InMemoryLedger::with_balances([(1, 10_000), (2, 10_000)]));
        RoomRegistry::new(ledger, RoomConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let registry = registry();
        let room_id = registry.create_room(RoomConfig::default()).await.unwrap();
        assert_eq!(room_id, 1);
        let handle = registry.get(room_id).await.unwrap();
        assert_eq!(handle.room_id(), 1);
        assert!(matches!(
            registry.get(99).await,
            Err(RoomError::RoomNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let registry = registry();
        let config = RoomConfig {
            big_blind: 5,
            small_blind: 10,
            ..RoomConfig::default()
        };
        assert!(matches!(
            registry.create_room(config).await,
            Err(RoomError::InvalidConfig(_))
        ));
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_room() {
        let registry = registry();
        let first = registry.get_or_create().await.unwrap();
        let second = registry.get_or_create().await.unwrap();
        assert_eq!(first.room_id(), second.room_id());
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let registry = registry();
        registry.create_room(RoomConfig::default()).await.unwrap();
        registry
            .create_room(RoomConfig {
                name: "High Stakes".to_string(),
                small_blind: 50,
                big_blind: 100,
                ..RoomConfig::default()
            })
            .await
            .unwrap();
        let rooms = registry.list().await;
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[1].name, "High Stakes");
        assert_eq!(rooms[1].big_blind, 100);
    }

    #[tokio::test]
    async fn test_destroy_room() {
        let registry = registry();
        let room_id = registry.create_room(RoomConfig::default()).await.unwrap();
        registry.destroy(room_id).await.unwrap();
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_closes_idle_rooms() {
        let registry = registry().with_idle_ttl(Duration::from_secs(60));
        let room_id = registry.create_room(RoomConfig::default()).await.unwrap();
        assert!(registry.sweep().await.is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.sweep().await, vec![room_id]);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_rooms_with_humans() {
        let registry = registry().with_idle_ttl(Duration::from_secs(60));
        let room_id = registry.create_room(RoomConfig::default()).await.unwrap();
        let handle = registry.get(room_id).await.unwrap();
        handle.join(1, "alice", 1_000).await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(registry.sweep().await.is_empty());
    }
}
