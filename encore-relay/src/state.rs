//! Relay registry
//!
//! One [`RoomBus`] per room, created on first use, plus a roster per room
//! kept from the events flowing through. The roster is what a client can
//! fetch before joining; it is never used to filter or reorder events.

use encore_common::events::{Player, RoomBus, SyncEvent, SyncPayload};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

pub struct RelayState {
    rooms: RwLock<HashMap<String, RoomBus>>,
    rosters: RwLock<HashMap<String, BTreeMap<String, Player>>>,
    capacity: usize,
}

impl RelayState {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            rosters: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    async fn bus(&self, room_id: &str) -> RoomBus {
        if let Some(bus) = self.rooms.read().await.get(room_id) {
            return bus.clone();
        }
        self.rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_insert_with(|| {
                info!("Opening room {}", room_id);
                RoomBus::new(room_id, self.capacity)
            })
            .clone()
    }

    /// Subscribe to all future events of `room_id`
    pub async fn subscribe(&self, room_id: &str) -> broadcast::Receiver<SyncEvent> {
        self.bus(room_id).await.subscribe()
    }

    /// Record roster changes, then fan the event out
    ///
    /// Returns the number of subscribers it was delivered to.
    pub async fn publish(&self, event: SyncEvent) -> usize {
        self.track_roster(&event).await;
        let bus = self.bus(&event.room_id).await;
        match bus.emit(event) {
            Ok(count) => count,
            Err(_) => {
                debug!("No subscribers in room {}", bus.room_id());
                0
            }
        }
    }

    /// Known members of `room_id`, ordered by id
    pub async fn players(&self, room_id: &str) -> Vec<Player> {
        self.rosters
            .read()
            .await
            .get(room_id)
            .map(|roster| roster.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, |bus| bus.subscriber_count())
    }

    /// Forget rooms with no subscribers and no known members
    pub async fn prune_idle(&self) -> usize {
        let rosters = self.rosters.read().await;
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|id, bus| bus.subscriber_count() > 0 || rosters.contains_key(id));
        before - rooms.len()
    }

    /// Close `room_id` once its last subscriber is gone
    ///
    /// The roster goes with it: members that never posted a leave are not
    /// listening anymore either. Returns whether the room was closed.
    pub async fn release(&self, room_id: &str) -> bool {
        let mut rosters = self.rosters.write().await;
        let mut rooms = self.rooms.write().await;
        match rooms.get(room_id) {
            Some(bus) if bus.subscriber_count() == 0 => {
                rooms.remove(room_id);
                if let Some(roster) = rosters.remove(room_id) {
                    debug!("Dropping {} stale members of room {}", roster.len(), room_id);
                }
                info!("Closing room {}", room_id);
                true
            }
            _ => false,
        }
    }

    async fn track_roster(&self, event: &SyncEvent) {
        let mut rosters = self.rosters.write().await;
        match &event.payload {
            SyncPayload::PlayerJoin(profile) => {
                rosters.entry(event.room_id.clone()).or_default().insert(
                    event.sender_id.clone(),
                    Player {
                        id: event.sender_id.clone(),
                        name: event.sender_name.clone(),
                        role: profile.role,
                        instrument: profile.instrument,
                    },
                );
            }
            SyncPayload::PlayersSync(roster) => {
                let entry = rosters.entry(event.room_id.clone()).or_default();
                for player in &roster.players {
                    entry.insert(player.id.clone(), player.clone());
                }
            }
            SyncPayload::PlayerLeave => {
                if let Some(roster) = rosters.get_mut(&event.room_id) {
                    roster.remove(&event.sender_id);
                    if roster.is_empty() {
                        rosters.remove(&event.room_id);
                    }
                }
            }
            _ => {}
        }
    }
}
