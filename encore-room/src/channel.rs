//! Room sync channel
//!
//! A [`Transport`] hands out [`ChannelHandle`]s scoped to one room id. The
//! handle is an explicitly owned resource: it is opened by `connect`, events
//! flow through `send`/`recv`, and dropping it unsubscribes. [`LocalHub`]
//! keeps rooms in process; [`crate::relay::RelayTransport`] goes through an
//! encore relay.
//!
//! Delivery is at-most-once with no retry, acknowledgment or persistence. A
//! handle only sees events sent after it connected, and a handle that falls
//! more than the channel capacity behind loses the overflow.

use encore_common::events::{RoomBus, SyncEvent};
use encore_common::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::DropGuard;
use tracing::{debug, info, warn};

/// Opens room channels
pub trait Transport: Send + Sync {
    /// Subscribe to `room_id`
    ///
    /// # Errors
    ///
    /// [`Error::ChannelUnavailable`] if the channel cannot be established.
    fn connect(&self, room_id: &str) -> impl Future<Output = Result<ChannelHandle>> + Send;
}

/// Where a handle's outgoing events go
enum Outbound {
    /// Shared in-process bus; the sender hears itself too
    Bus(broadcast::Sender<SyncEvent>),
    /// Drained by a task that forwards to a remote relay
    Queue(mpsc::UnboundedSender<SyncEvent>),
}

/// Live subscription to one room
pub struct ChannelHandle {
    room_id: String,
    outbound: Outbound,
    rx: broadcast::Receiver<SyncEvent>,
    /// Stops the inbound pump of a remote channel
    _stop: Option<DropGuard>,
}

impl ChannelHandle {
    pub fn new(room_id: impl Into<String>, tx: broadcast::Sender<SyncEvent>) -> Self {
        let rx = tx.subscribe();
        Self {
            room_id: room_id.into(),
            outbound: Outbound::Bus(tx),
            rx,
            _stop: None,
        }
    }

    /// Handle over a remote channel
    ///
    /// Incoming events arrive on `rx`, outgoing ones are queued on `outbound`.
    /// Dropping the handle fires `stop`.
    pub(crate) fn remote(
        room_id: impl Into<String>,
        rx: broadcast::Receiver<SyncEvent>,
        outbound: mpsc::UnboundedSender<SyncEvent>,
        stop: DropGuard,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            outbound: Outbound::Queue(outbound),
            rx,
            _stop: Some(stop),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Broadcast to every subscriber (including this handle)
    ///
    /// Returns how many subscribers the event reached locally. A remote
    /// channel only queues the event, so it reports 1 once queued.
    pub fn send(&self, event: SyncEvent) -> usize {
        match &self.outbound {
            Outbound::Bus(tx) => tx.send(event).unwrap_or(0),
            Outbound::Queue(queue) => match queue.send(event) {
                Ok(()) => 1,
                Err(_) => {
                    warn!("Room {} relay uplink is gone", self.room_id);
                    0
                }
            },
        }
    }

    /// Wait for the next event
    ///
    /// Lag is logged and skipped. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Room {} subscriber lagged, {} events lost", self.room_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event, without waiting
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Room {} subscriber lagged, {} events lost", self.room_id, n);
                }
                Err(_) => return None,
            }
        }
    }
}

/// In-process transport: one broadcast bus per room
///
/// Cloning shares the same set of rooms. After [`LocalHub::shutdown`] every
/// new `connect` fails with `ChannelUnavailable`.
#[derive(Clone)]
pub struct LocalHub {
    rooms: Arc<RwLock<HashMap<String, RoomBus>>>,
    capacity: usize,
    open: Arc<AtomicBool>,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop accepting connections and forget all rooms
    pub async fn shutdown(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.rooms.write().await.clear();
        info!("Local hub shut down");
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
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

    /// Drop buses nobody is listening to
    pub async fn prune_empty(&self) -> usize {
        retain_live(&mut *self.rooms.write().await, None)
    }
}

fn retain_live(rooms: &mut HashMap<String, RoomBus>, keep: Option<&str>) -> usize {
    let before = rooms.len();
    rooms.retain(|id, bus| keep == Some(id.as_str()) || bus.subscriber_count() > 0);
    let pruned = before - rooms.len();
    if pruned > 0 {
        debug!("Pruned {} empty room buses", pruned);
    }
    pruned
}

impl Transport for LocalHub {
    async fn connect(&self, room_id: &str) -> Result<ChannelHandle> {
        if !self.is_open() {
            return Err(Error::ChannelUnavailable(format!(
                "hub closed, cannot join {}",
                room_id
            )));
        }
        if room_id.is_empty() {
            return Err(Error::InvalidInput("room id must not be empty".to_string()));
        }

        let mut rooms = self.rooms.write().await;
        retain_live(&mut rooms, Some(room_id));
        let bus = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!("Opening room bus {}", room_id);
                RoomBus::new(room_id, self.capacity)
            });
        Ok(ChannelHandle::new(room_id, bus.sender()))
    }
}
