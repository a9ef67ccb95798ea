//! Per-room event bus
//!
//! Thin wrapper over `tokio::sync::broadcast` scoped to one room id.

use super::SyncEvent;
use tokio::sync::broadcast;

/// Event distribution bus for one room
///
/// The RoomBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block senders)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Delivery is at-most-once: a subscriber only sees events sent after it
/// subscribed, and one that falls more than `capacity` events behind loses
/// the overflow.
///
/// # Examples
///
/// ```
/// use encore_common::events::{RoomBus, SyncEvent, SyncPayload, MessagePayload};
///
/// let bus = RoomBus::new("AB12CD", 64);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SyncEvent::new(
///     "AB12CD",
///     "p-1",
///     "Miku",
///     SyncPayload::Message(MessagePayload { text: "hello".into() }),
/// ));
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.sender_name, "Miku");
/// ```
#[derive(Clone)]
pub struct RoomBus {
    room_id: String,
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl RoomBus {
    /// Creates a new bus for `room_id` with the given channel capacity
    pub fn new(room_id: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            room_id: room_id.into(),
            tx,
            capacity: capacity.max(1),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sender half, for transports that hand out their own handles
    pub fn sender(&self) -> broadcast::Sender<SyncEvent> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CallPayload, SyncPayload};

    fn call(sender: &str) -> SyncEvent {
        SyncEvent::new(
            "ROOM",
            sender,
            sender,
            SyncPayload::Call(CallPayload {
                text: "Yeah!".into(),
                emoji: "🎉".into(),
            }),
        )
    }

    #[test]
    fn test_roombus_new() {
        let bus = RoomBus::new("ROOM", 100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.room_id(), "ROOM");
    }

    #[test]
    fn test_roombus_zero_capacity_is_bumped() {
        let bus = RoomBus::new("ROOM", 0);
        assert_eq!(bus.capacity(), 1);
    }

    #[test]
    fn test_roombus_emit_without_subscribers_errors() {
        let bus = RoomBus::new("ROOM", 10);
        assert!(bus.emit(call("a")).is_err());
    }

    #[test]
    fn test_roombus_multiple_subscribers() {
        let bus = RoomBus::new("ROOM", 10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(call("a")).expect("emit should succeed"), 2);

        assert_eq!(rx1.try_recv().unwrap().sender_id, "a");
        assert_eq!(rx2.try_recv().unwrap().sender_id, "a");
    }

    #[test]
    fn test_roombus_late_subscriber_misses_earlier_events() {
        let bus = RoomBus::new("ROOM", 10);
        let _early = bus.subscribe();
        bus.emit_lossy(call("a"));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_roombus_lagging_subscriber_loses_overflow() {
        let bus = RoomBus::new("ROOM", 2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.emit_lossy(call(&format!("p{}", i)));
        }

        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("Expected lag, got {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap().sender_id, "p3");
    }
}
