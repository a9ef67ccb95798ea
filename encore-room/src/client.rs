//! Room client
//!
//! A [`RoomClient`] owns one channel handle and one [`RoomMirror`]. It is
//! driven by a single task: outgoing actions are applied to the local mirror
//! immediately and broadcast, incoming events from other members are folded
//! in as they are received. The client's own echoes are filtered out.
//!
//! Joining announces `player_join`; every member answers with
//! `players_sync`, the designated responder with the full roster and its game
//! state. Dropping the client always sends `player_leave` and releases the
//! channel.

use crate::channel::{ChannelHandle, Transport};
use crate::error::{Result, RoomError};
use crate::mirror::{Applied, Ignored, RoomMirror};
use encore_common::config::RoomSettings;
use encore_common::events::{
    CallPayload, GameUpdate, MessagePayload, Player, PlayerProfile, RequestAck, RequestPayload,
    RosterPayload, ScoreReport, SyncEvent, SyncPayload,
};
use encore_common::{time, uuid_utils};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the run loop expires calls and messages
const PRUNE_INTERVAL: Duration = Duration::from_millis(250);

pub struct RoomClient {
    me: Player,
    room_id: String,
    channel: Option<ChannelHandle>,
    mirror: RoomMirror,
    /// Last `game_update` seq sent since this session's join
    seq: u64,
}

impl RoomClient {
    /// Join `room_id` as `me`
    ///
    /// Never fails: if the channel cannot be opened the client is returned
    /// disconnected and every send reports [`RoomError::NotConnected`].
    pub async fn join<T: Transport>(
        transport: &T,
        room_id: &str,
        me: Player,
        settings: RoomSettings,
    ) -> Self {
        let mirror = RoomMirror::new(room_id, me.clone(), settings);
        let mut client = Self {
            me,
            room_id: room_id.to_string(),
            channel: None,
            mirror,
            seq: 0,
        };
        if let Err(e) = client.reconnect(transport).await {
            warn!("{} could not join room {}: {}", client.me.name, room_id, e);
        }
        client
    }

    /// Open the channel (if closed) and announce this member
    ///
    /// Retry policy is left to the caller.
    pub async fn reconnect<T: Transport>(&mut self, transport: &T) -> Result<()> {
        if self.channel.is_some() {
            return Ok(());
        }
        self.channel = Some(transport.connect(&self.room_id).await?);
        // Peers forget our seq when they see the join
        self.seq = 0;
        info!(
            "{} joined room {} as {}",
            self.me.name, self.room_id, self.me.role
        );
        self.broadcast(SyncPayload::PlayerJoin(PlayerProfile {
            role: self.me.role,
            instrument: self.me.instrument,
        }))?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn me(&self) -> &Player {
        &self.me
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn mirror(&self) -> &RoomMirror {
        &self.mirror
    }

    /// Announce departure and release the channel
    pub fn leave(&mut self) {
        if self.channel.is_some() {
            let _ = self.broadcast(SyncPayload::PlayerLeave);
            self.channel = None;
            info!("{} left room {}", self.me.name, self.room_id);
        }
    }

    pub fn send_call(&mut self, call: CallPayload) -> Result<()> {
        self.publish(SyncPayload::Call(call))
    }

    /// Post a fan-service request; returns its id for later acknowledgment
    pub fn send_request(&mut self, text: &str, emoji: &str) -> Result<Uuid> {
        let request_id = uuid_utils::generate();
        self.publish(SyncPayload::Request(RequestPayload {
            request_id,
            text: text.to_string(),
            emoji: emoji.to_string(),
        }))?;
        Ok(request_id)
    }

    /// Acknowledge a pending request for every member
    pub fn complete_request(&mut self, request_id: Uuid) -> Result<()> {
        self.publish(SyncPayload::RequestComplete(RequestAck { request_id }))
    }

    pub fn send_message(&mut self, text: &str) -> Result<()> {
        self.publish(SyncPayload::Message(MessagePayload {
            text: text.to_string(),
        }))
    }

    pub fn send_score(&mut self, report: ScoreReport) -> Result<()> {
        self.publish(SyncPayload::ScoreUpdate(report))
    }

    /// Stamp the next seq on `update`, apply it locally and broadcast it
    ///
    /// Under `driver_only` a non-driver's update is refused locally and
    /// nothing is sent.
    pub fn send_game_update(&mut self, mut update: GameUpdate) -> Result<GameUpdate> {
        self.channel_checked()?;
        let seq = self.seq + 1;
        update.seq = Some(seq);
        let event = self.event(SyncPayload::GameUpdate(update.clone()));

        match self.mirror.apply(&event, time::now_ms()) {
            Applied::Ignored(Ignored::NotDriver) => {
                return Err(RoomError::NotDriver(self.me.id.clone()));
            }
            Applied::Ignored(reason) => debug!("Own game_update ignored locally: {:?}", reason),
            Applied::Changed => {}
        }

        self.seq = seq;
        self.broadcast_event(event)?;
        Ok(update)
    }

    /// Drain every event already delivered and expire stale buffers
    pub fn poll(&mut self, now_ms: i64) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.channel.as_mut().and_then(|c| c.try_recv()) {
            if let Some(event) = self.handle_incoming(event, now_ms) {
                events.push(event);
            }
        }
        self.mirror.prune(now_ms);
        events
    }

    /// Wait for the next event from another member
    ///
    /// Returns `None` when disconnected or the channel closes.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        loop {
            let event = self.channel.as_mut()?.recv().await;
            match event {
                Some(event) => {
                    if let Some(event) = self.handle_incoming(event, time::now_ms()) {
                        return Some(event);
                    }
                }
                None => {
                    warn!("Room {} channel closed", self.room_id);
                    self.channel = None;
                    return None;
                }
            }
        }
    }

    /// Dispatch events to `on_event` until `cancel` fires or the channel closes
    ///
    /// Leaves the room on exit.
    pub async fn run_until_cancelled<F>(&mut self, cancel: &CancellationToken, mut on_event: F)
    where
        F: FnMut(&SyncEvent, &RoomMirror),
    {
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        while self.is_connected() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = prune.tick() => self.mirror.prune(time::now_ms()),
                event = self.next_event() => match event {
                    Some(event) => on_event(&event, &self.mirror),
                    None => break,
                },
            }
        }
        self.leave();
    }

    fn handle_incoming(&mut self, event: SyncEvent, now_ms: i64) -> Option<SyncEvent> {
        if event.sender_id == self.me.id {
            return None;
        }
        self.mirror.apply(&event, now_ms);

        if let SyncPayload::PlayerJoin(_) = &event.payload {
            self.answer_join(&event.sender_id);
        }
        Some(event)
    }

    fn answer_join(&mut self, joiner_id: &str) {
        let full = self.mirror.designated_responder(joiner_id) == Some(self.me.id.as_str());
        let roster = if full {
            RosterPayload {
                players: self
                    .mirror
                    .roster()
                    .into_iter()
                    .filter(|p| p.id != joiner_id)
                    .collect(),
                game_state: Some(self.mirror.game_state().clone()),
            }
        } else {
            RosterPayload {
                players: vec![self.me.clone()],
                game_state: None,
            }
        };
        debug!(
            "{} answering join from {} ({} players)",
            self.me.name,
            joiner_id,
            roster.players.len()
        );
        if let Err(e) = self.broadcast(SyncPayload::PlayersSync(roster)) {
            warn!("Roster reply failed: {}", e);
        }
    }

    fn event(&self, payload: SyncPayload) -> SyncEvent {
        SyncEvent::new(&self.room_id, &self.me.id, &self.me.name, payload)
    }

    fn channel_checked(&self) -> Result<&ChannelHandle> {
        self.channel
            .as_ref()
            .ok_or_else(|| RoomError::NotConnected(self.room_id.clone()))
    }

    /// Send without touching the local mirror
    fn broadcast(&self, payload: SyncPayload) -> Result<()> {
        let channel = self.channel_checked()?;
        channel.send(self.event(payload));
        Ok(())
    }

    /// Apply locally, then send
    fn publish(&mut self, payload: SyncPayload) -> Result<()> {
        self.channel_checked()?;
        let event = self.event(payload);
        self.mirror.apply(&event, time::now_ms());
        self.broadcast_event(event)
    }

    fn broadcast_event(&self, event: SyncEvent) -> Result<()> {
        self.channel_checked()?.send(event);
        Ok(())
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.leave();
    }
}
