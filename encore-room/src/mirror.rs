//! Local mirror of room state
//!
//! Every client folds incoming [`SyncEvent`]s into a [`RoomMirror`] in local
//! receipt order. Nothing here is authoritative: the mirror is a best-effort
//! view that presentation code reads from.
//!
//! Ordering for `game_update` comes from the per-sender `seq` carried in the
//! payload; an update that is not newer than the last one applied from the
//! same sender is dropped. The counter is forgotten when that sender joins or
//! leaves, and updates without a `seq` are applied as they arrive. Under [`AuthorityPolicy::DriverOnly`] updates from
//! anyone not known as a singer are dropped as well.

use encore_common::config::{AuthorityPolicy, RoomSettings};
use encore_common::events::{
    GameUpdate, Player, RoomGameState, ScoreReport, SyncEvent, SyncPayload,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const EXCITEMENT_MAX: f64 = 100.0;

/// A call as displayed by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCall {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub emoji: String,
    /// Local receive time (ms since epoch); drives expiry
    pub received_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub received_at: i64,
}

/// Fan-service request waiting for acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: Uuid,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub emoji: String,
    pub sent_at: i64,
}

/// Why an event left the mirror unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    WrongRoom,
    /// `game_update` seq not newer than the last applied from this sender
    StaleSeq,
    /// `game_update` from a non-driver under `driver_only`
    NotDriver,
    /// Duplicate request id, unknown ack or unknown leaver
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Ignored(Ignored),
}

pub struct RoomMirror {
    room_id: String,
    self_id: String,
    settings: RoomSettings,
    /// Keyed by id; BTreeMap keeps the lowest id first
    players: BTreeMap<String, Player>,
    recent_calls: VecDeque<ReceivedCall>,
    recent_messages: VecDeque<ReceivedMessage>,
    pending_requests: Vec<PendingRequest>,
    game_state: RoomGameState,
    /// Last sequenced update per sender session
    last_seq: HashMap<String, u64>,
    /// Any `game_update` applied; snapshots are ignored after that
    state_touched: bool,
    scoreboard: BTreeMap<String, ScoreReport>,
    excitement: f64,
}

impl RoomMirror {
    /// Mirror for `me` in `room_id`, seeded with `me` as the only member
    pub fn new(room_id: impl Into<String>, me: Player, settings: RoomSettings) -> Self {
        let mut players = BTreeMap::new();
        let self_id = me.id.clone();
        players.insert(me.id.clone(), me);
        Self {
            room_id: room_id.into(),
            self_id,
            settings,
            players,
            recent_calls: VecDeque::new(),
            recent_messages: VecDeque::new(),
            pending_requests: Vec::new(),
            game_state: RoomGameState::default(),
            last_seq: HashMap::new(),
            state_touched: false,
            scoreboard: BTreeMap::new(),
            excitement: 0.0,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn me(&self) -> Option<&Player> {
        self.players.get(&self.self_id)
    }

    pub fn game_state(&self) -> &RoomGameState {
        &self.game_state
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Every known member, self included
    pub fn roster(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn recent_calls(&self) -> &VecDeque<ReceivedCall> {
        &self.recent_calls
    }

    pub fn recent_messages(&self) -> &VecDeque<ReceivedMessage> {
        &self.recent_messages
    }

    pub fn pending_requests(&self) -> &[PendingRequest] {
        &self.pending_requests
    }

    pub fn scoreboard(&self) -> &BTreeMap<String, ScoreReport> {
        &self.scoreboard
    }

    /// Crowd excitement gauge, 0..=100
    pub fn excitement(&self) -> f64 {
        self.excitement
    }

    /// Lowest-id singer, if any is known
    pub fn driver_id(&self) -> Option<&str> {
        self.players
            .values()
            .find(|p| p.role.is_driver())
            .map(|p| p.id.as_str())
    }

    /// Member that answers a join from `joiner_id` with the full roster
    ///
    /// The driver if one is known, otherwise the lowest known id. The joiner
    /// itself is never chosen.
    pub fn designated_responder(&self, joiner_id: &str) -> Option<&str> {
        self.players
            .values()
            .filter(|p| p.id != joiner_id)
            .find(|p| p.role.is_driver())
            .or_else(|| self.players.values().find(|p| p.id != joiner_id))
            .map(|p| p.id.as_str())
    }

    /// Fold one event in at local time `now_ms`
    pub fn apply(&mut self, event: &SyncEvent, now_ms: i64) -> Applied {
        if event.room_id != self.room_id {
            return Applied::Ignored(Ignored::WrongRoom);
        }

        match &event.payload {
            SyncPayload::PlayerJoin(profile) => {
                let player = Player {
                    id: event.sender_id.clone(),
                    name: event.sender_name.clone(),
                    role: profile.role,
                    instrument: profile.instrument,
                };
                if self.players.insert(player.id.clone(), player).is_none() {
                    info!("{} joined room {}", event.sender_name, self.room_id);
                }
                // A rejoining sender restarts its seq counter
                self.last_seq.remove(&event.sender_id);
                Applied::Changed
            }
            SyncPayload::PlayersSync(roster) => {
                for player in &roster.players {
                    if player.id != self.self_id {
                        self.players.insert(player.id.clone(), player.clone());
                    }
                }
                if let Some(snapshot) = &roster.game_state {
                    self.adopt_snapshot(&event.sender_id, snapshot);
                }
                Applied::Changed
            }
            SyncPayload::PlayerLeave => {
                self.scoreboard.remove(&event.sender_id);
                self.last_seq.remove(&event.sender_id);
                match self.players.remove(&event.sender_id) {
                    Some(player) => {
                        info!("{} left room {}", player.name, self.room_id);
                        Applied::Changed
                    }
                    None => Applied::Ignored(Ignored::NoOp),
                }
            }
            SyncPayload::Call(call) => {
                self.recent_calls.push_back(ReceivedCall {
                    sender_id: event.sender_id.clone(),
                    sender_name: event.sender_name.clone(),
                    text: call.text.clone(),
                    emoji: call.emoji.clone(),
                    received_at: now_ms,
                });
                while self.recent_calls.len() > self.settings.max_recent_calls {
                    self.recent_calls.pop_front();
                }
                self.bump_excitement(self.settings.excitement_per_call);
                Applied::Changed
            }
            SyncPayload::Request(request) => {
                if self
                    .pending_requests
                    .iter()
                    .any(|r| r.request_id == request.request_id)
                {
                    return Applied::Ignored(Ignored::NoOp);
                }
                self.pending_requests.push(PendingRequest {
                    request_id: request.request_id,
                    sender_id: event.sender_id.clone(),
                    sender_name: event.sender_name.clone(),
                    text: request.text.clone(),
                    emoji: request.emoji.clone(),
                    sent_at: event.timestamp,
                });
                self.bump_excitement(self.settings.excitement_per_request);
                Applied::Changed
            }
            SyncPayload::RequestComplete(ack) => {
                let before = self.pending_requests.len();
                self.pending_requests
                    .retain(|r| r.request_id != ack.request_id);
                if self.pending_requests.len() == before {
                    return Applied::Ignored(Ignored::NoOp);
                }
                self.bump_excitement(self.settings.excitement_per_completed_request);
                Applied::Changed
            }
            SyncPayload::Message(message) => {
                self.recent_messages.push_back(ReceivedMessage {
                    sender_id: event.sender_id.clone(),
                    sender_name: event.sender_name.clone(),
                    text: message.text.clone(),
                    received_at: now_ms,
                });
                while self.recent_messages.len() > self.settings.max_recent_messages {
                    self.recent_messages.pop_front();
                }
                Applied::Changed
            }
            SyncPayload::GameUpdate(update) => self.apply_game_update(&event.sender_id, update),
            SyncPayload::ScoreUpdate(report) => {
                let previous = self
                    .scoreboard
                    .get(&event.sender_id)
                    .map_or(0, |r| r.score);
                let gained = report.score.saturating_sub(previous);
                self.bump_excitement(gained as f64 / self.settings.score_per_excitement);
                self.scoreboard
                    .insert(event.sender_id.clone(), report.clone());
                Applied::Changed
            }
        }
    }

    /// Drop expired calls and messages
    pub fn prune(&mut self, now_ms: i64) {
        let call_cutoff = now_ms - self.settings.call_display_ms;
        while self
            .recent_calls
            .front()
            .is_some_and(|c| c.received_at <= call_cutoff)
        {
            self.recent_calls.pop_front();
        }

        let message_cutoff = now_ms - self.settings.message_display_ms;
        while self
            .recent_messages
            .front()
            .is_some_and(|m| m.received_at <= message_cutoff)
        {
            self.recent_messages.pop_front();
        }
    }

    fn sender_may_drive(&self, sender_id: &str) -> bool {
        match self.settings.authority {
            AuthorityPolicy::Advisory => true,
            AuthorityPolicy::DriverOnly => self
                .players
                .get(sender_id)
                .is_some_and(|p| p.role.is_driver()),
        }
    }

    fn apply_game_update(&mut self, sender_id: &str, update: &GameUpdate) -> Applied {
        if !self.sender_may_drive(sender_id) {
            warn!(
                "Ignoring game_update from non-driver {} in room {}",
                sender_id, self.room_id
            );
            return Applied::Ignored(Ignored::NotDriver);
        }

        if let Some(seq) = update.seq {
            if let Some(&last) = self.last_seq.get(sender_id) {
                if seq <= last {
                    debug!(
                        "Dropping stale game_update seq {} (last {}) from {}",
                        seq, last, sender_id
                    );
                    return Applied::Ignored(Ignored::StaleSeq);
                }
            }
            self.last_seq.insert(sender_id.to_string(), seq);
        }

        self.state_touched = true;
        self.game_state.merge(update);
        debug!("Room {} phase now {}", self.room_id, self.game_state.phase);
        Applied::Changed
    }

    /// Take a roster snapshot only before any update has been applied
    fn adopt_snapshot(&mut self, sender_id: &str, snapshot: &RoomGameState) {
        if self.state_touched || !self.snapshot_trusted(sender_id) {
            return;
        }
        debug!("Adopting game state snapshot from {}", sender_id);
        self.game_state = snapshot.clone();
    }

    /// Snapshots come from the designated responder, who need not be a driver
    ///
    /// Once a driver is known only its snapshot counts, and a driver never
    /// adopts anyone else's.
    fn snapshot_trusted(&self, sender_id: &str) -> bool {
        match self.driver_id() {
            Some(driver) if driver == self.self_id => false,
            Some(driver) => driver == sender_id,
            None => true,
        }
    }

    fn bump_excitement(&mut self, amount: f64) {
        self.excitement = (self.excitement + amount).clamp(0.0, EXCITEMENT_MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_common::events::{
        CallPayload, GamePhase, Instrument, MessagePayload, PlayerProfile, RequestAck,
        RequestPayload, Role, RosterPayload,
    };

    fn player(id: &str, role: Role) -> Player {
        Player {
            id: id.into(),
            name: id.to_uppercase(),
            role,
            instrument: None,
        }
    }

    fn event(sender: &str, payload: SyncPayload) -> SyncEvent {
        SyncEvent {
            room_id: "R".into(),
            sender_id: sender.into(),
            sender_name: sender.to_uppercase(),
            payload,
            timestamp: 0,
        }
    }

    fn join(sender: &str, role: Role) -> SyncEvent {
        event(
            sender,
            SyncPayload::PlayerJoin(PlayerProfile {
                role,
                instrument: None,
            }),
        )
    }

    fn mirror() -> RoomMirror {
        RoomMirror::new("R", player("me", Role::Band), RoomSettings::default())
    }

    #[test]
    fn test_join_and_leave_track_members() {
        let mut m = mirror();
        m.apply(&join("s", Role::Singer), 0);
        assert_eq!(m.player_count(), 2);
        assert_eq!(m.driver_id(), Some("s"));

        assert_eq!(m.apply(&event("s", SyncPayload::PlayerLeave), 0), Applied::Changed);
        assert_eq!(
            m.apply(&event("s", SyncPayload::PlayerLeave), 0),
            Applied::Ignored(Ignored::NoOp)
        );
        assert_eq!(m.driver_id(), None);
    }

    #[test]
    fn test_wrong_room_is_ignored() {
        let mut m = mirror();
        let mut e = join("x", Role::Band);
        e.room_id = "OTHER".into();
        assert_eq!(m.apply(&e, 0), Applied::Ignored(Ignored::WrongRoom));
        assert_eq!(m.player_count(), 1);
    }

    #[test]
    fn test_roster_sync_never_overwrites_self() {
        let mut m = mirror();
        let mut impostor = player("me", Role::Audience);
        impostor.instrument = Some(Instrument::Bass);
        m.apply(
            &event(
                "a",
                SyncPayload::PlayersSync(RosterPayload {
                    players: vec![player("a", Role::Audience), impostor],
                    game_state: None,
                }),
            ),
            0,
        );
        assert_eq!(m.player_count(), 2);
        assert_eq!(m.me().unwrap().role, Role::Band);
    }

    #[test]
    fn test_designated_responder_prefers_driver_then_lowest_id() {
        let mut m = mirror();
        m.apply(&join("b", Role::Audience), 0);
        assert_eq!(m.designated_responder("z"), Some("b"));

        m.apply(&join("z", Role::Band), 0);
        m.apply(&join("s", Role::Singer), 0);
        assert_eq!(m.designated_responder("z"), Some("s"));
        // A joining singer does not answer itself
        assert_eq!(m.designated_responder("s"), Some("b"));
    }

    #[test]
    fn test_calls_are_bounded_and_expire() {
        let mut m = mirror();
        for i in 0..12 {
            m.apply(
                &event(
                    "a",
                    SyncPayload::Call(CallPayload {
                        text: format!("c{}", i),
                        emoji: "🎉".into(),
                    }),
                ),
                1_000 + i,
            );
        }
        assert_eq!(m.recent_calls().len(), 10);
        assert_eq!(m.recent_calls().front().unwrap().text, "c2");

        m.prune(1_000 + 3_005);
        assert_eq!(m.recent_calls().len(), 6);
        m.prune(10_000);
        assert!(m.recent_calls().is_empty());
    }

    #[test]
    fn test_messages_are_bounded_and_expire() {
        let mut m = mirror();
        for i in 0..25 {
            m.apply(
                &event("a", SyncPayload::Message(MessagePayload { text: i.to_string() })),
                0,
            );
        }
        assert_eq!(m.recent_messages().len(), 20);
        m.prune(8_000);
        assert!(m.recent_messages().is_empty());
    }

    #[test]
    fn test_requests_persist_until_acknowledged() {
        let mut m = mirror();
        let id = Uuid::new_v4();
        let request = event(
            "a",
            SyncPayload::Request(RequestPayload {
                request_id: id,
                text: "Wave!".into(),
                emoji: "👋".into(),
            }),
        );
        m.apply(&request, 0);
        assert_eq!(m.apply(&request, 0), Applied::Ignored(Ignored::NoOp));
        m.prune(1_000_000);
        assert_eq!(m.pending_requests().len(), 1);

        let ack = event("s", SyncPayload::RequestComplete(RequestAck { request_id: id }));
        assert_eq!(m.apply(&ack, 0), Applied::Changed);
        assert!(m.pending_requests().is_empty());
        assert_eq!(m.excitement(), 15.0);
    }

    #[test]
    fn test_driver_only_rejects_band_updates() {
        let mut m = mirror();
        m.apply(&join("b", Role::Band), 0);
        let update = event("b", SyncPayload::GameUpdate(GameUpdate::phase(GamePhase::Ready).with_seq(1)));
        assert_eq!(m.apply(&update, 0), Applied::Ignored(Ignored::NotDriver));
        assert_eq!(m.game_state().phase, GamePhase::SongSelect);
    }

    #[test]
    fn test_advisory_accepts_any_sender() {
        let settings = RoomSettings {
            authority: AuthorityPolicy::Advisory,
            ..Default::default()
        };
        let mut m = RoomMirror::new("R", player("me", Role::Band), settings);
        let update = event("x", SyncPayload::GameUpdate(GameUpdate::phase(GamePhase::Ready).with_seq(1)));
        assert_eq!(m.apply(&update, 0), Applied::Changed);
    }

    #[test]
    fn test_stale_seq_is_dropped() {
        let mut m = mirror();
        m.apply(&join("s", Role::Singer), 0);

        let ready = GameUpdate {
            seq: Some(2),
            phase: Some(GamePhase::Ready),
            current_song_id: Some("song".into()),
            scheduled_start_time: None,
        };
        m.apply(&event("s", SyncPayload::GameUpdate(ready)), 0);

        let late = event("s", SyncPayload::GameUpdate(GameUpdate::phase(GamePhase::SongSelect).with_seq(1)));
        assert_eq!(m.apply(&late, 0), Applied::Ignored(Ignored::StaleSeq));
        assert_eq!(m.game_state().phase, GamePhase::Ready);
        assert_eq!(m.game_state().current_song_id.as_deref(), Some("song"));
    }

    #[test]
    fn test_unsequenced_updates_apply_in_receipt_order() {
        let mut m = mirror();
        m.apply(&join("s", Role::Singer), 0);
        let wire = [
            r#"{"type":"game_update","roomId":"R","playerId":"s","playerName":"S",
                "data":{"phase":"ready","currentSongId":"a"},"timestamp":1}"#,
            r#"{"type":"game_update","roomId":"R","playerId":"s","playerName":"S",
                "data":{"phase":"countdown","scheduledStartTime":99999},"timestamp":2}"#,
        ];
        for json in wire {
            let e = SyncEvent::from_json(json).unwrap();
            assert_eq!(m.apply(&e, 0), Applied::Changed);
        }

        assert_eq!(m.game_state().phase, GamePhase::Countdown);
        assert_eq!(m.game_state().current_song_id.as_deref(), Some("a"));
        assert_eq!(m.game_state().countdown_remaining_ms(99_000), Some(999));
    }

    #[test]
    fn test_rejoin_resets_sender_seq() {
        let mut m = mirror();
        m.apply(&join("s", Role::Singer), 0);
        let first = GameUpdate {
            seq: Some(2),
            phase: Some(GamePhase::Ready),
            current_song_id: Some("a".into()),
            scheduled_start_time: None,
        };
        m.apply(&event("s", SyncPayload::GameUpdate(first)), 0);

        m.apply(&event("s", SyncPayload::PlayerLeave), 0);
        m.apply(&join("s", Role::Singer), 0);
        let fresh = GameUpdate {
            seq: Some(1),
            phase: Some(GamePhase::Ready),
            current_song_id: Some("b".into()),
            scheduled_start_time: None,
        };
        assert_eq!(
            m.apply(&event("s", SyncPayload::GameUpdate(fresh)), 0),
            Applied::Changed
        );
        assert_eq!(m.game_state().current_song_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_snapshot_adopted_only_before_first_update() {
        let mut m = mirror();
        m.apply(&join("s", Role::Singer), 0);
        let snapshot = RoomGameState {
            phase: GamePhase::Ready,
            current_song_id: Some("a".into()),
            scheduled_start_time: None,
        };
        let sync = event(
            "s",
            SyncPayload::PlayersSync(RosterPayload {
                players: vec![player("s", Role::Singer)],
                game_state: Some(snapshot.clone()),
            }),
        );
        m.apply(&sync, 0);
        assert_eq!(m.game_state(), &snapshot);

        m.apply(&event("s", SyncPayload::GameUpdate(GameUpdate::phase(GamePhase::SongSelect).with_seq(3))), 0);
        m.apply(&sync, 0);
        assert_eq!(m.game_state().phase, GamePhase::SongSelect);
    }

    #[test]
    fn test_score_updates_feed_excitement_by_delta() {
        let mut m = mirror();
        let report = |score| {
            event(
                "b",
                SyncPayload::ScoreUpdate(ScoreReport {
                    score,
                    combo: 3,
                    instrument: Some(Instrument::Drums),
                }),
            )
        };
        m.apply(&report(200), 0);
        assert_eq!(m.excitement(), 20.0);
        m.apply(&report(250), 0);
        assert_eq!(m.excitement(), 25.0);
        m.apply(&report(100_000), 0);
        assert_eq!(m.excitement(), EXCITEMENT_MAX);
        assert_eq!(m.scoreboard().get("b").unwrap().score, 100_000);
    }
}
