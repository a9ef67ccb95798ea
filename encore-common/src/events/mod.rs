//! Sync event types for the encore room protocol
//!
//! Provides the typed SyncEvent model, its JSON wire envelope and the
//! per-room event bus.
//!
//! On the wire every event is a flat envelope:
//!
//! ```json
//! {"type":"call","roomId":"AB12CD","playerId":"…","playerName":"Miku",
//!  "data":{"text":"Yeah!","emoji":"🎉"},"timestamp":1700000000000}
//! ```
//!
//! In code the `data` map is never inspected ad hoc: the envelope is decoded
//! into a [`SyncPayload`] variant carrying its own strongly-typed payload.

mod bus;
mod room_types;

pub use bus::RoomBus;
pub use room_types::{Difficulty, GamePhase, Instrument, Player, Role, RoomGameState};

use crate::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tag as it appears in the `type` field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    PlayerJoin,
    PlayersSync,
    PlayerLeave,
    Call,
    Request,
    RequestComplete,
    Message,
    GameUpdate,
    ScoreUpdate,
}

impl SyncEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventType::PlayerJoin => "player_join",
            SyncEventType::PlayersSync => "players_sync",
            SyncEventType::PlayerLeave => "player_leave",
            SyncEventType::Call => "call",
            SyncEventType::Request => "request",
            SyncEventType::RequestComplete => "request_complete",
            SyncEventType::Message => "message",
            SyncEventType::GameUpdate => "game_update",
            SyncEventType::ScoreUpdate => "score_update",
        }
    }
}

impl std::fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity announced on join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
}

/// Roster reply to a join
///
/// Ordinary members list only themselves. The designated responder lists
/// every member it knows and attaches its view of the game state so a late
/// joiner can catch up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterPayload {
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<RoomGameState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallPayload {
    pub text: String,
    pub emoji: String,
}

/// Fan-service request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub request_id: Uuid,
    pub text: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestAck {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub text: String,
}

/// Partial RoomGameState update
///
/// When present, `seq` increases monotonically per sender session and
/// receivers drop anything not newer than the last update they applied from
/// that sender. Updates without `seq` are applied in receipt order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<GamePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_song_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<i64>,
}

impl GameUpdate {
    /// Update that only moves the phase
    pub fn phase(phase: GamePhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Running score reported by a band member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub score: u64,
    pub combo: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
}

/// Typed payload, one variant per event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPayload {
    PlayerJoin(PlayerProfile),
    PlayersSync(RosterPayload),
    PlayerLeave,
    Call(CallPayload),
    Request(RequestPayload),
    RequestComplete(RequestAck),
    Message(MessagePayload),
    GameUpdate(GameUpdate),
    ScoreUpdate(ScoreReport),
}

impl SyncPayload {
    pub fn event_type(&self) -> SyncEventType {
        match self {
            SyncPayload::PlayerJoin(_) => SyncEventType::PlayerJoin,
            SyncPayload::PlayersSync(_) => SyncEventType::PlayersSync,
            SyncPayload::PlayerLeave => SyncEventType::PlayerLeave,
            SyncPayload::Call(_) => SyncEventType::Call,
            SyncPayload::Request(_) => SyncEventType::Request,
            SyncPayload::RequestComplete(_) => SyncEventType::RequestComplete,
            SyncPayload::Message(_) => SyncEventType::Message,
            SyncPayload::GameUpdate(_) => SyncEventType::GameUpdate,
            SyncPayload::ScoreUpdate(_) => SyncEventType::ScoreUpdate,
        }
    }
}

/// A typed message broadcast to every member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct SyncEvent {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub payload: SyncPayload,
    /// Send time, ms since epoch
    pub timestamp: i64,
}

impl SyncEvent {
    /// Build an event stamped with the current wall-clock time
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        payload: SyncPayload,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            payload,
            timestamp: crate::time::now_ms(),
        }
    }

    pub fn event_type(&self) -> SyncEventType {
        self.payload.event_type()
    }

    /// Encode to the JSON wire envelope
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the JSON wire envelope
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// JSON envelope: `{type, roomId, playerId, playerName, data, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: SyncEventType,
    pub room_id: String,
    pub player_id: String,
    pub player_name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: i64,
}

fn decode<T: serde::de::DeserializeOwned>(
    event_type: SyncEventType,
    data: serde_json::Value,
) -> Result<T, Error> {
    serde_json::from_value(data)
        .map_err(|e| Error::MalformedEvent(format!("{} payload: {}", event_type, e)))
}

impl TryFrom<WireEvent> for SyncEvent {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let kind = wire.event_type;
        let payload = match kind {
            SyncEventType::PlayerJoin => SyncPayload::PlayerJoin(decode(kind, wire.data)?),
            SyncEventType::PlayersSync => SyncPayload::PlayersSync(decode(kind, wire.data)?),
            SyncEventType::PlayerLeave => SyncPayload::PlayerLeave,
            SyncEventType::Call => SyncPayload::Call(decode(kind, wire.data)?),
            SyncEventType::Request => SyncPayload::Request(decode(kind, wire.data)?),
            SyncEventType::RequestComplete => {
                SyncPayload::RequestComplete(decode(kind, wire.data)?)
            }
            SyncEventType::Message => SyncPayload::Message(decode(kind, wire.data)?),
            SyncEventType::GameUpdate => SyncPayload::GameUpdate(decode(kind, wire.data)?),
            SyncEventType::ScoreUpdate => SyncPayload::ScoreUpdate(decode(kind, wire.data)?),
        };

        if wire.room_id.is_empty() {
            return Err(Error::MalformedEvent("empty roomId".to_string()));
        }
        if wire.player_id.is_empty() {
            return Err(Error::MalformedEvent("empty playerId".to_string()));
        }

        Ok(SyncEvent {
            room_id: wire.room_id,
            sender_id: wire.player_id,
            sender_name: wire.player_name,
            payload,
            timestamp: wire.timestamp,
        })
    }
}

impl From<SyncEvent> for WireEvent {
    fn from(event: SyncEvent) -> Self {
        let event_type = event.payload.event_type();
        let data = match &event.payload {
            SyncPayload::PlayerJoin(p) => serde_json::to_value(p),
            SyncPayload::PlayersSync(p) => serde_json::to_value(p),
            SyncPayload::PlayerLeave => Ok(serde_json::Value::Object(Default::default())),
            SyncPayload::Call(p) => serde_json::to_value(p),
            SyncPayload::Request(p) => serde_json::to_value(p),
            SyncPayload::RequestComplete(p) => serde_json::to_value(p),
            SyncPayload::Message(p) => serde_json::to_value(p),
            SyncPayload::GameUpdate(p) => serde_json::to_value(p),
            SyncPayload::ScoreUpdate(p) => serde_json::to_value(p),
        }
        // Plain derive structs with string keys always encode
        .unwrap_or_default();

        WireEvent {
            event_type,
            room_id: event.room_id,
            player_id: event.sender_id,
            player_name: event.sender_name,
            data,
            timestamp: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(payload: SyncPayload) -> SyncEvent {
        SyncEvent {
            room_id: "AB12CD".into(),
            sender_id: "p-1".into(),
            sender_name: "Miku".into(),
            payload,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_call_wire_shape() {
        let e = event(SyncPayload::Call(CallPayload {
            text: "Yeah!".into(),
            emoji: "🎉".into(),
        }));

        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "call",
                "roomId": "AB12CD",
                "playerId": "p-1",
                "playerName": "Miku",
                "data": {"text": "Yeah!", "emoji": "🎉"},
                "timestamp": 1_700_000_000_000i64
            })
        );
    }

    #[test]
    fn test_game_update_without_seq_decodes() {
        let json = r#"{"type":"game_update","roomId":"R","playerId":"s","playerName":"Singer",
            "data":{"phase":"ready","currentSongId":"aogeba"},"timestamp":1}"#;

        let e = SyncEvent::from_json(json).unwrap();
        match &e.payload {
            SyncPayload::GameUpdate(update) => {
                assert_eq!(update.seq, None);
                assert_eq!(update.phase, Some(GamePhase::Ready));
            }
            other => panic!("Expected GameUpdate, got {:?}", other),
        }
        let value = serde_json::to_value(&e).unwrap();
        assert!(value["data"].get("seq").is_none());
    }

    #[test]
    fn test_game_update_decodes_partial_fields() {
        let json = r#"{"type":"game_update","roomId":"R","playerId":"s","playerName":"Singer",
            "data":{"seq":4,"phase":"countdown","scheduledStartTime":1234},"timestamp":1}"#;

        let e = SyncEvent::from_json(json).unwrap();
        match e.payload {
            SyncPayload::GameUpdate(update) => {
                assert_eq!(update.seq, Some(4));
                assert_eq!(update.phase, Some(GamePhase::Countdown));
                assert_eq!(update.current_song_id, None);
                assert_eq!(update.scheduled_start_time, Some(1234));
            }
            other => panic!("Expected GameUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_player_leave_tolerates_missing_data() {
        let json = r#"{"type":"player_leave","roomId":"R","playerId":"x","playerName":"X","timestamp":5}"#;
        let e = SyncEvent::from_json(json).unwrap();
        assert_eq!(e.payload, SyncPayload::PlayerLeave);
        assert_eq!(e.event_type(), SyncEventType::PlayerLeave);
    }

    #[test]
    fn test_payload_mismatch_is_rejected() {
        // call without its text field
        let json = r#"{"type":"call","roomId":"R","playerId":"x","playerName":"X","data":{"emoji":"🎉"},"timestamp":5}"#;
        let err = SyncEvent::from_json(json).unwrap_err();
        assert!(err.to_string().contains("call payload"), "got: {}", err);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"game_start","roomId":"R","playerId":"x","playerName":"X","data":{},"timestamp":5}"#;
        assert!(SyncEvent::from_json(json).is_err());
    }

    #[test]
    fn test_empty_room_id_is_rejected() {
        let json = r#"{"type":"message","roomId":"","playerId":"x","playerName":"X","data":{"text":"hi"},"timestamp":5}"#;
        assert!(SyncEvent::from_json(json).is_err());
    }

    #[test]
    fn test_roster_payload_round_trips_through_wire() {
        let e = event(SyncPayload::PlayersSync(RosterPayload {
            players: vec![Player {
                id: "p-2".into(),
                name: "Taku".into(),
                role: Role::Band,
                instrument: Some(Instrument::Drums),
            }],
            game_state: Some(RoomGameState::default()),
        }));

        let decoded = SyncEvent::from_json(&e.to_json().unwrap()).unwrap();
        assert_eq!(decoded, e);
    }

    #[test]
    fn test_event_type_tags() {
        let cases = vec![
            (SyncPayload::PlayerLeave, "player_leave"),
            (
                SyncPayload::Message(MessagePayload { text: "hi".into() }),
                "message",
            ),
            (
                SyncPayload::GameUpdate(GameUpdate::phase(GamePhase::Ready).with_seq(1)),
                "game_update",
            ),
            (
                SyncPayload::ScoreUpdate(ScoreReport {
                    score: 10,
                    combo: 1,
                    instrument: None,
                }),
                "score_update",
            ),
        ];

        for (payload, expected) in cases {
            assert_eq!(payload.event_type().as_str(), expected);
            let value = serde_json::to_value(event(payload)).unwrap();
            assert_eq!(value["type"], expected);
        }
    }
}
