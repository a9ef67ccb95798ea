//! Local stage controller
//!
//! Turns the mirrored [`RoomGameState`] plus local wall-clock time into what
//! this client should show, and runs the local [`GameSession`] while the room
//! is playing.
//!
//! The countdown is never a local timer: remaining time is recomputed from
//! the shared `scheduledStartTime` on every update, and playback starts when
//! local time reaches it. A client that cannot play (no instrument, or no
//! chart for its pick) spectates instead of failing.

use encore_common::config::TomlConfig;
use encore_common::events::{CallPayload, Difficulty, GamePhase, Instrument, RoomGameState};
use encore_game::{
    ChartLibrary, GameError, GameSession, MediaControl, SessionSummary, TapOutcome,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Why this client is watching rather than playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectateReason {
    NoInstrument,
    NoSongSelected,
    MissingChart { song_id: String },
}

impl std::fmt::Display for SpectateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectateReason::NoInstrument => write!(f, "no instrument selected"),
            SpectateReason::NoSongSelected => write!(f, "no song selected"),
            SpectateReason::MissingChart { song_id } => write!(f, "no chart for {}", song_id),
        }
    }
}

/// What the local client presents
#[derive(Debug, Clone, PartialEq)]
pub enum StageView {
    /// `song-select` or `ready`
    Lobby(GamePhase),
    Countdown { remaining_ms: i64 },
    Playing { position_ms: i64 },
    Spectating(SpectateReason),
    /// Track over; the summary is present when this client played
    Finished(Option<SessionSummary>),
}

/// Result of one [`StageController::update`]
#[derive(Debug, Clone, PartialEq)]
pub struct StageTick {
    pub view: StageView,
    /// Note ids the miss sweep resolved this tick
    pub missed: Vec<usize>,
    /// True exactly once, on the tick playback reaches end of track
    pub track_ended: bool,
}

pub struct StageController<M: MediaControl> {
    library: Arc<ChartLibrary>,
    config: TomlConfig,
    instrument: Option<Instrument>,
    difficulty: Difficulty,
    media: M,
    session: Option<GameSession>,
    /// Song whose playback has been started locally
    started: Option<String>,
    spectating: Option<SpectateReason>,
    summary: Option<SessionSummary>,
    ended: bool,
}

impl<M: MediaControl> StageController<M> {
    pub fn new(
        library: Arc<ChartLibrary>,
        config: TomlConfig,
        instrument: Option<Instrument>,
        difficulty: Difficulty,
        media: M,
    ) -> Self {
        Self {
            library,
            config,
            instrument,
            difficulty,
            media,
            session: None,
            started: None,
            spectating: None,
            summary: None,
            ended: false,
        }
    }

    /// Swap in the track for the next song
    pub fn set_media(&mut self, media: M) {
        self.media = media;
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Change the local instrument; takes effect at the next song
    pub fn set_instrument(&mut self, instrument: Option<Instrument>) {
        self.instrument = instrument;
    }

    /// Advance to local time `now_ms` against the mirrored room state
    pub fn update(&mut self, state: &RoomGameState, now_ms: i64) -> StageTick {
        let mut tick = StageTick {
            view: StageView::Lobby(state.phase),
            missed: Vec::new(),
            track_ended: false,
        };

        match state.effective_phase(now_ms) {
            phase @ (GamePhase::SongSelect | GamePhase::Ready) => {
                self.reset();
                tick.view = StageView::Lobby(phase);
            }
            GamePhase::Countdown => {
                // Without a schedule the countdown holds at zero until the driver moves on
                let remaining_ms = state.countdown_remaining_ms(now_ms).unwrap_or(0);
                tick.view = StageView::Countdown { remaining_ms };
            }
            GamePhase::Playing => {
                self.ensure_started(state, now_ms);
                let position_ms = self.media.position_ms();

                if let Some(session) = self.session.as_mut() {
                    tick.missed = session.tick(position_ms);
                }
                if self.media.is_ended() && !self.ended {
                    self.end_track();
                    tick.track_ended = true;
                }

                tick.view = if self.ended {
                    StageView::Finished(self.summary.clone())
                } else if let Some(reason) = &self.spectating {
                    StageView::Spectating(reason.clone())
                } else {
                    StageView::Playing { position_ms }
                };
            }
            GamePhase::Finished => {
                if !self.ended && self.started.is_some() {
                    // Driver ended the song early
                    self.end_track();
                }
                tick.view = StageView::Finished(self.summary.clone());
            }
        }
        tick
    }

    /// Judge a tap at the current media position
    pub fn tap(&mut self, lane: Option<u8>) -> Option<TapOutcome> {
        if self.ended {
            return None;
        }
        let position_ms = self.media.position_ms();
        self.session.as_mut()?.tap(position_ms, lane)
    }

    /// Fire a call from the local session
    pub fn use_call(&mut self, id: &str) -> Option<encore_game::Result<CallPayload>> {
        self.session.as_mut().map(|s| s.use_call(id))
    }

    fn ensure_started(&mut self, state: &RoomGameState, now_ms: i64) {
        let Some(song_id) = state.current_song_id.clone() else {
            self.spectating = Some(SpectateReason::NoSongSelected);
            return;
        };
        if self.started.as_deref() == Some(song_id.as_str()) {
            return;
        }

        self.reset();
        // Late starters seek to where everyone else already is
        let offset = state
            .scheduled_start_time
            .map_or(0, |start| (now_ms - start).max(0));
        self.media.seek(offset);
        self.media.play();
        self.started = Some(song_id.clone());

        self.spectating = match self.instrument {
            None => Some(SpectateReason::NoInstrument),
            Some(instrument) => match self.start_session(&song_id, instrument) {
                Ok(session) => {
                    self.session = Some(session);
                    None
                }
                Err(e) => {
                    warn!("Spectating {}: {}", song_id, e);
                    Some(SpectateReason::MissingChart {
                        song_id: song_id.clone(),
                    })
                }
            },
        };
    }

    fn start_session(&self, song_id: &str, instrument: Instrument) -> Result<GameSession, GameError> {
        let chart = self.library.get(song_id, instrument, self.difficulty)?;
        GameSession::from_config(chart, &self.config)
    }

    fn end_track(&mut self) {
        self.ended = true;
        self.media.pause();
        if let Some(session) = self.session.as_mut() {
            self.summary = Some(session.finalize());
        }
        info!("Track ended");
    }

    fn reset(&mut self) {
        if self.started.take().is_some() {
            self.media.pause();
            self.media.seek(0);
        }
        self.session = None;
        self.spectating = None;
        self.summary = None;
        self.ended = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_common::config::ChartsConfig;
    use encore_game::{SimulatedTrack, SongInfo};
    use tokio::time::Duration;

    fn library() -> Arc<ChartLibrary> {
        let song = SongInfo {
            id: "song".into(),
            title: "Song".into(),
            bpm: 120.0,
            duration_secs: 10.0,
        };
        Arc::new(ChartLibrary::build(&[song], &ChartsConfig::default()).unwrap())
    }

    fn controller(instrument: Option<Instrument>, difficulty: Difficulty) -> StageController<SimulatedTrack> {
        StageController::new(
            library(),
            TomlConfig::default(),
            instrument,
            difficulty,
            SimulatedTrack::new(Duration::from_secs(10)),
        )
    }

    fn countdown(start: i64) -> RoomGameState {
        RoomGameState {
            phase: GamePhase::Countdown,
            current_song_id: Some("song".into()),
            scheduled_start_time: Some(start),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_recomputed_from_schedule() {
        let mut stage = controller(Some(Instrument::Drums), Difficulty::Easy);
        let state = countdown(10_000);

        assert_eq!(
            stage.update(&state, 7_000).view,
            StageView::Countdown { remaining_ms: 3_000 }
        );
        assert_eq!(
            stage.update(&state, 9_250).view,
            StageView::Countdown { remaining_ms: 750 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscheduled_countdown_holds_at_zero() {
        let mut stage = controller(Some(Instrument::Drums), Difficulty::Easy);
        let state = RoomGameState {
            scheduled_start_time: None,
            ..countdown(0)
        };

        for now in [0, 10_000, 1_000_000] {
            assert_eq!(
                stage.update(&state, now).view,
                StageView::Countdown { remaining_ms: 0 }
            );
        }
        assert!(stage.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_starts_at_scheduled_instant() {
        let mut stage = controller(Some(Instrument::Drums), Difficulty::Easy);
        let state = countdown(10_000);

        assert_eq!(
            stage.update(&state, 10_000).view,
            StageView::Playing { position_ms: 0 }
        );
        assert!(stage.session().is_some());

        tokio::time::advance(Duration::from_millis(2_000)).await;
        let outcome = stage.tap(Some(0)).unwrap();
        assert_eq!(outcome.result.note_id, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_seeks_forward() {
        let mut stage = controller(Some(Instrument::Bass), Difficulty::Easy);
        let tick = stage.update(&countdown(10_000), 13_000);
        assert_eq!(tick.view, StageView::Playing { position_ms: 3_000 });
        // The note at 2000ms is already past its window
        assert_eq!(tick.missed, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spectates_without_instrument() {
        let mut stage = controller(None, Difficulty::Easy);
        let tick = stage.update(&countdown(0), 0);
        assert_eq!(tick.view, StageView::Spectating(SpectateReason::NoInstrument));
        assert!(stage.tap(None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_chart_degrades_to_spectator() {
        let mut stage = controller(Some(Instrument::Guitar), Difficulty::Hard);
        let tick = stage.update(&countdown(0), 0);
        assert_eq!(
            tick.view,
            StageView::Spectating(SpectateReason::MissingChart {
                song_id: "song".into()
            })
        );
        assert!(stage.media().is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_reported_once_with_summary() {
        let mut stage = controller(Some(Instrument::Keyboard), Difficulty::Easy);
        let state = countdown(0);
        stage.update(&state, 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        let tick = stage.update(&state, 11_000);
        assert!(tick.track_ended);
        match tick.view {
            StageView::Finished(Some(summary)) => {
                assert_eq!(summary.total_notes, summary.counts.total() as usize);
            }
            other => panic!("Expected finished view, got {:?}", other),
        }

        assert!(!stage.update(&state, 11_100).track_ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_finish_finalizes_session() {
        let mut stage = controller(Some(Instrument::Drums), Difficulty::Normal);
        stage.update(&countdown(0), 0);

        let finished = RoomGameState {
            phase: GamePhase::Finished,
            current_song_id: Some("song".into()),
            scheduled_start_time: Some(0),
        };
        match stage.update(&finished, 1_000).view {
            StageView::Finished(Some(summary)) => assert_eq!(summary.score, 0),
            other => panic!("Expected finished view, got {:?}", other),
        }
        assert!(stage.session().unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_lobby_resets() {
        let mut stage = controller(Some(Instrument::Drums), Difficulty::Easy);
        stage.update(&countdown(0), 0);
        let view = stage.update(&RoomGameState::default(), 500).view;
        assert_eq!(view, StageView::Lobby(GamePhase::SongSelect));
        assert!(stage.session().is_none());
        assert!(!stage.media().is_playing());
    }
}
