//! Single-player gameplay session
//!
//! Ties the judgment engine, score model and call tracker together for one
//! chart. The owner drives it from one loop: `tick` every frame with the
//! media position, `tap` on input.

use crate::calls::{CallCatalog, CallTracker};
use crate::chart::{Chart, NoteKind};
use crate::error::Result;
use crate::judge::{Judgment, JudgeMachine, JudgmentResult, JudgmentWindows};
use crate::scoring::{JudgmentCounts, ScoreState, ScoreTable};
use encore_common::config::TomlConfig;
use encore_common::events::{CallPayload, Difficulty, Instrument, ScoreReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result screen data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub song_id: String,
    pub instrument: Instrument,
    pub difficulty: Difficulty,
    pub score: u64,
    pub max_combo: u32,
    pub counts: JudgmentCounts,
    pub total_notes: usize,
    pub accuracy_percent: f64,
}

/// A judged tap with the points it earned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    pub result: JudgmentResult,
    pub points: u64,
}

pub struct GameSession {
    song_id: String,
    instrument: Instrument,
    difficulty: Difficulty,
    judge: JudgeMachine,
    table: ScoreTable,
    score: ScoreState,
    calls: CallTracker,
}

impl GameSession {
    pub fn new(
        chart: &Chart,
        windows: JudgmentWindows,
        table: ScoreTable,
        catalog: CallCatalog,
    ) -> Self {
        debug!(
            "Session for {} ({}, {}) with {} notes",
            chart.song_id,
            chart.instrument,
            chart.difficulty,
            chart.len()
        );
        Self {
            song_id: chart.song_id.clone(),
            instrument: chart.instrument,
            difficulty: chart.difficulty,
            judge: JudgeMachine::new(chart, windows),
            table,
            score: ScoreState::default(),
            calls: CallTracker::new(catalog),
        }
    }

    /// Session using the configured windows and point tables
    pub fn from_config(chart: &Chart, config: &TomlConfig) -> Result<Self> {
        let windows = JudgmentWindows::try_from(&config.judgment)?;
        Ok(Self::new(
            chart,
            windows,
            ScoreTable::from(&config.scoring),
            CallCatalog::default(),
        ))
    }

    pub fn song_id(&self) -> &str {
        &self.song_id
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn score(&self) -> &ScoreState {
        &self.score
    }

    pub fn judge(&self) -> &JudgeMachine {
        &self.judge
    }

    pub fn calls(&self) -> &CallTracker {
        &self.calls
    }

    pub fn is_complete(&self) -> bool {
        self.judge.is_complete()
    }

    /// Advance to `position_ms`: sweep passed notes as misses
    ///
    /// Returns the ids newly missed.
    pub fn tick(&mut self, position_ms: i64) -> Vec<usize> {
        let missed = self.judge.sweep_misses(position_ms);
        self.apply_misses(&missed);
        missed
    }

    /// Judge a tap; `None` when no note is in window
    pub fn tap(&mut self, position_ms: i64, lane: Option<u8>) -> Option<TapOutcome> {
        let result = self.judge.resolve_input(position_ms, lane)?;
        let points = self
            .score
            .apply_judgment(&self.table, result.kind, result.judgment);
        Some(TapOutcome { result, points })
    }

    /// Fire a call from the catalog, spending its cost
    pub fn use_call(&mut self, id: &str) -> Result<CallPayload> {
        self.calls.use_call(id, &mut self.score)
    }

    /// Snapshot for a `score_update` broadcast
    pub fn score_report(&self) -> ScoreReport {
        ScoreReport {
            score: self.score.score,
            combo: self.score.combo,
            instrument: Some(self.instrument),
        }
    }

    /// Resolve every remaining note as a miss and return the summary
    pub fn finalize(&mut self) -> SessionSummary {
        let missed = self.judge.finalize();
        self.apply_misses(&missed);
        let summary = self.summary();
        info!(
            "Session finished: {} on {} score {} max combo {} accuracy {:.1}%",
            summary.song_id,
            summary.instrument,
            summary.score,
            summary.max_combo,
            summary.accuracy_percent
        );
        summary
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            song_id: self.song_id.clone(),
            instrument: self.instrument,
            difficulty: self.difficulty,
            score: self.score.score,
            max_combo: self.score.max_combo,
            counts: self.score.counts,
            total_notes: self.judge.total_notes(),
            accuracy_percent: self.score.counts.accuracy_percent(),
        }
    }

    fn apply_misses(&mut self, ids: &[usize]) {
        for id in ids {
            let kind = self
                .judge
                .note(*id)
                .map_or(NoteKind::Tap, |state| state.note.kind);
            self.score.apply_judgment(&self.table, kind, Judgment::Miss);
        }
    }
}
