//! Judgment engine
//!
//! Matches taps against the nearest unresolved note and sweeps notes that
//! scroll past unplayed. Every note is resolved exactly once: either by
//! [`JudgeMachine::resolve_input`] or by [`JudgeMachine::sweep_misses`].
//!
//! Both entry points are driven from the same tick loop, so they never
//! interleave and no locking is needed.

use crate::chart::{Chart, Note, NoteKind};
use crate::error::{GameError, Result};
use encore_common::config::JudgmentConfig;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Timing accuracy of a resolved note
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Judgment {
    Perfect,
    Great,
    Good,
    Miss,
}

impl Judgment {
    pub fn is_miss(self) -> bool {
        matches!(self, Judgment::Miss)
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Judgment::Perfect => write!(f, "perfect"),
            Judgment::Great => write!(f, "great"),
            Judgment::Good => write!(f, "good"),
            Judgment::Miss => write!(f, "miss"),
        }
    }
}

/// Half-width timing windows, nested perfect ⊂ great ⊂ good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgmentWindows {
    perfect_ms: i64,
    great_ms: i64,
    good_ms: i64,
}

impl Default for JudgmentWindows {
    fn default() -> Self {
        Self {
            perfect_ms: 100,
            great_ms: 180,
            good_ms: 300,
        }
    }
}

impl JudgmentWindows {
    pub fn new(perfect_ms: i64, great_ms: i64, good_ms: i64) -> Result<Self> {
        if !(0 < perfect_ms && perfect_ms <= great_ms && great_ms <= good_ms) {
            return Err(GameError::InvalidParameters(format!(
                "windows must be nested: 0 < {} <= {} <= {}",
                perfect_ms, great_ms, good_ms
            )));
        }
        Ok(Self {
            perfect_ms,
            great_ms,
            good_ms,
        })
    }

    pub fn perfect_ms(&self) -> i64 {
        self.perfect_ms
    }

    pub fn great_ms(&self) -> i64 {
        self.great_ms
    }

    /// Widest acceptable window
    pub fn good_ms(&self) -> i64 {
        self.good_ms
    }

    /// Tier for an absolute timing delta, narrowest first
    pub fn classify(&self, abs_delta_ms: i64) -> Option<Judgment> {
        if abs_delta_ms <= self.perfect_ms {
            Some(Judgment::Perfect)
        } else if abs_delta_ms <= self.great_ms {
            Some(Judgment::Great)
        } else if abs_delta_ms <= self.good_ms {
            Some(Judgment::Good)
        } else {
            None
        }
    }
}

impl TryFrom<&JudgmentConfig> for JudgmentWindows {
    type Error = GameError;

    fn try_from(config: &JudgmentConfig) -> Result<Self> {
        Self::new(config.perfect_ms, config.great_ms, config.good_ms)
    }
}

/// Runtime state of one note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteState {
    /// Stable index into the chart
    pub id: usize,
    pub note: Note,
    pub hit: bool,
    pub judgment: Option<Judgment>,
}

/// Outcome of a successful tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgmentResult {
    pub note_id: usize,
    pub kind: NoteKind,
    pub judgment: Judgment,
    /// Tap position minus note time (negative = early)
    pub delta_ms: i64,
}

/// Per-chart judgment state machine
pub struct JudgeMachine {
    notes: Vec<NoteState>,
    windows: JudgmentWindows,
    lane_based: bool,
    /// Every note before this index is resolved
    sweep_cursor: usize,
    resolved: usize,
}

impl JudgeMachine {
    /// Load a chart with every note unresolved
    ///
    /// Notes are ordered by time (stable) before ids are assigned.
    pub fn new(chart: &Chart, windows: JudgmentWindows) -> Self {
        let mut sorted = chart.notes.clone();
        sorted.sort_by_key(|n| n.time_ms);

        let notes = sorted
            .into_iter()
            .enumerate()
            .map(|(id, note)| NoteState {
                id,
                note,
                hit: false,
                judgment: None,
            })
            .collect();

        Self {
            notes,
            windows,
            lane_based: chart.instrument.is_lane_based(),
            sweep_cursor: 0,
            resolved: 0,
        }
    }

    pub fn windows(&self) -> &JudgmentWindows {
        &self.windows
    }

    pub fn notes(&self) -> &[NoteState] {
        &self.notes
    }

    pub fn note(&self, id: usize) -> Option<&NoteState> {
        self.notes.get(id)
    }

    pub fn total_notes(&self) -> usize {
        self.notes.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    /// True once every note has a judgment
    pub fn is_complete(&self) -> bool {
        self.resolved == self.notes.len()
    }

    /// Judge a tap at `position_ms`
    ///
    /// Picks the unresolved note nearest in time (earliest on ties) within
    /// the good window. `lane` filters candidates only for lane-based
    /// instruments. Returns `None` when nothing qualifies; the tap is simply
    /// discarded.
    pub fn resolve_input(&mut self, position_ms: i64, lane: Option<u8>) -> Option<JudgmentResult> {
        let good = self.windows.good_ms;
        let lane_filter = if self.lane_based { lane } else { None };

        let lo = self
            .notes
            .partition_point(|n| n.note.time_ms < position_ms - good)
            .max(self.sweep_cursor);
        let hi = self
            .notes
            .partition_point(|n| n.note.time_ms <= position_ms + good);

        let mut best: Option<(usize, i64)> = None;
        for state in self.notes.get(lo..hi).unwrap_or(&[]) {
            if state.hit {
                continue;
            }
            if let Some(lane) = lane_filter {
                if state.note.lane != Some(lane) {
                    continue;
                }
            }
            let distance = (state.note.time_ms - position_ms).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((state.id, distance));
            }
        }

        let (id, distance) = best?;
        let judgment = self.windows.classify(distance)?;
        let state = &mut self.notes[id];
        state.hit = true;
        state.judgment = Some(judgment);
        self.resolved += 1;

        trace!("note {} judged {} at {}ms", id, judgment, position_ms);
        Some(JudgmentResult {
            note_id: id,
            kind: state.note.kind,
            judgment,
            delta_ms: position_ms - state.note.time_ms,
        })
    }

    /// Force-miss every unresolved note whose good window has fully passed
    ///
    /// A note misses once `time + good < position`. Returns the ids newly
    /// missed, in time order.
    pub fn sweep_misses(&mut self, position_ms: i64) -> Vec<usize> {
        let good = self.windows.good_ms;
        let mut missed = Vec::new();

        while let Some(state) = self.notes.get_mut(self.sweep_cursor) {
            if state.note.time_ms + good >= position_ms {
                break;
            }
            if !state.hit {
                state.hit = true;
                state.judgment = Some(Judgment::Miss);
                self.resolved += 1;
                missed.push(state.id);
            }
            self.sweep_cursor += 1;
        }

        if !missed.is_empty() {
            trace!("swept {} misses at {}ms", missed.len(), position_ms);
        }
        missed
    }

    /// Miss every note still unresolved (early end of session)
    pub fn finalize(&mut self) -> Vec<usize> {
        self.sweep_misses(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_common::events::{Difficulty, Instrument};

    fn chart(instrument: Instrument, notes: &[(i64, Option<u8>)]) -> Chart {
        Chart {
            song_id: "s".into(),
            instrument,
            difficulty: Difficulty::Easy,
            notes: notes
                .iter()
                .map(|&(time_ms, lane)| Note {
                    time_ms,
                    kind: NoteKind::Tap,
                    lane,
                    duration_ms: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_windows_must_be_nested() {
        assert!(JudgmentWindows::new(100, 180, 300).is_ok());
        assert!(JudgmentWindows::new(200, 180, 300).is_err());
        assert!(JudgmentWindows::new(0, 180, 300).is_err());
        assert!(JudgmentWindows::new(100, 400, 300).is_err());
    }

    #[test]
    fn test_classify_boundaries_are_inclusive() {
        let w = JudgmentWindows::default();
        assert_eq!(w.classify(0), Some(Judgment::Perfect));
        assert_eq!(w.classify(100), Some(Judgment::Perfect));
        assert_eq!(w.classify(101), Some(Judgment::Great));
        assert_eq!(w.classify(180), Some(Judgment::Great));
        assert_eq!(w.classify(300), Some(Judgment::Good));
        assert_eq!(w.classify(301), None);
    }

    #[test]
    fn test_nearest_note_wins() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Guitar, &[(1000, None), (1200, None)]),
            JudgmentWindows::default(),
        );
        let result = judge.resolve_input(1150, None).unwrap();
        assert_eq!(result.note_id, 1);
        assert_eq!(result.delta_ms, -50);
    }

    #[test]
    fn test_tie_goes_to_earlier_note() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Guitar, &[(1000, None), (1200, None)]),
            JudgmentWindows::default(),
        );
        assert_eq!(judge.resolve_input(1100, None).unwrap().note_id, 0);
    }

    #[test]
    fn test_lane_filter_applies_to_drums_only() {
        let notes = [(1000, Some(0)), (1050, Some(1))];

        let mut drums = JudgeMachine::new(&chart(Instrument::Drums, &notes), JudgmentWindows::default());
        assert_eq!(drums.resolve_input(1000, Some(1)).unwrap().note_id, 1);

        let mut bass = JudgeMachine::new(&chart(Instrument::Bass, &notes), JudgmentWindows::default());
        assert_eq!(bass.resolve_input(1050, Some(0)).unwrap().note_id, 1);
    }

    #[test]
    fn test_drums_without_lane_match_any_lane() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Drums, &[(1000, Some(2))]),
            JudgmentWindows::default(),
        );
        assert!(judge.resolve_input(1000, None).is_some());
    }

    #[test]
    fn test_resolved_note_is_not_rejudged() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Keyboard, &[(1000, None)]),
            JudgmentWindows::default(),
        );
        assert!(judge.resolve_input(1000, None).is_some());
        assert!(judge.resolve_input(1000, None).is_none());
        assert!(judge.sweep_misses(5000).is_empty());
        assert_eq!(judge.note(0).unwrap().judgment, Some(Judgment::Perfect));
    }

    #[test]
    fn test_sweep_uses_strict_window_edge() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Keyboard, &[(1000, None)]),
            JudgmentWindows::default(),
        );
        assert!(judge.sweep_misses(1300).is_empty());
        assert_eq!(judge.sweep_misses(1301), vec![0]);
        assert!(judge.is_complete());
    }

    #[test]
    fn test_sweep_skips_hit_notes_ahead() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Keyboard, &[(1000, None), (1100, None), (1200, None)]),
            JudgmentWindows::default(),
        );
        judge.resolve_input(1100, None);
        assert_eq!(judge.sweep_misses(2000), vec![0, 2]);
        assert_eq!(judge.resolved_count(), 3);
    }

    #[test]
    fn test_finalize_misses_remaining_notes() {
        let mut judge = JudgeMachine::new(
            &chart(Instrument::Guitar, &[(1000, None), (90_000, None)]),
            JudgmentWindows::default(),
        );
        judge.resolve_input(1000, None);
        assert_eq!(judge.finalize(), vec![1]);
        assert!(judge.is_complete());
    }

    #[test]
    fn test_unsorted_chart_is_ordered_on_load() {
        let judge = JudgeMachine::new(
            &chart(Instrument::Guitar, &[(3000, None), (1000, None)]),
            JudgmentWindows::default(),
        );
        assert_eq!(judge.note(0).unwrap().note.time_ms, 1000);
    }
}
