//! Scoring and combo model
//!
//! Multipliers are held as integer percentages so that
//! `floor(base * judgment * combo)` is computed exactly with integer math.

use crate::chart::NoteKind;
use crate::judge::Judgment;
use encore_common::config::{ComboStep, ScoringConfig};
use serde::{Deserialize, Serialize};

/// Point tables derived from [`ScoringConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreTable {
    tap: u64,
    hold: u64,
    special: u64,
    perfect_pct: u64,
    great_pct: u64,
    good_pct: u64,
    /// Sorted by descending `min_combo`
    combo_steps: Vec<ComboStep>,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

impl From<&ScoringConfig> for ScoreTable {
    fn from(config: &ScoringConfig) -> Self {
        let mut combo_steps = config.combo_steps.clone();
        combo_steps.sort_by(|a, b| b.min_combo.cmp(&a.min_combo));
        Self {
            tap: config.tap_points,
            hold: config.hold_points,
            special: config.special_points,
            perfect_pct: config.perfect_percent as u64,
            great_pct: config.great_percent as u64,
            good_pct: config.good_percent as u64,
            combo_steps,
        }
    }
}

impl ScoreTable {
    pub fn base_points(&self, kind: NoteKind) -> u64 {
        match kind {
            NoteKind::Tap => self.tap,
            NoteKind::Hold => self.hold,
            NoteKind::Special => self.special,
        }
    }

    pub fn judgment_percent(&self, judgment: Judgment) -> u64 {
        match judgment {
            Judgment::Perfect => self.perfect_pct,
            Judgment::Great => self.great_pct,
            Judgment::Good => self.good_pct,
            Judgment::Miss => 0,
        }
    }

    /// Stepwise combo multiplier for the new combo count
    pub fn combo_percent(&self, combo: u32) -> u64 {
        self.combo_steps
            .iter()
            .find(|step| combo >= step.min_combo)
            .map_or(100, |step| step.percent as u64)
    }

    /// Points for one judgment at the given (already incremented) combo
    pub fn points(&self, kind: NoteKind, judgment: Judgment, combo: u32) -> u64 {
        self.base_points(kind) * self.judgment_percent(judgment) * self.combo_percent(combo)
            / 10_000
    }
}

/// Per-judgment tallies
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JudgmentCounts {
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub miss: u32,
}

impl JudgmentCounts {
    pub fn record(&mut self, judgment: Judgment) {
        match judgment {
            Judgment::Perfect => self.perfect += 1,
            Judgment::Great => self.great += 1,
            Judgment::Good => self.good += 1,
            Judgment::Miss => self.miss += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.perfect + self.great + self.good + self.miss
    }

    /// Weighted accuracy: perfect 100, great 75, good 50, miss 0
    pub fn accuracy_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let weighted =
            self.perfect as f64 * 100.0 + self.great as f64 * 75.0 + self.good as f64 * 50.0;
        weighted / total as f64
    }
}

/// Running score, combo and tallies for one player
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreState {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub counts: JudgmentCounts,
}

impl ScoreState {
    /// Apply one judgment; returns points awarded
    ///
    /// A miss resets the combo and awards nothing. Anything else bumps the
    /// combo first, then scores at the new combo's multiplier.
    pub fn apply_judgment(&mut self, table: &ScoreTable, kind: NoteKind, judgment: Judgment) -> u64 {
        self.counts.record(judgment);

        if judgment.is_miss() {
            self.combo = 0;
            return 0;
        }

        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
        let points = table.points(kind, judgment, self.combo);
        self.score += points;
        points
    }

    /// Deduct `cost`, clamping at zero; combo is untouched
    pub fn spend(&mut self, cost: u64) -> u64 {
        let spent = cost.min(self.score);
        self.score -= spent;
        spent
    }
}
