//! Chart generation
//!
//! A chart is derived deterministically from a song's tempo and a density
//! (notes per beat). Generation is pure: the same inputs always yield the same
//! note sequence, so every client in a room builds identical charts locally
//! without shipping them over the wire.
//!
//! # Placement rules
//!
//! - Beat length (ms) = 60000 / bpm; spacing = beat / density
//! - First note at 2000 ms, nothing at or after `duration - 5000` ms
//! - Note times are rounded to the nearest millisecond from the exact
//!   fractional position, so spacing never drifts
//! - Every 16th note by generation index is `special`, all others `tap`
//! - Drums get `lane = index % 4`; other instruments have no lane

use crate::error::{GameError, Result};
use encore_common::config::ChartsConfig;
use encore_common::events::{Difficulty, Instrument};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Lead-in before the first note
pub const LEAD_IN_MS: i64 = 2_000;

/// Quiet tail with no notes before the song ends
pub const TAIL_MS: i64 = 5_000;

/// Every Nth note (0-based index divisible by N) is special
pub const SPECIAL_EVERY: usize = 16;

/// Closest two notes may be placed
pub const MIN_SPACING_MS: f64 = 1.0;

/// Upper bound on notes in one chart
pub const MAX_NOTES: usize = 100_000;

/// Note type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Tap,
    Hold,
    Special,
}

impl std::fmt::Display for NoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteKind::Tap => write!(f, "tap"),
            NoteKind::Hold => write!(f, "hold"),
            NoteKind::Special => write!(f, "special"),
        }
    }
}

/// Immutable note definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Offset from song start (ms)
    pub time_ms: i64,
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Minimal song metadata needed to build charts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongInfo {
    pub id: String,
    pub title: String,
    pub bpm: f64,
    pub duration_secs: f64,
}

/// Generate the note sequence for one instrument
///
/// # Examples
///
/// ```
/// use encore_common::events::Instrument;
/// use encore_game::chart::{generate, NoteKind};
///
/// let notes = generate(Instrument::Guitar, 120.0, 60.0, 1.0).unwrap();
/// assert_eq!(notes[0].time_ms, 2000);
/// assert_eq!(notes[1].time_ms, 2500);
/// assert_eq!(notes[16].kind, NoteKind::Special);
/// assert!(notes.iter().all(|n| n.lane.is_none()));
/// ```
///
/// # Errors
///
/// [`GameError::InvalidParameters`] if any input is not a finite value > 0,
/// if notes would land closer than [`MIN_SPACING_MS`], or if the chart would
/// exceed [`MAX_NOTES`].
pub fn generate(
    instrument: Instrument,
    bpm: f64,
    duration_secs: f64,
    density: f64,
) -> Result<Vec<Note>> {
    for (name, value) in [("bpm", bpm), ("duration", duration_secs), ("density", density)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(GameError::InvalidParameters(format!(
                "{} must be > 0, got {}",
                name, value
            )));
        }
    }

    let beat_ms = 60_000.0 / bpm;
    let spacing_ms = beat_ms / density;
    let end_ms = duration_secs * 1000.0 - TAIL_MS as f64;
    if spacing_ms < MIN_SPACING_MS {
        return Err(GameError::InvalidParameters(format!(
            "note spacing {:.4}ms is below {}ms (bpm {}, density {})",
            spacing_ms, MIN_SPACING_MS, bpm, density
        )));
    }
    let span_ms = end_ms - LEAD_IN_MS as f64;
    if span_ms > 0.0 && span_ms / spacing_ms > MAX_NOTES as f64 {
        return Err(GameError::InvalidParameters(format!(
            "chart would exceed {} notes ({}s at spacing {:.1}ms)",
            MAX_NOTES, duration_secs, spacing_ms
        )));
    }

    let mut notes = Vec::new();
    let mut index = 0usize;
    loop {
        let exact = LEAD_IN_MS as f64 + index as f64 * spacing_ms;
        if exact >= end_ms {
            break;
        }
        let time_ms = exact.round() as i64;
        if time_ms as f64 > end_ms {
            break;
        }

        let kind = if index % SPECIAL_EVERY == 0 {
            NoteKind::Special
        } else {
            NoteKind::Tap
        };
        let lane = if instrument.is_lane_based() {
            Some((index % instrument.lane_count() as usize) as u8)
        } else {
            None
        };

        notes.push(Note {
            time_ms,
            kind,
            lane,
            duration_ms: None,
        });
        index += 1;
    }

    debug!(
        "Generated {} notes for {} (bpm {}, {}s, density {})",
        notes.len(),
        instrument,
        bpm,
        duration_secs,
        density
    );
    Ok(notes)
}

/// Notes for one (song, instrument, difficulty) triple, ascending by time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub song_id: String,
    pub instrument: Instrument,
    pub difficulty: Difficulty,
    pub notes: Vec<Note>,
}

impl Chart {
    pub fn generate(
        song: &SongInfo,
        instrument: Instrument,
        difficulty: Difficulty,
        density: f64,
    ) -> Result<Self> {
        Ok(Self {
            song_id: song.id.clone(),
            instrument,
            difficulty,
            notes: generate(instrument, song.bpm, song.duration_secs, density)?,
        })
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

type ChartKey = (String, Instrument, Difficulty);

/// Pre-generated charts for a song catalog
///
/// Only pairs with a configured density get a chart; everything else looks up
/// as [`GameError::MissingChart`].
#[derive(Debug, Default)]
pub struct ChartLibrary {
    charts: HashMap<ChartKey, Chart>,
}

impl ChartLibrary {
    /// Generate every configured chart for `songs`
    pub fn build(songs: &[SongInfo], table: &ChartsConfig) -> Result<Self> {
        let mut library = Self::default();
        for song in songs {
            for (difficulty, instruments) in &table.density {
                for (instrument, density) in instruments {
                    let chart = Chart::generate(song, *instrument, *difficulty, *density)?;
                    library.insert(chart);
                }
            }
        }
        debug!("Chart library holds {} charts", library.len());
        Ok(library)
    }

    pub fn insert(&mut self, chart: Chart) {
        let key = (chart.song_id.clone(), chart.instrument, chart.difficulty);
        self.charts.insert(key, chart);
    }

    pub fn get(
        &self,
        song_id: &str,
        instrument: Instrument,
        difficulty: Difficulty,
    ) -> Result<&Chart> {
        self.charts
            .get(&(song_id.to_string(), instrument, difficulty))
            .ok_or_else(|| GameError::MissingChart {
                song_id: song_id.to_string(),
                instrument,
                difficulty,
            })
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}
