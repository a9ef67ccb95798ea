//! Configuration loading
//!
//! Bootstrap configuration is a single TOML file. Every field has a compiled
//! default, so a missing file is never fatal.
//!
//! # Resolution priority
//!
//! 1. Command-line `--config` path (must exist if given)
//! 2. `ENCORE_CONFIG` environment variable
//! 3. `<platform config dir>/encore/config.toml`
//! 4. Compiled defaults

use crate::events::{Difficulty, Instrument};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ENCORE_CONFIG";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub room: RoomSettings,

    #[serde(default)]
    pub judgment: JudgmentConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub charts: ChartsConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Who may move the room phase
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityPolicy {
    /// Only `game_update`s from a known singer are applied
    #[default]
    DriverOnly,
    /// Any participant's `game_update` is applied (cooperative)
    Advisory,
}

/// Room sync and presentation-buffer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Broadcast channel capacity per room
    pub channel_capacity: usize,
    /// How long a received call stays in the recent-calls buffer
    pub call_display_ms: i64,
    pub max_recent_calls: usize,
    /// How long a chat message stays in the recent-messages buffer
    pub message_display_ms: i64,
    pub max_recent_messages: usize,
    /// Lead between `ready → countdown` and the scheduled start
    pub countdown_lead_ms: i64,
    pub authority: AuthorityPolicy,
    pub excitement_per_call: f64,
    pub excitement_per_request: f64,
    pub excitement_per_completed_request: f64,
    /// Score points per excitement point
    pub score_per_excitement: f64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            call_display_ms: 3_000,
            max_recent_calls: 10,
            message_display_ms: 8_000,
            max_recent_messages: 20,
            countdown_lead_ms: 3_000,
            authority: AuthorityPolicy::DriverOnly,
            excitement_per_call: 2.0,
            excitement_per_request: 10.0,
            excitement_per_completed_request: 5.0,
            score_per_excitement: 10.0,
        }
    }
}

/// Timing windows (half-width, ms), narrowest first
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JudgmentConfig {
    pub perfect_ms: i64,
    pub great_ms: i64,
    pub good_ms: i64,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            perfect_ms: 100,
            great_ms: 180,
            good_ms: 300,
        }
    }
}

/// One step of the combo multiplier ladder
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ComboStep {
    pub min_combo: u32,
    /// Multiplier in percent (120 = x1.2)
    pub percent: u32,
}

/// Point tables; multipliers are integer percentages so scoring stays exact
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringConfig {
    pub tap_points: u64,
    pub hold_points: u64,
    pub special_points: u64,
    pub perfect_percent: u32,
    pub great_percent: u32,
    pub good_percent: u32,
    pub combo_steps: Vec<ComboStep>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tap_points: 30,
            hold_points: 50,
            special_points: 100,
            perfect_percent: 200,
            great_percent: 150,
            good_percent: 100,
            combo_steps: vec![
                ComboStep { min_combo: 100, percent: 300 },
                ComboStep { min_combo: 50, percent: 200 },
                ComboStep { min_combo: 30, percent: 150 },
                ComboStep { min_combo: 10, percent: 120 },
            ],
        }
    }
}

/// Note density (notes per beat) per difficulty and instrument
///
/// A (difficulty, instrument) pair without an entry has no chart.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ChartsConfig {
    pub density: BTreeMap<Difficulty, BTreeMap<Instrument, f64>>,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        let easy: BTreeMap<Instrument, f64> = [
            (Instrument::Drums, 1.0),
            (Instrument::Guitar, 0.5),
            (Instrument::Keyboard, 0.25),
            (Instrument::Bass, 0.5),
        ]
        .into_iter()
        .collect();
        let normal = easy.iter().map(|(i, d)| (*i, d * 2.0)).collect();

        let mut density = BTreeMap::new();
        density.insert(Difficulty::Easy, easy);
        density.insert(Difficulty::Normal, normal);
        Self { density }
    }
}

impl ChartsConfig {
    pub fn density_for(&self, difficulty: Difficulty, instrument: Instrument) -> Option<f64> {
        self.density
            .get(&difficulty)
            .and_then(|m| m.get(&instrument))
            .copied()
    }
}

/// Relay service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5780,
            keep_alive_secs: 15,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn parse(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Resolve the config file by priority and load it
    ///
    /// An explicit CLI path that does not exist is an error. Any other
    /// missing file falls back to compiled defaults with a warning.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            info!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                info!("Loading config from {} ({})", path.display(), CONFIG_ENV_VAR);
                return Self::from_file(&path);
            }
            warn!(
                "{} points at missing file {}, ignoring",
                CONFIG_ENV_VAR,
                path.display()
            );
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        warn!("No config file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        let j = &self.judgment;
        if !(0 < j.perfect_ms && j.perfect_ms <= j.great_ms && j.great_ms <= j.good_ms) {
            return Err(Error::Config(format!(
                "judgment windows must be nested: 0 < perfect ({}) <= great ({}) <= good ({})",
                j.perfect_ms, j.great_ms, j.good_ms
            )));
        }

        if self.room.channel_capacity == 0 {
            return Err(Error::Config("room.channel_capacity must be > 0".to_string()));
        }
        if self.room.countdown_lead_ms < 0 {
            return Err(Error::Config("room.countdown_lead_ms must be >= 0".to_string()));
        }
        if self.room.score_per_excitement <= 0.0 {
            return Err(Error::Config("room.score_per_excitement must be > 0".to_string()));
        }

        for (difficulty, instruments) in &self.charts.density {
            for (instrument, density) in instruments {
                if !(*density > 0.0 && density.is_finite()) {
                    return Err(Error::Config(format!(
                        "charts.{}.{} density must be > 0, got {}",
                        difficulty, instrument, density
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("encore").join("config.toml"))
}
