//! Trial configuration and validation.
//!
//! A [`SearchConfig`] carries every knob a trial reads: ship size, the beep
//! decay constant, how many crew are hidden, the idle threshold before the
//! bot is forced to move, the (inert) hazard detection radius, and the tick
//! ceiling, plus the [`Strategy`] used to track two crew at once.
//! Validation collects every problem instead of stopping at the first one.
//!
//! ```
//! use rescuebot_logic::config::{validate_config, SearchConfig};
//!
//! let config = SearchConfig::new(10, 0.05, 1).with_seed(42);
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{defaults, limits};
use crate::grid::Coord;

/// How the posterior tracks crew while two are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// One distribution over single cells shared by every missing crew
    /// member. Beeps from both crew are OR-ed into one reading.
    Cells,
    /// Joint distribution over unordered cell pairs, collapsed to single
    /// cells after the first rescue.
    #[default]
    Pairs,
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::Cells => "cells",
            Strategy::Pairs => "pairs",
        }
    }
}

/// Everything a single trial needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ship side length in cells.
    pub grid_size: usize,
    /// Beep decay constant α.
    pub decay_constant: f64,
    /// Crew members to rescue (1 or 2).
    pub crew_count: usize,
    /// Ticks the bot listens before it is forced to move.
    pub idle_beep_count: u32,
    /// Hazard detection radius. The hazard subsystem is inert.
    pub detection_zone: usize,
    /// Ticks after which the trial is declared stuck.
    pub max_ticks: u64,
    /// Posterior form for two crew. Ignored with one.
    #[serde(default)]
    pub strategy: Strategy,
    /// RNG seed (None = draw one).
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            grid_size: defaults::GRID_SIZE,
            decay_constant: defaults::DECAY_CONSTANT,
            crew_count: defaults::CREW_COUNT,
            idle_beep_count: defaults::IDLE_BEEP_COUNT,
            detection_zone: defaults::DETECTION_ZONE,
            max_ticks: defaults::MAX_TICKS,
            strategy: Strategy::default(),
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn new(grid_size: usize, decay_constant: f64, crew_count: usize) -> Self {
        Self {
            grid_size,
            decay_constant,
            crew_count,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_idle_beep_count(mut self, idle_beep_count: u32) -> Self {
        self.idle_beep_count = idle_beep_count;
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_detection_zone(mut self, detection_zone: usize) -> Self {
        self.detection_zone = detection_zone;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Grid side length outside the supported range.
    #[error(
        "grid size {0} outside {min}..={max}",
        min = limits::MIN_GRID_SIZE,
        max = limits::MAX_GRID_SIZE
    )]
    GridSizeOutOfRange(usize),
    /// Decay constant negative, NaN or infinite.
    #[error("decay constant {0} must be finite and non-negative")]
    InvalidDecayConstant(f64),
    /// Crew count other than 1 or 2.
    #[error(
        "crew count {0} outside {min}..={max}",
        min = limits::MIN_CREW,
        max = limits::MAX_CREW
    )]
    InvalidCrewCount(usize),
    /// Idle threshold must allow at least one listening tick.
    #[error("idle beep count must be at least 1")]
    ZeroIdleBeepCount,
    /// Tick ceiling of zero would end every trial immediately.
    #[error("max ticks must be at least 1")]
    ZeroMaxTicks,
    /// Fixed placement on a closed or out-of-bounds cell.
    #[error("placement at {0} is not an open cell")]
    PlacementNotOpen(Coord),
    /// Fixed placement puts two occupants on one cell.
    #[error("placement at {0} is used twice")]
    DuplicatePlacement(Coord),
    /// Text layout row has the wrong width.
    #[error("layout row {row} has {found} cells, expected {expected}")]
    MalformedLayout {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Check a decay constant on its own. The sensor model re-runs this
/// whenever α changes.
pub fn validate_decay_constant(alpha: f64) -> Result<(), ConfigError> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDecayConstant(alpha))
    }
}

/// Validate a search configuration, returning all errors found.
pub fn validate_config(config: &SearchConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if !(limits::MIN_GRID_SIZE..=limits::MAX_GRID_SIZE).contains(&config.grid_size) {
        errors.push(ConfigError::GridSizeOutOfRange(config.grid_size));
    }
    if let Err(e) = validate_decay_constant(config.decay_constant) {
        errors.push(e);
    }
    if !(limits::MIN_CREW..=limits::MAX_CREW).contains(&config.crew_count) {
        errors.push(ConfigError::InvalidCrewCount(config.crew_count));
    }
    if config.idle_beep_count == 0 {
        errors.push(ConfigError::ZeroIdleBeepCount);
    }
    if config.max_ticks == 0 {
        errors.push(ConfigError::ZeroMaxTicks);
    }

    errors
}
