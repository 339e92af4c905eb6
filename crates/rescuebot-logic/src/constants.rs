//! Search constants: defaults, limits and tolerances.
//!
//! Plain constants with no runtime dependency. Both the logic crate and
//! the simtest harness use these.

/// Default values for a [`crate::config::SearchConfig`].
pub mod defaults {
    /// Ship side length in cells.
    pub const GRID_SIZE: usize = 35;
    /// Beep decay constant α. Large values make distant crew inaudible.
    pub const DECAY_CONSTANT: f64 = 0.02;
    /// Number of crew members hidden on the ship.
    pub const CREW_COUNT: usize = 2;
    /// Ticks spent listening before the bot is forced to move.
    pub const IDLE_BEEP_COUNT: u32 = 5;
    /// Hazard detection radius (inert).
    pub const DETECTION_ZONE: usize = 0;
    /// Hard ceiling on ticks per trial.
    pub const MAX_TICKS: u64 = 10_000;
    /// Path cache capacity for the planner.
    pub const PATH_CACHE_CAPACITY: usize = 256;
}

/// Validation limits for configuration values.
pub mod limits {
    pub const MIN_GRID_SIZE: usize = 2;
    pub const MAX_GRID_SIZE: usize = 100;
    pub const MIN_CREW: usize = 1;
    pub const MAX_CREW: usize = 2;
}

/// Numeric tolerances used by the hypothesis store.
pub mod tolerance {
    /// Two posteriors closer than this are treated as tied.
    pub const TIE_EPSILON: f64 = 1e-12;
    /// Mass at or below this has underflowed and forces a uniform re-prior.
    pub const MASS_UNDERFLOW: f64 = 1e-300;
    /// Allowed drift of the total posterior mass from 1.
    pub const CONSERVATION: f64 = 1e-9;
}
