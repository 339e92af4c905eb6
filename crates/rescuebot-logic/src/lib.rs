//! Pure search logic for the rescue bot.
//!
//! A bot is dropped on a procedurally generated ship with one or two crew
//! members hidden somewhere in it. It cannot see them. Each tick it listens
//! for a beep whose chance decays exponentially with distance, updates a
//! Bayesian posterior over where the crew could be, and walks toward the
//! most likely place. Everything here is synchronous and engine-free:
//! functions take plain data and an `rand::Rng`, so trials are reproducible
//! from a seed.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Per-tick decision loop (sense, update, select, move, rescue) |
//! | [`config`] | Trial configuration and validation |
//! | [`constants`] | Defaults, validation limits, numeric tolerances |
//! | [`error`] | Configuration errors, invariant violations, diagnostics |
//! | [`grid`] | Cells, maze generation, neighbor enumeration |
//! | [`hypothesis`] | Single-cell and cell-pair posteriors with deferred renormalization |
//! | [`pathfinding`] | BFS over open cells with a bounded path cache |
//! | [`sensor`] | Beep likelihood tables and sampling |
//! | [`ship`] | Bot and crew placement, per-cell beep profile |
//! | [`trial`] | Trial entry points and results |
//!
//! ```
//! use rescuebot_logic::config::SearchConfig;
//! use rescuebot_logic::trial::{run_trial, Outcome};
//!
//! let result = run_trial(&SearchConfig::new(8, 0.1, 1).with_seed(1)).unwrap();
//! assert_eq!(result.outcome, Outcome::Success);
//! ```

pub mod agent;
pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod hypothesis;
pub mod pathfinding;
pub mod sensor;
pub mod ship;
pub mod trial;
