//! Error types for a search trial.
//!
//! Configuration problems are rejected before the first tick. Invariant
//! violations abort a running trial and carry a [`Diagnostics`] snapshot of
//! the agent at the moment things went wrong.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::agent::Phase;
use crate::config::ConfigError;
use crate::grid::Coord;
use crate::hypothesis::Candidate;
use crate::sensor::Reading;

/// A broken internal invariant of the hypothesis store or the agent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("no live hypotheses remain")]
    EmptyHypotheses,
    #[error("{event} normalizer is zero across {live} hypotheses")]
    ZeroNormalizer { event: Reading, live: usize },
    #[error("no path from {from} to {to}")]
    Unreachable { from: Coord, to: Coord },
    #[error("rescue at {0}, which is not a live candidate")]
    UnknownRescueCell(Coord),
}

/// Agent state captured when a trial aborts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub tick: u64,
    pub phase: Phase,
    pub bot: Coord,
    pub crews: Vec<Coord>,
    pub pending: Option<usize>,
    pub live_hypotheses: usize,
    pub top_hypotheses: Vec<Candidate>,
    pub destinations: Vec<Coord>,
    pub path_traversed: Vec<Coord>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {} during {:?}: bot at {}, crew at [",
            self.tick, self.phase, self.bot
        )?;
        for (i, crew) in self.crews.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{crew}")?;
        }
        write!(
            f,
            "], {} live hypotheses, {} queued destinations, {} cells traversed",
            self.live_hypotheses,
            self.destinations.len(),
            self.path_traversed.len()
        )
    }
}

/// Everything that can stop a trial from producing a [`crate::trial::TrialResult`].
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0:?}")]
    InvalidConfig(Vec<ConfigError>),
    #[error("ship has {open} open cells, needs at least {needed}")]
    NotEnoughOpenCells { open: usize, needed: usize },
    #[error("{violation} at {context}")]
    Invariant {
        violation: InvariantViolation,
        context: Box<Diagnostics>,
    },
}

impl From<ConfigError> for SearchError {
    fn from(e: ConfigError) -> Self {
        SearchError::InvalidConfig(vec![e])
    }
}

impl SearchError {
    /// The invariant that aborted the trial, if any.
    pub fn violation(&self) -> Option<&InvariantViolation> {
        match self {
            SearchError::Invariant { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_diagnostics() -> Diagnostics {
        Diagnostics {
            tick: 17,
            phase: Phase::Moving,
            bot: Coord::new(1, 2),
            crews: vec![Coord::new(3, 3), Coord::new(0, 4)],
            pending: None,
            live_hypotheses: 5,
            top_hypotheses: Vec::new(),
            destinations: vec![Coord::new(3, 3)],
            path_traversed: vec![Coord::new(1, 1), Coord::new(1, 2)],
        }
    }

    #[test]
    fn test_violation_messages() {
        assert_eq!(
            InvariantViolation::Unreachable {
                from: Coord::new(0, 0),
                to: Coord::new(2, 2)
            }
            .to_string(),
            "no path from (0, 0) to (2, 2)"
        );
        assert_eq!(
            InvariantViolation::ZeroNormalizer {
                event: Reading::Silence,
                live: 4
            }
            .to_string(),
            "no-beep normalizer is zero across 4 hypotheses"
        );
    }

    #[test]
    fn test_invariant_error_carries_context() {
        let err = SearchError::Invariant {
            violation: InvariantViolation::EmptyHypotheses,
            context: Box::new(sample_diagnostics()),
        };
        assert_eq!(err.violation(), Some(&InvariantViolation::EmptyHypotheses));
        let text = err.to_string();
        assert!(text.starts_with("no live hypotheses remain at tick 17"));
        assert!(text.contains("crew at [(3, 3), (0, 4)]"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: SearchError = ConfigError::ZeroMaxTicks.into();
        assert!(matches!(err, SearchError::InvalidConfig(ref v) if v.len() == 1));
        assert!(err.violation().is_none());
    }
}
