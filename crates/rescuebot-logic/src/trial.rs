//! Trial entry points.
//!
//! [`run_trial`] validates a [`SearchConfig`], generates a ship from the
//! seed, places the bot and crew, and drives an [`Agent`] until every crew
//! member is found, the bot is caught, or `max_ticks` runs out.
//! [`run_lineup`] searches one placed ship once per entry of [`LINEUP`] so
//! the strategies can be compared on identical layouts.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, TickOutcome};
use crate::config::{validate_config, SearchConfig, Strategy};
use crate::constants::limits;
use crate::error::SearchError;
use crate::grid::Grid;
use crate::sensor::SensorProfile;
use crate::ship::Ship;

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Caught,
    /// Hit `max_ticks` before finding everyone.
    Stuck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub seed: u64,
    /// Bot to first crew, plus first to second crew when there are two.
    pub initial_distance: usize,
    pub total_ticks: u64,
    pub idle_ticks: u64,
    pub outcome: Outcome,
}

impl TrialResult {
    /// Ticks spent moving.
    pub fn moves(&self) -> u64 {
        self.total_ticks - self.idle_ticks
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Crew count and posterior form for each run of [`run_lineup`]: one crew,
/// two crew sharing a cell posterior, two crew with a pair posterior.
pub const LINEUP: [(usize, Strategy); 3] = [
    (1, Strategy::Cells),
    (2, Strategy::Cells),
    (2, Strategy::Pairs),
];

/// One entry of a [`run_lineup`] comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub crew_count: usize,
    pub strategy: Strategy,
    pub result: TrialResult,
}

fn check(config: &SearchConfig) -> Result<(), SearchError> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SearchError::InvalidConfig(errors))
    }
}

/// Run one trial on a freshly generated ship.
///
/// Without a seed in `config` one is drawn from the thread RNG and reported
/// back in [`TrialResult::seed`].
pub fn run_trial(config: &SearchConfig) -> Result<TrialResult, SearchError> {
    check(config)?;
    let seed = config
        .seed
        .unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = StdRng::seed_from_u64(seed);

    let sensor = SensorProfile::new(config.decay_constant, config.grid_size)?;
    let grid = Grid::generate(config.grid_size, &mut rng);
    let ship = Ship::place(grid, config.crew_count, &sensor, &mut rng)?;

    let mut result = run_trial_on(ship, sensor, config, &mut rng)?;
    result.seed = seed;
    Ok(result)
}

/// Place two crew on one generated ship and search a fresh copy of it for
/// every [`LINEUP`] entry. The one-crew run only looks for the first member.
///
/// `crew_count` and `strategy` in `config` are overridden per run. Every run
/// draws its beeps from an RNG seeded with the same seed.
pub fn run_lineup(config: &SearchConfig) -> Result<Vec<StrategyRun>, SearchError> {
    check(config)?;
    let seed = config
        .seed
        .unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = StdRng::seed_from_u64(seed);

    let sensor = SensorProfile::new(config.decay_constant, config.grid_size)?;
    let grid = Grid::generate(config.grid_size, &mut rng);
    let ship = Ship::place(grid, limits::MAX_CREW, &sensor, &mut rng)?;

    LINEUP
        .iter()
        .map(|&(crew_count, strategy)| {
            let mut copy = ship.clone();
            copy.truncate_crew(crew_count);
            let run_config = SearchConfig {
                crew_count,
                strategy,
                seed: Some(seed),
                ..config.clone()
            };
            let mut run_rng = StdRng::seed_from_u64(seed);
            let result = run_trial_on(copy, sensor.clone(), &run_config, &mut run_rng)?;
            info!(
                "lineup {} crew / {}: {:?} in {} ticks",
                crew_count,
                strategy.label(),
                result.outcome,
                result.total_ticks
            );
            Ok(StrategyRun {
                crew_count,
                strategy,
                result,
            })
        })
        .collect()
}

/// Run one trial on a prepared ship.
///
/// Only `idle_beep_count`, `detection_zone`, `max_ticks` and `strategy` are
/// read from `config`; the ship and sensor already fix the rest. The reported seed is
/// `config.seed`, or zero.
pub fn run_trial_on(
    ship: Ship,
    sensor: SensorProfile,
    config: &SearchConfig,
    rng: &mut impl Rng,
) -> Result<TrialResult, SearchError> {
    check(config)?;
    let initial_distance = ship.initial_distance();
    info!(
        "trial start: bot {} looking for {} crew, {} open cells, alpha {}",
        ship.bot(),
        ship.crew_count(),
        ship.grid().open_count(),
        sensor.alpha()
    );

    let mut agent = Agent::new(ship, sensor, config)?;
    let outcome = loop {
        if agent.ticks() >= config.max_ticks {
            warn!(
                "no rescue after {} ticks, {} hypotheses still live",
                agent.ticks(),
                agent.store().len()
            );
            break Outcome::Stuck;
        }
        match agent.tick(rng)? {
            TickOutcome::Continue => {}
            TickOutcome::Rescued => break Outcome::Success,
            TickOutcome::Caught => break Outcome::Caught,
        }
    };

    let result = TrialResult {
        seed: config.seed.unwrap_or_default(),
        initial_distance,
        total_ticks: agent.ticks(),
        idle_ticks: agent.idle_ticks(),
        outcome,
    };
    info!(
        "trial end: {:?} after {} ticks ({} moving), initial distance {}",
        result.outcome,
        result.total_ticks,
        result.moves(),
        result.initial_distance
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::grid::Coord;

    #[test]
    fn test_invalid_config_rejected() {
        let config = SearchConfig::new(1, -1.0, 3);
        match run_trial(&config) {
            Err(SearchError::InvalidConfig(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_seeded_trial_succeeds() {
        let config = SearchConfig::new(8, 0.1, 1).with_seed(42);
        let result = run_trial(&config).unwrap();
        assert_eq!(result.seed, 42);
        assert_eq!(result.outcome, Outcome::Success);
        assert!(result.total_ticks >= result.idle_ticks);
        assert!(result.initial_distance >= 1);
    }

    #[test]
    fn test_deterministic_for_seed() {
        for crew in [1, 2] {
            let config = SearchConfig::new(10, 0.05, crew).with_seed(7);
            assert_eq!(run_trial(&config).unwrap(), run_trial(&config).unwrap());
        }
    }

    #[test]
    fn test_unseeded_trial_reports_its_seed() {
        let config = SearchConfig::new(6, 0.1, 2);
        let first = run_trial(&config).unwrap();
        let replay = run_trial(&config.clone().with_seed(first.seed)).unwrap();
        assert_eq!(first, replay);
    }

    #[test]
    fn test_tick_ceiling_reports_stuck() {
        // The first move cannot happen before the idle threshold
        let config = SearchConfig::new(10, 0.02, 1).with_seed(3).with_max_ticks(2);
        let result = run_trial(&config).unwrap();
        assert_eq!(result.outcome, Outcome::Stuck);
        assert_eq!(result.total_ticks, 2);
        assert_eq!(result.idle_ticks, 2);
    }

    #[test]
    fn test_run_on_fixed_ship() {
        let grid = Grid::from_layout(&["...", ".#.", "..."]).unwrap();
        let sensor = SensorProfile::new(0.1, 3).unwrap();
        let ship = Ship::with_positions(grid, Coord::new(0, 0), &[Coord::new(2, 2)], &sensor)
            .unwrap();
        let config = SearchConfig::default().with_seed(9);
        let result = run_trial_on(ship, sensor, &config, &mut StdRng::seed_from_u64(9)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.initial_distance, 4);
        assert_eq!(result.seed, 9);
    }

    #[test]
    fn test_cell_strategy_rescues_two_crew() {
        for seed in 0..5 {
            let config = SearchConfig::new(10, 0.05, 2)
                .with_strategy(Strategy::Cells)
                .with_seed(seed);
            let result = run_trial(&config).unwrap();
            assert_eq!(result.outcome, Outcome::Success, "seed {seed}");
        }
    }

    #[test]
    fn test_lineup_shares_one_ship() {
        let config = SearchConfig::new(10, 0.05, 1).with_seed(17);
        let runs = run_lineup(&config).unwrap();
        assert_eq!(runs.len(), LINEUP.len());
        for (run, &(crew_count, strategy)) in runs.iter().zip(LINEUP.iter()) {
            assert_eq!(run.crew_count, crew_count);
            assert_eq!(run.strategy, strategy);
            assert_eq!(run.result.seed, 17);
            assert!(run.result.is_success());
        }
        // Same bot and crew: the two-crew runs share a starting distance that
        // extends the one-crew run's
        assert_eq!(runs[1].result.initial_distance, runs[2].result.initial_distance);
        assert!(runs[0].result.initial_distance < runs[1].result.initial_distance);
        assert_eq!(runs, run_lineup(&config).unwrap());
    }

    #[test]
    fn test_lineup_rejects_invalid_config() {
        assert!(matches!(
            run_lineup(&SearchConfig::new(1, 0.1, 1)),
            Err(SearchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_run_on_rejects_zero_ticks() {
        let grid = Grid::from_layout(&["..", ".."]).unwrap();
        let sensor = SensorProfile::new(0.1, 2).unwrap();
        let ship = Ship::with_positions(grid, Coord::new(0, 0), &[Coord::new(1, 1)], &sensor)
            .unwrap();
        let config = SearchConfig::default().with_max_ticks(0);
        let err = run_trial_on(ship, sensor, &config, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(
            err,
            SearchError::InvalidConfig(ref e) if e == &vec![ConfigError::ZeroMaxTicks]
        ));
    }
}
