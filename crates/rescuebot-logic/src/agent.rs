//! The rescue bot's decision loop.
//!
//! Every tick runs the same phases in order:
//!
//! 1. **Sensing**: sample a beep for the crew still missing.
//! 2. **Updating**: on silence, drop adjacent candidates (a crew member one
//!    step away always beeps), then run the Bayesian update.
//! 3. **SelectingTarget**: only while the bot is not mid-route. Pick among
//!    the most probable hypotheses with the beep-frequency heuristic.
//! 4. **Moving**: advance one cell along the route, if mid-route or forced
//!    after `idle_beep_count` quiet ticks.
//! 5. **CheckingRescue**: rescue crew on arrival, or strike the cell off.

use std::collections::VecDeque;

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{SearchConfig, Strategy};
use crate::error::{Diagnostics, InvariantViolation, SearchError};
use crate::grid::Coord;
use crate::hypothesis::{Candidate, HypothesisStore};
use crate::pathfinding::PathPlanner;
use crate::sensor::{Reading, SensorProfile};
use crate::ship::Ship;

/// Top hypotheses kept in a failure snapshot.
const DIAGNOSTIC_TOP: usize = 5;

/// Where the agent is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Sensing,
    Updating,
    SelectingTarget,
    Moving,
    CheckingRescue,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Every crew member has been found.
    Rescued,
    /// The bot walked into a hazard.
    Caught,
}

/// Pick one of the maximal candidates by comparing beep rates.
///
/// `ranked` must be sorted farthest first. A falling rate means the bot is
/// moving away from the source, so it commits to the farthest candidate; a
/// rising rate picks the nearest. Anything else, including a current rate of
/// zero, is a uniform random pick.
pub fn pick_by_frequency<'a>(
    ranked: &'a [Candidate],
    current: Option<f64>,
    previous: Option<f64>,
    rng: &mut impl Rng,
) -> Option<&'a Candidate> {
    // A silent current cell says nothing yet
    let current = current.filter(|&rate| rate > 0.0);
    match (current, previous) {
        (Some(cur), Some(prev)) if cur < prev => ranked.first(),
        (Some(cur), Some(prev)) if cur > prev => ranked.last(),
        _ => ranked.choose(rng),
    }
}

#[derive(Debug)]
pub struct Agent {
    ship: Ship,
    sensor: SensorProfile,
    store: HypothesisStore,
    planner: PathPlanner,
    last: Option<Coord>,
    /// Crew index still missing once the other was found.
    pending: Option<usize>,
    route: VecDeque<Coord>,
    destinations: VecDeque<Coord>,
    keep_moving: bool,
    recalc: bool,
    force_move: bool,
    beep_counter: u32,
    idle_beep_count: u32,
    detection_zone: usize,
    ticks: u64,
    idle_ticks: u64,
    phase: Phase,
    traversed: Vec<Coord>,
}

impl Agent {
    /// Start a search on a placed ship with a uniform prior over every open
    /// cell except the bot's.
    pub fn new(ship: Ship, sensor: SensorProfile, config: &SearchConfig) -> Result<Self, SearchError> {
        let tracked = match config.strategy {
            Strategy::Pairs => ship.remaining_crew(),
            Strategy::Cells => 1,
        };
        let store = match HypothesisStore::new(ship.candidate_cells(), tracked) {
            Ok(store) => store,
            Err(violation) => {
                return Err(SearchError::Invariant {
                    violation,
                    context: Box::new(Diagnostics {
                        tick: 0,
                        phase: Phase::Sensing,
                        bot: ship.bot(),
                        crews: ship.crews().iter().map(|c| c.cell).collect(),
                        pending: None,
                        live_hypotheses: 0,
                        top_hypotheses: Vec::new(),
                        destinations: Vec::new(),
                        path_traversed: vec![ship.bot()],
                    }),
                })
            }
        };

        let bot = ship.bot();
        Ok(Self {
            ship,
            sensor,
            store,
            planner: PathPlanner::new(),
            last: None,
            pending: None,
            route: VecDeque::new(),
            destinations: VecDeque::new(),
            keep_moving: false,
            recalc: true,
            force_move: false,
            beep_counter: 0,
            idle_beep_count: config.idle_beep_count,
            detection_zone: config.detection_zone,
            ticks: 0,
            idle_ticks: 0,
            phase: Phase::Sensing,
            traversed: vec![bot],
        })
    }

    pub fn ship(&self) -> &Ship {
        &self.ship
    }

    pub fn store(&self) -> &HypothesisStore {
        &self.store
    }

    pub fn sensor(&self) -> &SensorProfile {
        &self.sensor
    }

    pub fn bot(&self) -> Coord {
        self.ship.bot()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks
    }

    pub fn destinations(&self) -> impl Iterator<Item = Coord> + '_ {
        self.destinations.iter().copied()
    }

    pub fn route(&self) -> impl Iterator<Item = Coord> + '_ {
        self.route.iter().copied()
    }

    pub fn traversed(&self) -> &[Coord] {
        &self.traversed
    }

    /// Snapshot of the agent for error reports.
    pub fn diagnostics(&self) -> Diagnostics {
        let bot = self.ship.bot();
        Diagnostics {
            tick: self.ticks,
            phase: self.phase,
            bot,
            crews: self.ship.crews().iter().map(|c| c.cell).collect(),
            pending: self.pending,
            live_hypotheses: self.store.len(),
            top_hypotheses: self.store.top(bot, DIAGNOSTIC_TOP),
            destinations: self.destinations.iter().copied().collect(),
            path_traversed: self.traversed.clone(),
        }
    }

    fn abort(&self, violation: InvariantViolation) -> SearchError {
        SearchError::Invariant {
            violation,
            context: Box::new(self.diagnostics()),
        }
    }

    /// Run one full sense → update → select → move → check cycle.
    pub fn tick(&mut self, rng: &mut impl Rng) -> Result<TickOutcome, SearchError> {
        self.ticks += 1;
        let bot = self.ship.bot();

        self.phase = Phase::Sensing;
        let heard = self.ship.crew_beep(bot, self.pending, rng);
        self.ship.record_beep(heard);
        let reading = Reading::from_heard(heard);

        self.phase = Phase::Updating;
        if !heard {
            self.smell_neighbors()?;
        }
        let update = self
            .store
            .observe(bot, &self.sensor, reading)
            .map_err(|v| self.abort(v))?;
        debug!(
            "tick {}: bot {} heard {}, {} live, P(beep) {:.4}",
            self.ticks,
            bot,
            reading,
            self.store.len(),
            update.beep_mass
        );

        if self.recalc {
            self.phase = Phase::SelectingTarget;
            self.select_destinations(rng)?;
        }

        self.phase = Phase::Moving;
        let moved = if self.keep_moving || self.force_move {
            self.step()?
        } else {
            false
        };
        self.force_move = false;

        if moved {
            self.phase = Phase::CheckingRescue;
            if let Some(outcome) = self.check_arrival()? {
                return Ok(outcome);
            }
            self.beep_counter = 0;
            self.ship.reset_detection_zone(self.detection_zone);
        } else {
            self.idle_ticks += 1;
        }

        self.beep_counter += 1;
        if self.beep_counter >= self.idle_beep_count.saturating_sub(1) {
            self.force_move = true;
            self.update_move_flags();
        }

        Ok(TickOutcome::Continue)
    }

    fn update_move_flags(&mut self) {
        self.keep_moving = !self.route.is_empty() || !self.destinations.is_empty();
        self.recalc = !self.keep_moving;
    }

    /// Silence rules out every adjacent candidate.
    fn smell_neighbors(&mut self) -> Result<(), SearchError> {
        let bot = self.ship.bot();
        let ruled_out: Vec<Coord> = self
            .ship
            .grid()
            .open_neighbors(bot)
            .filter(|&n| self.store.contains_cell(n))
            .collect();

        for cell in ruled_out {
            self.store.remove_cell(cell).map_err(|v| self.abort(v))?;
            self.destinations.retain(|&d| d != cell);
            if self.route.back() == Some(&cell) {
                self.route.clear();
            }
            if self.keep_moving {
                self.update_move_flags();
            }
            debug!("silence at {bot} rules out {cell}");
        }
        Ok(())
    }

    fn select_destinations(&mut self, rng: &mut impl Rng) -> Result<(), SearchError> {
        let bot = self.ship.bot();
        let mut ranked = self.store.best(bot);
        if ranked.is_empty() {
            return Err(self.abort(InvariantViolation::EmptyHypotheses));
        }
        ranked.sort_by(|a, b| b.distance.cmp(&a.distance));

        let current = self.ship.beep_rate(bot);
        let previous = self.last.and_then(|c| self.ship.beep_rate(c));
        if let Some(chosen) = pick_by_frequency(&ranked, current, previous, rng) {
            self.destinations = chosen.hypothesis.visit_order(bot).into();
            debug!(
                "selected {:?} (p = {:.4}) from {} tied",
                chosen.hypothesis,
                chosen.probability,
                ranked.len()
            );
        }
        Ok(())
    }

    /// Advance one cell, planning a route to the next live destination first
    /// if needed. Returns false when there is nowhere to go.
    fn step(&mut self) -> Result<bool, SearchError> {
        let bot = self.ship.bot();
        if self.route.is_empty() {
            while let Some(dest) = self.destinations.pop_front() {
                if !self.store.contains_cell(dest) {
                    continue;
                }
                let path = self
                    .planner
                    .find_path(self.ship.grid(), bot, dest)
                    .ok_or_else(|| self.abort(InvariantViolation::Unreachable { from: bot, to: dest }))?;
                self.route = path.into_iter().skip(1).collect();
                break;
            }
        }

        let Some(next) = self.route.pop_front() else {
            // Every queued destination went stale: let the next tick reselect
            self.update_move_flags();
            return Ok(false);
        };
        self.last = Some(bot);
        self.ship.move_bot(next);
        self.traversed.push(next);
        self.update_move_flags();
        Ok(true)
    }

    fn check_arrival(&mut self) -> Result<Option<TickOutcome>, SearchError> {
        let bot = self.ship.bot();
        self.destinations.retain(|&d| d != bot);
        self.update_move_flags();

        if let Some(index) = self.ship.unfound_crew_at(bot) {
            self.ship.mark_found(index);
            info!(
                "found crew {index} at {bot} after {} ticks ({} idle)",
                self.ticks, self.idle_ticks
            );
            if self.ship.remaining_crew() == 0 {
                return Ok(Some(TickOutcome::Rescued));
            }
            self.pending = self.ship.crews().iter().position(|c| !c.found);
            if self.store.is_paired() {
                self.store.collapse_on(bot).map_err(|v| self.abort(v))?;
            } else {
                self.store.remove_cell(bot).map_err(|v| self.abort(v))?;
            }
        } else {
            self.store.remove_cell(bot).map_err(|v| self.abort(v))?;
        }

        if self.ship.is_caught() {
            info!("bot caught at {bot} after {} ticks", self.ticks);
            return Ok(Some(TickOutcome::Caught));
        }
        Ok(None)
    }
}
