//! Posterior over where the unfound crew are.
//!
//! With one crew member left the store keeps a probability per candidate
//! cell. With two left it keeps one per unordered cell pair, stored once under
//! the lower coordinate, so `n` candidate cells give `n·(n−1)/2` pairs. A pair
//! stays silent only when both members stay silent:
//!
//! ```text
//! P(no beep | a, b) = P(no beep | a) · P(no beep | b)
//! ```
//!
//! Removing a hypothesis does not renormalize straight away. The removed mass
//! is subtracted from `remaining_mass` and the survivors are rescaled by
//! `1 / remaining_mass` at the start of the next update (the settle step).
//!
//! | Operation | Single | Paired |
//! |-----------|--------|--------|
//! | `observe` | O(n) | O(n²) |
//! | `remove_cell` | O(log n) | O(n log n) |
//! | `collapse_on` | no-op | O(n²) |

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::Serialize;

use crate::constants::tolerance::{MASS_UNDERFLOW, TIE_EPSILON};
use crate::error::InvariantViolation;
use crate::grid::Coord;
use crate::sensor::{Reading, SensorProfile};

/// Per-hypothesis probability record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrewProbs {
    /// P(crew here), the running posterior.
    pub prior: f64,
    /// P(beep | crew here) from the bot's current cell.
    pub beep_given_crew: f64,
    /// P(no beep | crew here) from the bot's current cell.
    pub no_beep_given_crew: f64,
    /// P(crew here, beep) of the last update.
    pub crew_and_beep: f64,
    /// P(crew here, no beep) of the last update.
    pub crew_and_no_beep: f64,
}

impl CrewProbs {
    fn with_prior(prior: f64) -> Self {
        Self {
            prior,
            ..Default::default()
        }
    }

    fn set_no_beep_likelihood(&mut self, no_beep: f64) {
        self.no_beep_given_crew = no_beep;
        self.beep_given_crew = 1.0 - no_beep;
    }

    fn refresh_joint(&mut self) {
        self.crew_and_beep = self.beep_given_crew * self.prior;
        self.crew_and_no_beep = self.no_beep_given_crew * self.prior;
    }

    fn joint(&self, reading: Reading) -> f64 {
        match reading {
            Reading::Beep => self.crew_and_beep,
            Reading::Silence => self.crew_and_no_beep,
        }
    }
}

/// Normalizers from one Bayesian update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
    /// Σ prior · P(beep | h).
    pub beep_mass: f64,
    /// Σ prior · P(no beep | h).
    pub no_beep_mass: f64,
    /// True when the update had to fall back to a uniform prior.
    pub reprior: bool,
}

impl Update {
    fn normalizer(&self, reading: Reading) -> f64 {
        match reading {
            Reading::Beep => self.beep_mass,
            Reading::Silence => self.no_beep_mass,
        }
    }
}

/// A single hypothesis: one cell, or an unordered pair with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hypothesis {
    Cell(Coord),
    Pair(Coord, Coord),
}

impl Hypothesis {
    /// Cells to visit for this hypothesis, in order.
    ///
    /// Pair members are ordered by descending `d(bot, m) + d(a, b)` so the
    /// farther member comes first. A member on the bot's own cell is skipped.
    pub fn visit_order(&self, bot: Coord) -> Vec<Coord> {
        match *self {
            Hypothesis::Cell(c) => {
                if c == bot {
                    Vec::new()
                } else {
                    vec![c]
                }
            }
            Hypothesis::Pair(a, b) => {
                let spread = a.manhattan(b);
                let mut members = [a, b];
                members.sort_by_key(|m| std::cmp::Reverse(bot.manhattan(*m) + spread));
                members.into_iter().filter(|&m| m != bot).collect()
            }
        }
    }

    pub fn contains(&self, cell: Coord) -> bool {
        match *self {
            Hypothesis::Cell(c) => c == cell,
            Hypothesis::Pair(a, b) => a == cell || b == cell,
        }
    }
}

/// A ranked hypothesis with its tie-break travel distance from the bot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub hypothesis: Hypothesis,
    pub probability: f64,
    pub distance: usize,
}

fn pair_distance(bot: Coord, a: Coord, b: Coord) -> usize {
    bot.manhattan(a).min(bot.manhattan(b)) + a.manhattan(b)
}

// ── Shared update steps ─────────────────────────────────────────────────

/// Zero, underflowed or NaN mass.
fn degenerate(mass: f64) -> bool {
    mass.is_nan() || mass <= MASS_UNDERFLOW
}

/// Apply pending removals by rescaling every prior by `1 / remaining_mass`.
/// Returns true when the mass had underflowed and a uniform prior was used.
fn settle(probs: &mut [&mut CrewProbs], remaining_mass: f64) -> bool {
    if degenerate(remaining_mass) || remaining_mass.is_infinite() {
        warn!(
            "remaining mass {remaining_mass:e} underflowed, re-priming {} hypotheses uniformly",
            probs.len()
        );
        set_uniform(probs);
        return true;
    }
    if (remaining_mass - 1.0).abs() > f64::EPSILON {
        for p in probs.iter_mut() {
            p.prior /= remaining_mass;
        }
    }
    false
}

fn set_uniform(probs: &mut [&mut CrewProbs]) {
    let uniform = 1.0 / probs.len() as f64;
    for p in probs.iter_mut() {
        p.prior = uniform;
    }
}

fn accumulate(probs: &mut [&mut CrewProbs]) -> Update {
    let mut update = Update {
        beep_mass: 0.0,
        no_beep_mass: 0.0,
        reprior: false,
    };
    for p in probs.iter_mut() {
        p.refresh_joint();
        update.beep_mass += p.crew_and_beep;
        update.no_beep_mass += p.crew_and_no_beep;
    }
    update
}

/// Bayes step over likelihoods already stored on each record.
fn posterior(probs: &mut [&mut CrewProbs], reading: Reading) -> Result<Update, InvariantViolation> {
    let live = probs.len();
    let mut update = accumulate(probs);

    if degenerate(update.normalizer(reading)) {
        warn!(
            "{reading} normalizer {:e} degenerate over {live} hypotheses, retrying with a uniform prior",
            update.normalizer(reading)
        );
        set_uniform(probs);
        update = accumulate(probs);
        update.reprior = true;
        if degenerate(update.normalizer(reading)) {
            return Err(InvariantViolation::ZeroNormalizer {
                event: reading,
                live,
            });
        }
    }

    let normalizer = update.normalizer(reading);
    let mut total = 0.0;
    for p in probs.iter_mut() {
        p.prior = p.joint(reading) / normalizer;
        total += p.prior;
    }
    if total > 0.0 {
        for p in probs.iter_mut() {
            p.prior /= total;
        }
    }
    Ok(update)
}

fn best_of(
    entries: impl Iterator<Item = (Hypothesis, f64, usize)>,
    scale: f64,
) -> Vec<Candidate> {
    let mut best: Vec<Candidate> = Vec::new();
    let mut max = f64::NEG_INFINITY;
    for (hypothesis, prior, distance) in entries {
        let probability = prior / scale;
        if probability > max + TIE_EPSILON {
            max = probability;
            best.clear();
        } else if probability > max {
            max = probability;
        }
        if probability >= max - TIE_EPSILON {
            best.push(Candidate {
                hypothesis,
                probability,
                distance,
            });
        }
    }
    // An early entry can sit inside the window of a later, slightly higher max
    best.retain(|c| c.probability >= max - TIE_EPSILON);
    best
}

fn effective_scale(remaining_mass: f64) -> f64 {
    if remaining_mass > MASS_UNDERFLOW {
        remaining_mass
    } else {
        1.0
    }
}

// ── Single target ───────────────────────────────────────────────────────

/// Posterior over single candidate cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTargetStore {
    cells: BTreeMap<Coord, CrewProbs>,
    remaining_mass: f64,
}

impl SingleTargetStore {
    /// Uniform prior over `candidates`.
    pub fn new(candidates: impl IntoIterator<Item = Coord>) -> Result<Self, InvariantViolation> {
        let set: BTreeSet<Coord> = candidates.into_iter().collect();
        if set.is_empty() {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        let uniform = 1.0 / set.len() as f64;
        Ok(Self {
            cells: set
                .into_iter()
                .map(|c| (c, CrewProbs::with_prior(uniform)))
                .collect(),
            remaining_mass: 1.0,
        })
    }

    /// Normalize arbitrary non-negative weights, uniform if they sum to zero.
    fn from_weights(weights: BTreeMap<Coord, f64>) -> Result<Self, InvariantViolation> {
        if weights.is_empty() {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        let total: f64 = weights.values().sum();
        let uniform = 1.0 / weights.len() as f64;
        if degenerate(total) {
            warn!(
                "collapsed mass {total:e} underflowed, re-priming {} candidates uniformly",
                weights.len()
            );
        }
        let cells = weights
            .into_iter()
            .map(|(c, w)| {
                let prior = if degenerate(total) { uniform } else { w / total };
                (c, CrewProbs::with_prior(prior))
            })
            .collect();
        Ok(Self {
            cells,
            remaining_mass: 1.0,
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Coord) -> bool {
        self.cells.contains_key(&cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        self.cells.keys().copied()
    }

    pub fn probs(&self, cell: Coord) -> Option<&CrewProbs> {
        self.cells.get(&cell)
    }

    pub fn remaining_mass(&self) -> f64 {
        self.remaining_mass
    }

    pub fn observe(
        &mut self,
        bot: Coord,
        sensor: &SensorProfile,
        reading: Reading,
    ) -> Result<Update, InvariantViolation> {
        if self.cells.is_empty() {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        for (coord, p) in self.cells.iter_mut() {
            p.set_no_beep_likelihood(sensor.no_beep_probability(bot.manhattan(*coord)));
        }
        let mut probs: Vec<&mut CrewProbs> = self.cells.values_mut().collect();
        let reprior = settle(&mut probs, self.remaining_mass);
        self.remaining_mass = 1.0;
        let mut update = posterior(&mut probs, reading)?;
        update.reprior |= reprior;
        Ok(update)
    }

    /// Drop `cell`. `Ok(false)` when it was not live.
    pub fn remove_cell(&mut self, cell: Coord) -> Result<bool, InvariantViolation> {
        let Some(p) = self.cells.remove(&cell) else {
            return Ok(false);
        };
        self.remaining_mass -= p.prior;
        if self.cells.is_empty() {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        Ok(true)
    }

    pub fn total_mass(&self) -> f64 {
        self.cells.values().map(|p| p.prior).sum()
    }

    pub fn renormalize(&mut self) -> bool {
        let mut probs: Vec<&mut CrewProbs> = self.cells.values_mut().collect();
        if probs.is_empty() {
            return false;
        }
        let reprior = settle(&mut probs, self.remaining_mass);
        self.remaining_mass = 1.0;
        reprior
    }

    pub fn cell_probability(&self, cell: Coord) -> f64 {
        self.cells
            .get(&cell)
            .map_or(0.0, |p| p.prior / effective_scale(self.remaining_mass))
    }

    pub fn best(&self, bot: Coord) -> Vec<Candidate> {
        best_of(
            self.cells
                .iter()
                .map(|(&c, p)| (Hypothesis::Cell(c), p.prior, bot.manhattan(c))),
            effective_scale(self.remaining_mass),
        )
    }

    fn ranked(&self, bot: Coord) -> Vec<Candidate> {
        let scale = effective_scale(self.remaining_mass);
        self.cells
            .iter()
            .map(|(&c, p)| Candidate {
                hypothesis: Hypothesis::Cell(c),
                probability: p.prior / scale,
                distance: bot.manhattan(c),
            })
            .collect()
    }
}

// ── Two targets ─────────────────────────────────────────────────────────

/// Joint posterior over unordered pairs of candidate cells.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedTargetStore {
    cells: BTreeSet<Coord>,
    /// `lower → higher → probs`, every pair stored once.
    pairs: BTreeMap<Coord, BTreeMap<Coord, CrewProbs>>,
    pair_count: usize,
    remaining_mass: f64,
}

impl PairedTargetStore {
    /// Uniform prior over every unordered pair of `candidates`.
    pub fn new(candidates: impl IntoIterator<Item = Coord>) -> Result<Self, InvariantViolation> {
        let cells: BTreeSet<Coord> = candidates.into_iter().collect();
        let n = cells.len();
        if n < 2 {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        let pair_count = n * (n - 1) / 2;
        let uniform = 1.0 / pair_count as f64;

        let mut pairs = BTreeMap::new();
        for &a in &cells {
            let inner: BTreeMap<Coord, CrewProbs> = cells
                .range((std::ops::Bound::Excluded(a), std::ops::Bound::Unbounded))
                .map(|&b| (b, CrewProbs::with_prior(uniform)))
                .collect();
            if !inner.is_empty() {
                pairs.insert(a, inner);
            }
        }

        Ok(Self {
            cells,
            pairs,
            pair_count,
            remaining_mass: 1.0,
        })
    }

    pub fn len(&self) -> usize {
        self.pair_count
    }

    pub fn is_empty(&self) -> bool {
        self.pair_count == 0
    }

    pub fn candidate_count(&self) -> usize {
        self.cells.len()
    }

    pub fn contains_cell(&self, cell: Coord) -> bool {
        self.cells.contains(&cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        self.cells.iter().copied()
    }

    /// Probability record for the pair `{a, b}` in either order.
    pub fn probs(&self, a: Coord, b: Coord) -> Option<&CrewProbs> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.pairs.get(&lo)?.get(&hi)
    }

    pub fn remaining_mass(&self) -> f64 {
        self.remaining_mass
    }

    fn iter(&self) -> impl Iterator<Item = (Coord, Coord, &CrewProbs)> + '_ {
        self.pairs
            .iter()
            .flat_map(|(&a, inner)| inner.iter().map(move |(&b, p)| (a, b, p)))
    }

    pub fn observe(
        &mut self,
        bot: Coord,
        sensor: &SensorProfile,
        reading: Reading,
    ) -> Result<Update, InvariantViolation> {
        if self.pair_count == 0 {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        for (&a, inner) in self.pairs.iter_mut() {
            let silent_a = sensor.no_beep_probability(bot.manhattan(a));
            for (&b, p) in inner.iter_mut() {
                p.set_no_beep_likelihood(silent_a * sensor.no_beep_probability(bot.manhattan(b)));
            }
        }
        let mut probs: Vec<&mut CrewProbs> = self
            .pairs
            .values_mut()
            .flat_map(|inner| inner.values_mut())
            .collect();
        let reprior = settle(&mut probs, self.remaining_mass);
        self.remaining_mass = 1.0;
        let mut update = posterior(&mut probs, reading)?;
        update.reprior |= reprior;
        Ok(update)
    }

    /// Drop every pair containing `cell`. `Ok(false)` when it was not live.
    pub fn remove_cell(&mut self, cell: Coord) -> Result<bool, InvariantViolation> {
        if !self.cells.remove(&cell) {
            return Ok(false);
        }

        let mut removed_mass = 0.0;
        let mut removed = 0;
        if let Some(inner) = self.pairs.remove(&cell) {
            removed += inner.len();
            removed_mass += inner.values().map(|p| p.prior).sum::<f64>();
        }
        for inner in self.pairs.range_mut(..cell).map(|(_, inner)| inner) {
            if let Some(p) = inner.remove(&cell) {
                removed += 1;
                removed_mass += p.prior;
            }
        }
        self.pairs.retain(|_, inner| !inner.is_empty());

        self.pair_count -= removed;
        self.remaining_mass -= removed_mass;
        if self.pair_count == 0 {
            return Err(InvariantViolation::EmptyHypotheses);
        }
        Ok(true)
    }

    /// Keep only pairs containing `found`; each partner inherits its pair's mass.
    pub fn collapse(&self, found: Coord) -> Result<SingleTargetStore, InvariantViolation> {
        if !self.cells.contains(&found) {
            return Err(InvariantViolation::UnknownRescueCell(found));
        }
        let mut weights = BTreeMap::new();
        for (a, b, p) in self.iter() {
            if a == found {
                weights.insert(b, p.prior);
            } else if b == found {
                weights.insert(a, p.prior);
            }
        }
        SingleTargetStore::from_weights(weights)
    }

    pub fn total_mass(&self) -> f64 {
        self.iter().map(|(_, _, p)| p.prior).sum()
    }

    pub fn renormalize(&mut self) -> bool {
        let mut probs: Vec<&mut CrewProbs> = self
            .pairs
            .values_mut()
            .flat_map(|inner| inner.values_mut())
            .collect();
        if probs.is_empty() {
            return false;
        }
        let reprior = settle(&mut probs, self.remaining_mass);
        self.remaining_mass = 1.0;
        reprior
    }

    /// Marginal probability that one of the two crew is at `cell`.
    pub fn cell_probability(&self, cell: Coord) -> f64 {
        let mass: f64 = self
            .iter()
            .filter(|&(a, b, _)| a == cell || b == cell)
            .map(|(_, _, p)| p.prior)
            .sum();
        mass / effective_scale(self.remaining_mass)
    }

    pub fn best(&self, bot: Coord) -> Vec<Candidate> {
        best_of(
            self.iter()
                .map(|(a, b, p)| (Hypothesis::Pair(a, b), p.prior, pair_distance(bot, a, b))),
            effective_scale(self.remaining_mass),
        )
    }

    fn ranked(&self, bot: Coord) -> Vec<Candidate> {
        let scale = effective_scale(self.remaining_mass);
        self.iter()
            .map(|(a, b, p)| Candidate {
                hypothesis: Hypothesis::Pair(a, b),
                probability: p.prior / scale,
                distance: pair_distance(bot, a, b),
            })
            .collect()
    }
}

// ── Store ───────────────────────────────────────────────────────────────

/// Posterior for however many crew are still missing.
#[derive(Debug, Clone, PartialEq)]
pub enum HypothesisStore {
    Single(SingleTargetStore),
    Paired(PairedTargetStore),
}

impl HypothesisStore {
    /// Uniform prior over `candidates` (or their pairs when two crew remain).
    pub fn new(
        candidates: impl IntoIterator<Item = Coord>,
        crew_remaining: usize,
    ) -> Result<Self, InvariantViolation> {
        if crew_remaining >= 2 {
            PairedTargetStore::new(candidates).map(HypothesisStore::Paired)
        } else {
            SingleTargetStore::new(candidates).map(HypothesisStore::Single)
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, HypothesisStore::Paired(_))
    }

    /// Live hypotheses: cells, or pairs.
    pub fn len(&self) -> usize {
        match self {
            HypothesisStore::Single(s) => s.len(),
            HypothesisStore::Paired(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live candidate cells.
    pub fn candidate_count(&self) -> usize {
        match self {
            HypothesisStore::Single(s) => s.len(),
            HypothesisStore::Paired(p) => p.candidate_count(),
        }
    }

    pub fn contains_cell(&self, cell: Coord) -> bool {
        match self {
            HypothesisStore::Single(s) => s.contains(cell),
            HypothesisStore::Paired(p) => p.contains_cell(cell),
        }
    }

    pub fn observe(
        &mut self,
        bot: Coord,
        sensor: &SensorProfile,
        reading: Reading,
    ) -> Result<Update, InvariantViolation> {
        match self {
            HypothesisStore::Single(s) => s.observe(bot, sensor, reading),
            HypothesisStore::Paired(p) => p.observe(bot, sensor, reading),
        }
    }

    pub fn remove_cell(&mut self, cell: Coord) -> Result<bool, InvariantViolation> {
        match self {
            HypothesisStore::Single(s) => s.remove_cell(cell),
            HypothesisStore::Paired(p) => p.remove_cell(cell),
        }
    }

    /// One of two crew was found at `found`: switch to single-target form.
    /// Does nothing when already single.
    pub fn collapse_on(&mut self, found: Coord) -> Result<(), InvariantViolation> {
        if let HypothesisStore::Paired(p) = self {
            *self = HypothesisStore::Single(p.collapse(found)?);
        }
        Ok(())
    }

    /// Sum of stored priors, before any pending rescale.
    pub fn total_mass(&self) -> f64 {
        match self {
            HypothesisStore::Single(s) => s.total_mass(),
            HypothesisStore::Paired(p) => p.total_mass(),
        }
    }

    pub fn remaining_mass(&self) -> f64 {
        match self {
            HypothesisStore::Single(s) => s.remaining_mass(),
            HypothesisStore::Paired(p) => p.remaining_mass(),
        }
    }

    /// Apply pending removals now. True if a uniform re-prior was needed.
    pub fn renormalize(&mut self) -> bool {
        match self {
            HypothesisStore::Single(s) => s.renormalize(),
            HypothesisStore::Paired(p) => p.renormalize(),
        }
    }

    pub fn cell_probability(&self, cell: Coord) -> f64 {
        match self {
            HypothesisStore::Single(s) => s.cell_probability(cell),
            HypothesisStore::Paired(p) => p.cell_probability(cell),
        }
    }

    /// Every hypothesis tied for the maximum probability, in key order.
    pub fn best(&self, bot: Coord) -> Vec<Candidate> {
        match self {
            HypothesisStore::Single(s) => s.best(bot),
            HypothesisStore::Paired(p) => p.best(bot),
        }
    }

    /// The `k` most probable hypotheses, highest first.
    pub fn top(&self, bot: Coord, k: usize) -> Vec<Candidate> {
        let mut ranked = match self {
            HypothesisStore::Single(s) => s.ranked(bot),
            HypothesisStore::Paired(p) => p.ranked(bot),
        };
        ranked.sort_by(|x, y| y.probability.total_cmp(&x.probability));
        ranked.truncate(k);
        ranked
    }
}
