//! A generated grid with the bot and crew placed on it.
//!
//! Placement precomputes, for every cell, the distance to each crew member
//! and the matching beep probability, so sampling a beep on a tick is a table
//! lookup and one uniform draw per crew member.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::constants::limits;
use crate::error::SearchError;
use crate::grid::{Coord, Grid};
use crate::sensor::{self, SensorProfile};

/// A crew member waiting to be rescued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    pub cell: Coord,
    pub found: bool,
}

/// What the bot would hear from one cell: distance and beep probability per
/// crew member. Unused slots stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Listen {
    pub distances: [usize; limits::MAX_CREW],
    pub beep_prob: [f64; limits::MAX_CREW],
}

#[derive(Debug, Clone)]
pub struct Ship {
    grid: Grid,
    bot: Coord,
    crews: Vec<CrewMember>,
    listen: Vec<Listen>,
}

impl Ship {
    /// Place the bot and `crew_count` crew on distinct random open cells.
    pub fn place(
        grid: Grid,
        crew_count: usize,
        sensor: &SensorProfile,
        rng: &mut impl Rng,
    ) -> Result<Self, SearchError> {
        if !(limits::MIN_CREW..=limits::MAX_CREW).contains(&crew_count) {
            return Err(ConfigError::InvalidCrewCount(crew_count).into());
        }
        let mut pool = grid.open_cells();
        let needed = crew_count + 1;
        if pool.len() < needed {
            return Err(SearchError::NotEnoughOpenCells {
                open: pool.len(),
                needed,
            });
        }

        let bot = pool.remove(rng.gen_range(0..pool.len()));
        let crews: Vec<Coord> = (0..crew_count)
            .map(|_| pool.remove(rng.gen_range(0..pool.len())))
            .collect();

        Ok(Self::assemble(grid, bot, &crews, sensor))
    }

    /// Place the bot and crew at fixed cells. Every cell must be open and
    /// distinct.
    pub fn with_positions(
        grid: Grid,
        bot: Coord,
        crews: &[Coord],
        sensor: &SensorProfile,
    ) -> Result<Self, ConfigError> {
        if !(limits::MIN_CREW..=limits::MAX_CREW).contains(&crews.len()) {
            return Err(ConfigError::InvalidCrewCount(crews.len()));
        }
        let mut seen: Vec<Coord> = Vec::with_capacity(crews.len() + 1);
        for &cell in std::iter::once(&bot).chain(crews) {
            if !grid.is_open(cell) {
                return Err(ConfigError::PlacementNotOpen(cell));
            }
            if seen.contains(&cell) {
                return Err(ConfigError::DuplicatePlacement(cell));
            }
            seen.push(cell);
        }
        Ok(Self::assemble(grid, bot, crews, sensor))
    }

    fn assemble(mut grid: Grid, bot: Coord, crews: &[Coord], sensor: &SensorProfile) -> Self {
        grid.cell_mut(bot).occupancy.bot = true;
        for &c in crews {
            grid.cell_mut(c).occupancy.crew = true;
        }
        let size = grid.size();
        let mut ship = Self {
            grid,
            bot,
            crews: crews
                .iter()
                .map(|&cell| CrewMember { cell, found: false })
                .collect(),
            listen: vec![Listen::default(); size * size],
        };
        ship.refresh_listen(sensor);
        ship
    }

    /// Recompute every cell's beep profile, e.g. after α changed.
    pub fn refresh_listen(&mut self, sensor: &SensorProfile) {
        let size = self.grid.size();
        for cell in self.grid.open_cells() {
            let mut listen = Listen::default();
            for (i, crew) in self.crews.iter().enumerate() {
                let d = cell.manhattan(crew.cell);
                listen.distances[i] = d;
                listen.beep_prob[i] = sensor.beep_probability(d);
            }
            self.listen[cell.row * size + cell.col] = listen;
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn bot(&self) -> Coord {
        self.bot
    }

    pub fn crews(&self) -> &[CrewMember] {
        &self.crews
    }

    pub fn crew_count(&self) -> usize {
        self.crews.len()
    }

    /// # Panics
    /// If `cell` is outside the grid.
    pub fn listen(&self, cell: Coord) -> &Listen {
        &self.listen[cell.row * self.grid.size() + cell.col]
    }

    /// Bot to the first crew, plus first crew to the second when there are two.
    pub fn initial_distance(&self) -> usize {
        let mut total = 0;
        let mut from = self.bot;
        for crew in &self.crews {
            total += from.manhattan(crew.cell);
            from = crew.cell;
        }
        total
    }

    /// Every open cell except the bot's: the initial hypothesis support.
    pub fn candidate_cells(&self) -> Vec<Coord> {
        self.grid
            .open_cells()
            .into_iter()
            .filter(|&c| c != self.bot)
            .collect()
    }

    /// Sample whether the bot hears a beep from `cell`.
    ///
    /// With two crew missing and no pending target both members are sampled
    /// and the results OR-ed. Both draws are always taken so a seed fixes
    /// the whole draw sequence. With a pending target only that member beeps.
    pub fn crew_beep(&self, cell: Coord, pending: Option<usize>, rng: &mut impl Rng) -> bool {
        let listen = self.listen(cell);
        match pending {
            Some(i) => sensor::sample(listen.beep_prob[i], rng),
            None if self.crews.len() == 2 => {
                let first = sensor::sample(listen.beep_prob[0], rng);
                let second = sensor::sample(listen.beep_prob[1], rng);
                first || second
            }
            None => sensor::sample(listen.beep_prob[0], rng),
        }
    }

    /// Index of a crew member at `cell` not yet found.
    pub fn unfound_crew_at(&self, cell: Coord) -> Option<usize> {
        self.crews.iter().position(|c| c.cell == cell && !c.found)
    }

    pub fn mark_found(&mut self, index: usize) {
        if let Some(crew) = self.crews.get_mut(index) {
            crew.found = true;
            self.grid.cell_mut(crew.cell).occupancy.crew = false;
        }
    }

    pub fn remaining_crew(&self) -> usize {
        self.crews.iter().filter(|c| !c.found).count()
    }

    /// Keep only the first `keep` crew members. The others are taken off the
    /// grid and stop contributing beeps.
    pub fn truncate_crew(&mut self, keep: usize) {
        if keep >= self.crews.len() {
            return;
        }
        for crew in self.crews.drain(keep..) {
            self.grid.cell_mut(crew.cell).occupancy.crew = false;
        }
        for listen in &mut self.listen {
            listen.distances[keep..].fill(0);
            listen.beep_prob[keep..].fill(0.0);
        }
    }

    /// Move the bot's occupancy flag to `to`.
    pub fn move_bot(&mut self, to: Coord) {
        self.grid.cell_mut(self.bot).occupancy.bot = false;
        self.grid.cell_mut(to).occupancy.bot = true;
        self.bot = to;
    }

    /// Record a listening result on the bot's current cell.
    pub fn record_beep(&mut self, heard: bool) {
        self.grid.cell_mut(self.bot).track.record(heard);
    }

    /// Beep rate heard at `cell`, `None` before the first observation there.
    pub fn beep_rate(&self, cell: Coord) -> Option<f64> {
        self.grid.cell(cell).track.rate()
    }

    /// Refresh the hazard detection zone around the bot.
    pub fn reset_detection_zone(&mut self, radius: usize) -> usize {
        let bot = self.bot;
        self.grid.reset_detection_zone(bot, radius)
    }

    pub fn is_caught(&self) -> bool {
        self.grid.cell(self.bot).is_caught()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn open_grid(n: usize) -> Grid {
        let row = ".".repeat(n);
        let rows: Vec<&str> = (0..n).map(|_| row.as_str()).collect();
        Grid::from_layout(&rows).unwrap()
    }

    #[test]
    fn test_place_distinct_open_cells() {
        let sensor = SensorProfile::new(0.1, 10).unwrap();
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let grid = Grid::generate(10, &mut rng);
            let ship = Ship::place(grid, 2, &sensor, &mut rng).unwrap();
            let crews = ship.crews();
            assert_eq!(crews.len(), 2);
            assert_ne!(crews[0].cell, crews[1].cell);
            for c in crews {
                assert_ne!(c.cell, ship.bot());
                assert!(ship.grid().is_open(c.cell));
                assert!(ship.grid().cell(c.cell).occupancy.crew);
            }
            assert!(ship.grid().cell(ship.bot()).occupancy.bot);
        }
    }

    #[test]
    fn test_place_needs_room() {
        let sensor = SensorProfile::new(0.1, 2).unwrap();
        let grid = Grid::from_layout(&[".#", "##"]).unwrap();
        let err = Ship::place(grid, 1, &sensor, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(
            err,
            SearchError::NotEnoughOpenCells { open: 1, needed: 2 }
        ));
    }

    #[test]
    fn test_with_positions_validates() {
        let sensor = SensorProfile::new(0.1, 3).unwrap();
        let grid = Grid::from_layout(&["..#", "...", "..."]).unwrap();
        assert_eq!(
            Ship::with_positions(grid.clone(), Coord::new(0, 0), &[Coord::new(0, 2)], &sensor)
                .unwrap_err(),
            ConfigError::PlacementNotOpen(Coord::new(0, 2))
        );
        assert_eq!(
            Ship::with_positions(grid.clone(), Coord::new(0, 0), &[Coord::new(0, 0)], &sensor)
                .unwrap_err(),
            ConfigError::DuplicatePlacement(Coord::new(0, 0))
        );
        assert_eq!(
            Ship::with_positions(grid, Coord::new(0, 0), &[], &sensor).unwrap_err(),
            ConfigError::InvalidCrewCount(0)
        );
    }

    #[test]
    fn test_listen_profile() {
        let sensor = SensorProfile::new(0.1, 4).unwrap();
        let ship = Ship::with_positions(
            open_grid(4),
            Coord::new(0, 0),
            &[Coord::new(3, 3), Coord::new(0, 2)],
            &sensor,
        )
        .unwrap();
        let listen = ship.listen(Coord::new(0, 0));
        assert_eq!(listen.distances, [6, 2]);
        assert_eq!(listen.beep_prob[0], sensor.beep_probability(6));
        assert_eq!(listen.beep_prob[1], sensor.beep_probability(2));
        assert_eq!(ship.initial_distance(), 6 + 4);
    }

    #[test]
    fn test_refresh_listen_after_alpha_change() {
        let mut sensor = SensorProfile::new(0.1, 4).unwrap();
        let mut ship =
            Ship::with_positions(open_grid(4), Coord::new(0, 0), &[Coord::new(3, 3)], &sensor)
                .unwrap();
        sensor.set_alpha(0.9).unwrap();
        ship.refresh_listen(&sensor);
        assert_eq!(
            ship.listen(Coord::new(0, 0)).beep_prob[0],
            sensor.beep_probability(6)
        );
    }

    #[test]
    fn test_candidates_exclude_bot() {
        let sensor = SensorProfile::new(0.1, 3).unwrap();
        let ship =
            Ship::with_positions(open_grid(3), Coord::new(1, 1), &[Coord::new(0, 0)], &sensor)
                .unwrap();
        let candidates = ship.candidate_cells();
        assert_eq!(candidates.len(), 8);
        assert!(!candidates.contains(&Coord::new(1, 1)));
        assert!(candidates.contains(&Coord::new(0, 0)));
    }

    #[test]
    fn test_adjacent_crew_always_heard() {
        let sensor = SensorProfile::new(0.5, 5).unwrap();
        let ship =
            Ship::with_positions(open_grid(5), Coord::new(2, 2), &[Coord::new(2, 3)], &sensor)
                .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            assert!(ship.crew_beep(Coord::new(2, 2), None, &mut rng));
        }
    }

    #[test]
    fn test_two_crew_takes_both_draws() {
        // Crew 0 adjacent (always beeps); the second draw must still be taken
        let sensor = SensorProfile::new(0.5, 6).unwrap();
        let ship = Ship::with_positions(
            open_grid(6),
            Coord::new(0, 0),
            &[Coord::new(0, 1), Coord::new(5, 5)],
            &sensor,
        )
        .unwrap();
        let mut a = StdRng::seed_from_u64(5);
        let mut b = StdRng::seed_from_u64(5);
        assert!(ship.crew_beep(Coord::new(0, 0), None, &mut a));
        let _: f64 = b.gen();
        let _: f64 = b.gen();
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn test_pending_samples_only_that_crew() {
        let sensor = SensorProfile::new(2.0, 6).unwrap();
        let ship = Ship::with_positions(
            open_grid(6),
            Coord::new(0, 0),
            &[Coord::new(0, 1), Coord::new(5, 5)],
            &sensor,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        // Crew 1 is ten cells away at α = 2: practically silent
        let heard = (0..200)
            .filter(|_| ship.crew_beep(Coord::new(0, 0), Some(1), &mut rng))
            .count();
        assert_eq!(heard, 0);
        assert!(ship.crew_beep(Coord::new(0, 0), Some(0), &mut rng));
    }

    #[test]
    fn test_truncate_crew_drops_second_member() {
        let sensor = SensorProfile::new(0.1, 4).unwrap();
        let mut ship = Ship::with_positions(
            open_grid(4),
            Coord::new(0, 0),
            &[Coord::new(3, 3), Coord::new(0, 1)],
            &sensor,
        )
        .unwrap();
        ship.truncate_crew(1);
        assert_eq!(ship.crew_count(), 1);
        assert_eq!(ship.crews()[0].cell, Coord::new(3, 3));
        assert!(!ship.grid().cell(Coord::new(0, 1)).occupancy.crew);
        assert_eq!(ship.listen(Coord::new(0, 0)).beep_prob[1], 0.0);
        assert_eq!(ship.initial_distance(), 6);
        assert_eq!(ship.unfound_crew_at(Coord::new(0, 1)), None);

        // Keeping more than exist changes nothing
        ship.truncate_crew(2);
        assert_eq!(ship.crew_count(), 1);
    }

    #[test]
    fn test_rescue_bookkeeping() {
        let sensor = SensorProfile::new(0.1, 3).unwrap();
        let mut ship = Ship::with_positions(
            open_grid(3),
            Coord::new(0, 0),
            &[Coord::new(0, 1), Coord::new(2, 2)],
            &sensor,
        )
        .unwrap();
        assert_eq!(ship.remaining_crew(), 2);
        ship.move_bot(Coord::new(0, 1));
        assert!(!ship.grid().cell(Coord::new(0, 0)).occupancy.bot);
        assert_eq!(ship.unfound_crew_at(Coord::new(0, 1)), Some(0));
        ship.mark_found(0);
        assert_eq!(ship.unfound_crew_at(Coord::new(0, 1)), None);
        assert_eq!(ship.remaining_crew(), 1);
        assert!(!ship.is_caught());
    }

    #[test]
    fn test_beep_tracking_on_bot_cell() {
        let sensor = SensorProfile::new(0.1, 3).unwrap();
        let mut ship =
            Ship::with_positions(open_grid(3), Coord::new(0, 0), &[Coord::new(2, 2)], &sensor)
                .unwrap();
        assert_eq!(ship.beep_rate(Coord::new(0, 0)), None);
        ship.record_beep(true);
        ship.record_beep(false);
        assert_eq!(ship.beep_rate(Coord::new(0, 0)), Some(0.5));
    }
}
