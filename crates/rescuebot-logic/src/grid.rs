//! Ship grid: cells, maze generation, neighbor enumeration.
//!
//! The grid is an N×N matrix of cells. Generation opens a single random
//! cell, grows a tree by repeatedly opening closed cells that touch exactly
//! one open cell, then knocks through roughly half of the dead ends to add
//! cycles. Every open cell is reachable from every other open cell.

use std::collections::VecDeque;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Neighbor offsets in fixed compass order: south, east, west, north.
/// BFS tie-breaking and generation both depend on this order.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(1, 0), (0, 1), (0, -1), (-1, 0)];

/// A cell coordinate. Ordered row-major.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(self, other: Coord) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    fn offset(self, (dr, dc): (isize, isize), size: usize) -> Option<Coord> {
        let row = self.row.checked_add_signed(dr)?;
        let col = self.col.checked_add_signed(dc)?;
        (row < size && col < size).then_some(Coord { row, col })
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Base terrain of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Closed,
    Open,
}

/// Who is standing in a cell. Flags overlay freely: the bot can stand on a
/// crew cell, a hazard can share a cell with crew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Occupancy {
    pub bot: bool,
    pub crew: bool,
    pub hazard: bool,
}

/// Running beep counter for one cell: how often the bot listened here and
/// how often it heard something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BeepTrack {
    pub observations: u32,
    pub beeps: u32,
}

impl BeepTrack {
    pub fn record(&mut self, heard: bool) {
        self.observations += 1;
        if heard {
            self.beeps += 1;
        }
    }

    /// Fraction of observations that produced a beep, `None` before the
    /// first observation.
    pub fn rate(&self) -> Option<f64> {
        (self.observations > 0).then(|| self.beeps as f64 / self.observations as f64)
    }
}

/// A single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cell {
    pub coord: Coord,
    pub terrain: Terrain,
    pub occupancy: Occupancy,
    pub track: BeepTrack,
    pub within_detection_zone: bool,
}

impl Cell {
    pub fn is_open(&self) -> bool {
        self.terrain == Terrain::Open
    }

    /// The bot can walk through any open cell, occupied or not.
    pub fn is_traversable(&self) -> bool {
        self.is_open()
    }

    /// Bot and hazard share the cell.
    pub fn is_caught(&self) -> bool {
        self.occupancy.bot && self.occupancy.hazard
    }
}

/// N×N ship grid.
#[derive(Debug, Clone)]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// A grid with every cell closed.
    pub fn closed(size: usize) -> Self {
        let cells = (0..size * size)
            .map(|i| Cell {
                coord: Coord::new(i / size, i % size),
                ..Default::default()
            })
            .collect();
        Self { size, cells }
    }

    /// Generate a connected maze-like layout.
    pub fn generate(size: usize, rng: &mut impl Rng) -> Self {
        let mut grid = Self::closed(size);
        if size == 0 {
            return grid;
        }

        let start = Coord::new(rng.gen_range(0..size), rng.gen_range(0..size));
        grid.open(start);

        loop {
            let frontier = grid.cells_with_one_open_neighbor(Terrain::Closed);
            match frontier.choose(rng) {
                Some(&cell) => grid.open(cell),
                None => break,
            }
        }

        grid.open_dead_ends(rng);
        grid
    }

    /// Build a grid from text rows: `#` is closed, anything else open.
    pub fn from_layout(rows: &[&str]) -> Result<Self, ConfigError> {
        let size = rows.len();
        let mut grid = Self::closed(size);
        for (row, line) in rows.iter().enumerate() {
            let width = line.chars().count();
            if width != size {
                return Err(ConfigError::MalformedLayout {
                    row,
                    expected: size,
                    found: width,
                });
            }
            for (col, ch) in line.chars().enumerate() {
                if ch != '#' {
                    grid.open(Coord::new(row, col));
                }
            }
        }
        Ok(grid)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.row < self.size && coord.col < self.size
    }

    fn index(&self, coord: Coord) -> usize {
        coord.row * self.size + coord.col
    }

    /// # Panics
    /// If `coord` is outside the grid.
    pub fn cell(&self, coord: Coord) -> &Cell {
        &self.cells[self.index(coord)]
    }

    /// # Panics
    /// If `coord` is outside the grid.
    pub fn cell_mut(&mut self, coord: Coord) -> &mut Cell {
        let idx = self.index(coord);
        &mut self.cells[idx]
    }

    pub fn is_open(&self, coord: Coord) -> bool {
        self.in_bounds(coord) && self.cell(coord).is_open()
    }

    fn open(&mut self, coord: Coord) {
        self.cell_mut(coord).terrain = Terrain::Open;
    }

    /// All open cells in row-major order.
    pub fn open_cells(&self) -> Vec<Coord> {
        self.cells
            .iter()
            .filter(|c| c.is_open())
            .map(|c| c.coord)
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_open()).count()
    }

    /// In-bounds neighbors of `coord`, in compass order, regardless of terrain.
    pub fn neighbors(&self, coord: Coord) -> impl Iterator<Item = Coord> + '_ {
        NEIGHBOR_OFFSETS
            .into_iter()
            .filter_map(move |delta| coord.offset(delta, self.size))
    }

    /// Traversable neighbors of `coord`, in compass order.
    pub fn open_neighbors(&self, coord: Coord) -> impl Iterator<Item = Coord> + '_ {
        self.neighbors(coord)
            .filter(move |&n| self.cell(n).is_traversable())
    }

    fn cells_with_one_open_neighbor(&self, terrain: Terrain) -> Vec<Coord> {
        self.cells
            .iter()
            .filter(|c| c.terrain == terrain && self.open_neighbors(c.coord).count() == 1)
            .map(|c| c.coord)
            .collect()
    }

    /// Knock one random closed neighbor out of roughly half the dead ends.
    fn open_dead_ends(&mut self, rng: &mut impl Rng) {
        let mut remaining = self.cells_with_one_open_neighbor(Terrain::Open).len().div_ceil(2);
        while remaining > 0 {
            remaining -= 1;
            let dead_ends = self.cells_with_one_open_neighbor(Terrain::Open);
            let Some(&dead_end) = dead_ends.choose(rng) else {
                break;
            };
            let closed: Vec<Coord> = self
                .neighbors(dead_end)
                .filter(|&n| !self.cell(n).is_open())
                .collect();
            if let Some(&wall) = closed.choose(rng) {
                self.open(wall);
            }
        }
    }

    /// Flood fill from the first open cell; true when it reaches every open cell.
    pub fn is_connected(&self) -> bool {
        let open = self.open_cells();
        let Some(&start) = open.first() else {
            return true;
        };

        let mut seen = vec![false; self.cells.len()];
        let mut queue = VecDeque::from([start]);
        seen[self.index(start)] = true;
        let mut reached = 1;

        while let Some(current) = queue.pop_front() {
            for next in self.open_neighbors(current) {
                let idx = self.index(next);
                if !seen[idx] {
                    seen[idx] = true;
                    reached += 1;
                    queue.push_back(next);
                }
            }
        }

        reached == open.len()
    }

    /// Mark the square window of `radius` around `center` as the hazard
    /// detection zone and clear the flag everywhere else. Returns the number
    /// of cells inside the zone.
    pub fn reset_detection_zone(&mut self, center: Coord, radius: usize) -> usize {
        let mut inside = 0;
        for cell in &mut self.cells {
            cell.within_detection_zone = cell.coord.row.abs_diff(center.row) <= radius
                && cell.coord.col.abs_diff(center.col) <= radius;
            if cell.within_detection_zone {
                inside += 1;
            }
        }
        inside
    }
}
