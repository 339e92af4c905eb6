//! Shortest paths over the ship grid.
//!
//! `PathPlanner` runs breadth-first search over traversable cells and keeps
//! a bounded cache of finished paths. Terrain never changes once a ship is
//! generated, so a cached path stays valid for the whole trial.

use std::collections::{HashMap, VecDeque};

use crate::constants::defaults::PATH_CACHE_CAPACITY;
use crate::grid::{Coord, Grid};

/// BFS planner with a path cache.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    /// (from, to) → cached path. Simple bounded cache.
    cache: HashMap<(Coord, Coord), Vec<Coord>>,
    cache_capacity: usize,
}

impl Default for PathPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PathPlanner {
    pub fn new() -> Self {
        Self::with_cache(PATH_CACHE_CAPACITY)
    }

    /// Planner with a specific cache capacity. Zero disables caching.
    pub fn with_cache(cache_capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            cache_capacity,
        }
    }

    /// Find a shortest path from `from` to `to`.
    ///
    /// The path includes both endpoints, so a trip to the current cell is
    /// `[from]`. Returns `None` if `to` is closed or unreachable. Ties between
    /// equal-length paths go to the first discovered in compass order.
    pub fn find_path(&mut self, grid: &Grid, from: Coord, to: Coord) -> Option<Vec<Coord>> {
        if from == to {
            return grid.is_open(from).then(|| vec![from]);
        }

        let key = (from, to);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached.clone());
        }

        let result = bfs(grid, from, to);

        if let Some(ref path) = result {
            if self.cache_capacity > 0 {
                if self.cache.len() >= self.cache_capacity {
                    // Evict an arbitrary entry (HashMap iteration order)
                    if let Some(&evict_key) = self.cache.keys().next() {
                        self.cache.remove(&evict_key);
                    }
                }
                self.cache.insert(key, path.clone());
            }
        }

        result
    }

    /// Clear the path cache.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached paths.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

fn bfs(grid: &Grid, from: Coord, to: Coord) -> Option<Vec<Coord>> {
    if !grid.is_open(from) || !grid.is_open(to) {
        return None;
    }

    let size = grid.size();
    let index = |c: Coord| c.row * size + c.col;
    let mut parent: Vec<Option<Coord>> = vec![None; size * size];
    let mut visited = vec![false; size * size];
    let mut queue = VecDeque::from([from]);
    visited[index(from)] = true;

    while let Some(current) = queue.pop_front() {
        if current == to {
            let mut path = vec![to];
            let mut step = to;
            while let Some(prev) = parent[index(step)] {
                path.push(prev);
                step = prev;
            }
            path.reverse();
            return Some(path);
        }
        for next in grid.open_neighbors(current) {
            let i = index(next);
            if !visited[i] {
                visited[i] = true;
                parent[i] = Some(current);
                queue.push_back(next);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> Grid {
        // A U-shaped corridor: the only route from (0,0) to (0,2) goes down and around
        Grid::from_layout(&[".#.", ".#.", "..."]).unwrap()
    }

    #[test]
    fn test_same_cell() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        let c = Coord::new(0, 0);
        assert_eq!(planner.find_path(&grid, c, c), Some(vec![c]));
    }

    #[test]
    fn test_adjacent() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        let path = planner
            .find_path(&grid, Coord::new(0, 0), Coord::new(1, 0))
            .unwrap();
        assert_eq!(path, vec![Coord::new(0, 0), Coord::new(1, 0)]);
    }

    #[test]
    fn test_routes_around_walls() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        let path = planner
            .find_path(&grid, Coord::new(0, 0), Coord::new(0, 2))
            .unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path.first(), Some(&Coord::new(0, 0)));
        assert_eq!(path.last(), Some(&Coord::new(0, 2)));
        for step in path.windows(2) {
            assert_eq!(step[0].manhattan(step[1]), 1);
            assert!(grid.is_open(step[1]));
        }
    }

    #[test]
    fn test_compass_tie_break() {
        // Two equal routes around the centre: south-first discovery wins
        let grid = Grid::from_layout(&["...", ".#.", "..."]).unwrap();
        let mut planner = PathPlanner::new();
        let path = planner
            .find_path(&grid, Coord::new(0, 0), Coord::new(2, 2))
            .unwrap();
        assert_eq!(
            path,
            vec![
                Coord::new(0, 0),
                Coord::new(1, 0),
                Coord::new(2, 0),
                Coord::new(2, 1),
                Coord::new(2, 2)
            ]
        );
    }

    #[test]
    fn test_unreachable() {
        let grid = Grid::from_layout(&[".#.", "###", "..."]).unwrap();
        let mut planner = PathPlanner::new();
        assert_eq!(
            planner.find_path(&grid, Coord::new(0, 0), Coord::new(0, 2)),
            None
        );
        assert_eq!(planner.cache_size(), 0);
    }

    #[test]
    fn test_closed_destination() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        assert_eq!(
            planner.find_path(&grid, Coord::new(0, 0), Coord::new(0, 1)),
            None
        );
    }

    #[test]
    fn test_occupied_cells_are_traversable() {
        let mut grid = corridor();
        grid.cell_mut(Coord::new(2, 1)).occupancy.crew = true;
        let mut planner = PathPlanner::new();
        let path = planner
            .find_path(&grid, Coord::new(0, 0), Coord::new(0, 2))
            .unwrap();
        assert!(path.contains(&Coord::new(2, 1)));
    }

    #[test]
    fn test_cache_hit() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        let (a, b) = (Coord::new(0, 0), Coord::new(0, 2));
        let first = planner.find_path(&grid, a, b);
        assert_eq!(planner.cache_size(), 1);
        let second = planner.find_path(&grid, a, b);
        assert_eq!(first, second);
        assert_eq!(planner.cache_size(), 1);
    }

    #[test]
    fn test_cache_eviction() {
        let grid = Grid::from_layout(&["....", "....", "....", "...."]).unwrap();
        let mut planner = PathPlanner::with_cache(2);
        let origin = Coord::new(0, 0);
        planner.find_path(&grid, origin, Coord::new(3, 3));
        planner.find_path(&grid, origin, Coord::new(2, 2));
        planner.find_path(&grid, origin, Coord::new(1, 1));
        assert_eq!(planner.cache_size(), 2);
    }

    #[test]
    fn test_clear_cache() {
        let grid = corridor();
        let mut planner = PathPlanner::new();
        planner.find_path(&grid, Coord::new(0, 0), Coord::new(2, 2));
        assert!(planner.cache_size() > 0);
        planner.clear_cache();
        assert_eq!(planner.cache_size(), 0);
    }
}
