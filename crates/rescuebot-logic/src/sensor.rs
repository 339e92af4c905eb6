//! Beep likelihood model.
//!
//! The chance of hearing a crew member at Manhattan distance `d` is
//! `exp(-α·(d-1))`, clamped to `[0, 1]`. Both the beep and no-beep tables are
//! precomputed for every distance a ship of side `N` can produce (`0..=2N`).

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{validate_decay_constant, ConfigError};

/// What the bot heard on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reading {
    Beep,
    Silence,
}

impl Reading {
    pub fn from_heard(heard: bool) -> Self {
        if heard {
            Reading::Beep
        } else {
            Reading::Silence
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Beep => write!(f, "beep"),
            Reading::Silence => write!(f, "no-beep"),
        }
    }
}

/// Precomputed beep / no-beep lookup for one decay constant.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorProfile {
    alpha: f64,
    beep: Vec<f64>,
    no_beep: Vec<f64>,
}

impl SensorProfile {
    pub fn new(alpha: f64, grid_size: usize) -> Result<Self, ConfigError> {
        validate_decay_constant(alpha)?;
        let (beep, no_beep) = build_lookup(alpha, grid_size * 2);
        Ok(Self {
            alpha,
            beep,
            no_beep,
        })
    }

    /// Replace α and rebuild both tables. On error the profile is unchanged.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<(), ConfigError> {
        validate_decay_constant(alpha)?;
        let max_distance = self.max_distance();
        let (beep, no_beep) = build_lookup(alpha, max_distance);
        self.alpha = alpha;
        self.beep = beep;
        self.no_beep = no_beep;
        Ok(())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Largest distance the tables cover.
    pub fn max_distance(&self) -> usize {
        self.beep.len().saturating_sub(1)
    }

    /// P(beep | crew at distance `d`). Distances past the table use the
    /// analytic form.
    pub fn beep_probability(&self, d: usize) -> f64 {
        self.beep
            .get(d)
            .copied()
            .unwrap_or_else(|| beep_at(self.alpha, d))
    }

    /// P(no beep | crew at distance `d`).
    pub fn no_beep_probability(&self, d: usize) -> f64 {
        self.no_beep
            .get(d)
            .copied()
            .unwrap_or_else(|| 1.0 - beep_at(self.alpha, d))
    }
}

fn beep_at(alpha: f64, d: usize) -> f64 {
    (-alpha * (d as f64 - 1.0)).exp().clamp(0.0, 1.0)
}

fn build_lookup(alpha: f64, max_distance: usize) -> (Vec<f64>, Vec<f64>) {
    let beep: Vec<f64> = (0..=max_distance).map(|d| beep_at(alpha, d)).collect();
    let no_beep = beep.iter().map(|p| 1.0 - p).collect();
    (beep, no_beep)
}

/// One uniform draw in `[0, 1)`; a beep when the draw is at most `p`.
pub fn sample(p: f64, rng: &mut impl Rng) -> bool {
    rng.gen::<f64>() <= p
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_table_covers_twice_grid_size() {
        let sensor = SensorProfile::new(0.02, 35).unwrap();
        assert_eq!(sensor.max_distance(), 70);
    }

    #[test]
    fn test_adjacent_always_beeps() {
        let sensor = SensorProfile::new(0.3, 10).unwrap();
        assert_eq!(sensor.beep_probability(1), 1.0);
        assert_eq!(sensor.no_beep_probability(1), 0.0);
    }

    #[test]
    fn test_zero_distance_clamped() {
        let sensor = SensorProfile::new(0.5, 10).unwrap();
        assert_eq!(sensor.beep_probability(0), 1.0);
        assert_eq!(sensor.no_beep_probability(0), 0.0);
    }

    #[test]
    fn test_strictly_decreasing_with_distance() {
        let sensor = SensorProfile::new(0.02, 35).unwrap();
        for d in 1..sensor.max_distance() {
            assert!(
                sensor.beep_probability(d + 1) < sensor.beep_probability(d),
                "beep({}) should be below beep({d})",
                d + 1
            );
        }
        let far = sensor.beep_probability(35);
        assert!(far > 0.0 && far < 1.0);
        assert!((far - (-0.02f64 * 34.0).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_tables_sum_to_one() {
        let sensor = SensorProfile::new(0.1, 8).unwrap();
        for d in 0..=sensor.max_distance() {
            let total = sensor.beep_probability(d) + sensor.no_beep_probability(d);
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_alpha_always_beeps() {
        let sensor = SensorProfile::new(0.0, 5).unwrap();
        for d in 0..=10 {
            assert_eq!(sensor.beep_probability(d), 1.0);
        }
    }

    #[test]
    fn test_rejects_negative_alpha() {
        assert_eq!(
            SensorProfile::new(-0.1, 5),
            Err(ConfigError::InvalidDecayConstant(-0.1))
        );
    }

    #[test]
    fn test_set_alpha_rebuilds() {
        let mut sensor = SensorProfile::new(0.02, 10).unwrap();
        let before = sensor.beep_probability(10);
        sensor.set_alpha(0.5).unwrap();
        assert_eq!(sensor.alpha(), 0.5);
        assert_eq!(sensor.max_distance(), 20);
        assert!(sensor.beep_probability(10) < before);
    }

    #[test]
    fn test_set_alpha_error_keeps_profile() {
        let mut sensor = SensorProfile::new(0.02, 10).unwrap();
        let snapshot = sensor.clone();
        assert!(sensor.set_alpha(f64::INFINITY).is_err());
        assert_eq!(sensor, snapshot);
    }

    #[test]
    fn test_lookup_past_table() {
        let sensor = SensorProfile::new(0.1, 2).unwrap();
        let p = sensor.beep_probability(9);
        assert!((p - (-0.8f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_reading_from_heard() {
        assert_eq!(Reading::from_heard(true), Reading::Beep);
        assert_eq!(Reading::from_heard(false), Reading::Silence);
        assert_eq!(Reading::Silence.to_string(), "no-beep");
    }

    #[test]
    fn test_sample_extremes() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(sample(1.0, &mut rng));
            assert!(!sample(-1.0, &mut rng));
        }
    }
}
