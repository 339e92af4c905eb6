//! RescueBot Headless Simulation Harness
//!
//! Validates grid generation, the sensor model, posterior bookkeeping and
//! full search trials. Runs entirely in-process with seeded RNGs.
//!
//! Usage:
//!   cargo run -p rescuebot-simtest
//!   cargo run -p rescuebot-simtest -- --verbose --trials 50 --grid-size 25
//!   cargo run -p rescuebot-simtest -- --json > report.json

use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rescuebot_logic::agent::{Agent, TickOutcome};
use rescuebot_logic::config::{validate_config, SearchConfig};
use rescuebot_logic::grid::{Coord, Grid};
use rescuebot_logic::hypothesis::HypothesisStore;
use rescuebot_logic::sensor::SensorProfile;
use rescuebot_logic::ship::Ship;
use rescuebot_logic::trial::{run_trial, run_trial_on, Outcome, TrialResult, LINEUP};
use serde::Serialize;

// ── CLI ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rescuebot-simtest")]
#[command(about = "Headless validation of the rescue bot search logic")]
#[command(version)]
struct Args {
    /// Print every check, not only failures
    #[arg(short, long)]
    verbose: bool,

    /// Emit the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Trials per crew count in the batch section
    #[arg(short, long, default_value = "20")]
    trials: u64,

    /// Ship side length for generated grids
    #[arg(short, long, default_value = "20")]
    grid_size: usize,

    /// Beep decay constant
    #[arg(short, long, default_value = "0.02")]
    alpha: f64,

    /// Base seed; trial i uses seed + i
    #[arg(short, long, default_value = "0")]
    seed: u64,
}

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct Report {
    passed: usize,
    failed: usize,
    results: Vec<TestResult>,
}

fn main() {
    let args = Args::parse();
    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if !args.json {
        println!("=== RescueBot Simulation Harness ===\n");
    }

    let mut results = Vec::new();

    // 1. Grid generation
    results.extend(validate_grid_generation(&args));

    // 2. Sensor model
    results.extend(validate_sensor_model(&args));

    // 3. Posterior bookkeeping
    results.extend(validate_posterior(&args));

    // 4. Determinism
    results.extend(validate_determinism(&args));

    // 5. Trial batches
    results.extend(validate_trial_batches(&args));

    // 6. Small-ship scenario
    results.extend(validate_small_ship_scenario(&args));

    // ── Summary ──
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    if args.json {
        let report = Report {
            passed,
            failed,
            results,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("failed to encode report: {}", e);
                std::process::exit(2);
            }
        }
    } else {
        println!();
        for r in &results {
            let icon = if r.passed { "✓" } else { "✗" };
            if !r.passed || args.verbose {
                println!("  {} {}: {}", icon, r.name, r.detail);
            }
        }
        println!(
            "\n=== RESULT: {}/{} passed, {} failed ===",
            passed,
            passed + failed,
            failed
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn section(args: &Args, title: &str) {
    if !args.json {
        println!("--- {} ---", title);
    }
}

// ── 1. Grid Generation ──────────────────────────────────────────────────

fn validate_grid_generation(args: &Args) -> Vec<TestResult> {
    section(args, "Grid Generation");
    let mut results = Vec::new();
    let seeds = args.seed..args.seed + 25;

    let mut disconnected = Vec::new();
    let mut open_fraction = Vec::new();
    for seed in seeds.clone() {
        let grid = Grid::generate(args.grid_size, &mut StdRng::seed_from_u64(seed));
        if !grid.is_connected() {
            disconnected.push(seed);
        }
        open_fraction.push(grid.open_count() as f64 / (args.grid_size * args.grid_size) as f64);
    }
    results.push(TestResult {
        name: "grid_connected".into(),
        passed: disconnected.is_empty(),
        detail: if disconnected.is_empty() {
            format!("{} grids of size {} connected", seeds.count(), args.grid_size)
        } else {
            format!("disconnected for seeds {:?}", disconnected)
        },
    });

    let min = open_fraction.iter().copied().fold(f64::INFINITY, f64::min);
    let max = open_fraction.iter().copied().fold(0.0, f64::max);
    results.push(TestResult {
        name: "grid_open_fraction".into(),
        passed: (min > 0.0 && max < 1.0) || args.grid_size <= 2,
        detail: format!("open fraction {:.2}..{:.2}", min, max),
    });

    let layout = Grid::from_layout(&["..#", ".#.", "..."]);
    results.push(TestResult {
        name: "grid_layout_parse".into(),
        passed: layout.as_ref().map(|g| g.open_count() == 7).unwrap_or(false),
        detail: match &layout {
            Ok(g) => format!("{} open cells from fixed layout", g.open_count()),
            Err(e) => format!("layout rejected: {}", e),
        },
    });

    let malformed = Grid::from_layout(&["...", ".."]);
    results.push(TestResult {
        name: "grid_layout_malformed".into(),
        passed: malformed.is_err(),
        detail: match malformed {
            Ok(_) => "ragged layout accepted".into(),
            Err(e) => format!("rejected: {}", e),
        },
    });

    results
}

// ── 2. Sensor Model ─────────────────────────────────────────────────────

fn validate_sensor_model(args: &Args) -> Vec<TestResult> {
    section(args, "Sensor Model");
    let mut results = Vec::new();

    let sensor = match SensorProfile::new(args.alpha, args.grid_size) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult {
                name: "sensor_profile".into(),
                passed: false,
                detail: format!("alpha rejected: {}", e),
            });
            return results;
        }
    };

    results.push(TestResult {
        name: "sensor_adjacent_certain".into(),
        passed: sensor.beep_probability(1) == 1.0,
        detail: format!("P(beep | d=1) = {}", sensor.beep_probability(1)),
    });

    let max_d = sensor.max_distance();
    let monotone = (2..=max_d).all(|d| sensor.beep_probability(d) <= sensor.beep_probability(d - 1));
    results.push(TestResult {
        name: "sensor_monotone".into(),
        passed: monotone,
        detail: format!("non-increasing over 1..={}", max_d),
    });

    let complement = (0..=max_d)
        .all(|d| (sensor.beep_probability(d) + sensor.no_beep_probability(d) - 1.0).abs() < 1e-12);
    let bounded = (0..=max_d).all(|d| (0.0..=1.0).contains(&sensor.beep_probability(d)));
    results.push(TestResult {
        name: "sensor_complement".into(),
        passed: complement && bounded,
        detail: "beep + no-beep = 1, every entry in [0, 1]".into(),
    });

    results.push(TestResult {
        name: "sensor_rejects_bad_alpha".into(),
        passed: SensorProfile::new(-0.1, args.grid_size).is_err()
            && SensorProfile::new(f64::NAN, args.grid_size).is_err(),
        detail: "negative and NaN alpha rejected".into(),
    });

    if args.verbose && !args.json {
        println!("  Beep probability by distance:");
        for d in [1, 2, 5, 10, args.grid_size, max_d] {
            println!("    d={:3}: {:.4}", d, sensor.beep_probability(d));
        }
    }

    results
}

// ── 3. Posterior Bookkeeping ────────────────────────────────────────────

fn seeded_agent(args: &Args, crew: usize, seed: u64) -> Option<(Agent, StdRng)> {
    let config = SearchConfig::new(args.grid_size, args.alpha, crew).with_seed(seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let sensor = SensorProfile::new(args.alpha, args.grid_size).ok()?;
    let grid = Grid::generate(args.grid_size, &mut rng);
    let ship = Ship::place(grid, crew, &sensor, &mut rng).ok()?;
    let agent = Agent::new(ship, sensor, &config).ok()?;
    Some((agent, rng))
}

fn validate_posterior(args: &Args) -> Vec<TestResult> {
    section(args, "Posterior Bookkeeping");
    let mut results = Vec::new();

    for crew in [1usize, 2] {
        let name = format!("posterior_conserved_crew{}", crew);
        let Some((mut agent, mut rng)) = seeded_agent(args, crew, args.seed) else {
            results.push(TestResult {
                name,
                passed: false,
                detail: "could not set up agent".into(),
            });
            continue;
        };

        let mut worst = 0.0f64;
        let mut grew = false;
        let mut error = None;
        for _ in 0..500 {
            let before = agent.store().candidate_count();
            match agent.tick(&mut rng) {
                Ok(outcome) => {
                    let store = agent.store();
                    worst = worst.max((store.total_mass() - store.remaining_mass()).abs());
                    grew |= store.candidate_count() > before;
                    if outcome != TickOutcome::Continue {
                        break;
                    }
                }
                Err(e) => {
                    error = Some(e.to_string());
                    break;
                }
            }
        }
        results.push(TestResult {
            name,
            passed: error.is_none() && worst < 1e-9 && !grew,
            detail: match error {
                Some(e) => e,
                None => format!(
                    "max drift {:.2e} over {} ticks, candidates never grew: {}",
                    worst,
                    agent.ticks(),
                    !grew
                ),
            },
        });
    }

    let cells = [Coord::new(0, 1), Coord::new(1, 0), Coord::new(1, 1)];
    let collapsed = HypothesisStore::new(cells, 2).and_then(|mut store| {
        store.remove_cell(Coord::new(1, 0))?;
        store.collapse_on(Coord::new(0, 1))?;
        Ok(store)
    });
    results.push(TestResult {
        name: "posterior_pair_collapse".into(),
        passed: collapsed
            .as_ref()
            .map(|s| !s.is_paired() && (s.cell_probability(Coord::new(1, 1)) - 1.0).abs() < 1e-12)
            .unwrap_or(false),
        detail: match &collapsed {
            Ok(s) => format!(
                "P(1, 1) = {:.6} after collapse",
                s.cell_probability(Coord::new(1, 1))
            ),
            Err(e) => e.to_string(),
        },
    });

    results
}

// ── 4. Determinism ──────────────────────────────────────────────────────

fn validate_determinism(args: &Args) -> Vec<TestResult> {
    section(args, "Determinism");
    let mut results = Vec::new();

    for crew in [1usize, 2] {
        let config = SearchConfig::new(args.grid_size, args.alpha, crew).with_seed(args.seed);
        let first = run_trial(&config);
        let second = run_trial(&config);
        let (passed, detail) = match (first, second) {
            (Ok(a), Ok(b)) => (a == b, format!("{} ticks both runs: {}", a.total_ticks, a == b)),
            (Err(e), _) | (_, Err(e)) => (false, e.to_string()),
        };
        results.push(TestResult {
            name: format!("determinism_crew{}", crew),
            passed,
            detail,
        });
    }

    let invalid = SearchConfig::new(1, -1.0, 3);
    let errors = validate_config(&invalid);
    results.push(TestResult {
        name: "config_validation".into(),
        passed: errors.len() == 3 && run_trial(&invalid).is_err(),
        detail: errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    });

    results
}

// ── 5. Trial Batches ────────────────────────────────────────────────────

fn summarize(trials: &[TrialResult]) -> String {
    let n = trials.len().max(1) as f64;
    let mean_ticks = trials.iter().map(|t| t.total_ticks as f64).sum::<f64>() / n;
    let mean_moves = trials.iter().map(|t| t.moves() as f64).sum::<f64>() / n;
    let mean_distance = trials.iter().map(|t| t.initial_distance as f64).sum::<f64>() / n;
    format!(
        "mean {:.1} ticks ({:.1} moving), mean initial distance {:.1}",
        mean_ticks, mean_moves, mean_distance
    )
}

fn validate_trial_batches(args: &Args) -> Vec<TestResult> {
    section(args, "Trial Batches");
    let mut results = Vec::new();

    for (crew, strategy) in LINEUP {
        let mut finished = Vec::new();
        let mut failures = Vec::new();
        for i in 0..args.trials {
            let seed = args.seed.wrapping_add(i);
            let config = SearchConfig::new(args.grid_size, args.alpha, crew)
                .with_strategy(strategy)
                .with_seed(seed);
            match run_trial(&config) {
                Ok(result) if result.is_success() => finished.push(result),
                Ok(result) => failures.push(format!("seed {} ended {:?}", seed, result.outcome)),
                Err(e) => {
                    warn!("seed {} failed: {}", seed, e);
                    failures.push(format!("seed {}: {}", seed, e));
                }
            }
        }
        info!("crew {} {}: {}", crew, strategy.label(), summarize(&finished));

        results.push(TestResult {
            name: format!("trials_crew{}_{}", crew, strategy.label()),
            passed: failures.is_empty(),
            detail: if failures.is_empty() {
                format!("{}/{} rescued, {}", finished.len(), args.trials, summarize(&finished))
            } else {
                format!("{} failed: {}", failures.len(), failures.join(", "))
            },
        });

        if args.verbose && !args.json {
            println!("  Crew {} ({}): {}", crew, strategy.label(), summarize(&finished));
        }
    }

    results
}

// ── 6. Small-Ship Scenario ──────────────────────────────────────────────

/// First bot/crew pair of open cells exactly `distance` apart.
fn pair_at_distance(grid: &Grid, distance: usize) -> Option<(Coord, Coord)> {
    let open = grid.open_cells();
    open.iter().find_map(|&bot| {
        open.iter()
            .find(|&&crew| bot.manhattan(crew) == distance)
            .map(|&crew| (bot, crew))
    })
}

fn validate_small_ship_scenario(args: &Args) -> Vec<TestResult> {
    section(args, "Small-Ship Scenario");
    let mut results = Vec::new();
    const SIZE: usize = 5;
    const DISTANCE: usize = 3;
    // Idle listening after each route keeps roughly one search in ten past 50
    const TICK_BUDGET: u64 = 100;

    let config = SearchConfig::new(SIZE, args.alpha, 1).with_max_ticks(TICK_BUDGET);
    let mut attempted = 0u32;
    let mut rescued = 0u32;
    let mut errors = Vec::new();

    for i in 0..1000u64 {
        let seed = args.seed.wrapping_add(i);
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = Grid::generate(SIZE, &mut rng);
        let Some((bot, crew)) = pair_at_distance(&grid, DISTANCE) else {
            continue;
        };
        let outcome = SensorProfile::new(args.alpha, SIZE)
            .map_err(|e| e.to_string())
            .and_then(|sensor| {
                let ship = Ship::with_positions(grid, bot, &[crew], &sensor)
                    .map_err(|e| e.to_string())?;
                run_trial_on(ship, sensor, &config, &mut rng).map_err(|e| e.to_string())
            });
        attempted += 1;
        match outcome {
            Ok(result) if result.outcome == Outcome::Success => rescued += 1,
            Ok(_) => {}
            Err(e) => errors.push(format!("seed {}: {}", seed, e)),
        }
    }

    let rate = if attempted == 0 {
        0.0
    } else {
        rescued as f64 / attempted as f64
    };
    results.push(TestResult {
        name: "scenario_5x5_distance3".into(),
        passed: attempted > 0 && errors.is_empty() && rate >= 0.95,
        detail: if errors.is_empty() {
            format!("{}/{} rescued ({:.1}%)", rescued, attempted, rate * 100.0)
        } else {
            errors.join(", ")
        },
    });

    results
}
