use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rescuebot_logic::config::SearchConfig;
use rescuebot_logic::grid::{Coord, Grid};
use rescuebot_logic::hypothesis::HypothesisStore;
use rescuebot_logic::sensor::{Reading, SensorProfile};
use rescuebot_logic::trial::run_trial;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn bench_posterior_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("posterior_update");
    let size = env_usize("RB_BENCH_GRID", 20);
    let grid = Grid::generate(size, &mut StdRng::seed_from_u64(0xBEEF));
    let sensor = SensorProfile::new(0.05, size).expect("valid alpha");
    let bot = grid.open_cells()[0];
    let candidates: Vec<Coord> = grid.open_cells().into_iter().skip(1).collect();

    for crew in [1usize, 2] {
        group.bench_function(format!("grid{size}_crew{crew}"), |b| {
            b.iter_batched(
                || HypothesisStore::new(candidates.iter().copied(), crew).expect("non-empty"),
                |mut store| {
                    store
                        .observe(bot, &sensor, Reading::Beep)
                        .expect("update succeeds");
                    store
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_full_trial(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial");
    group.sample_size(env_usize("RB_BENCH_SAMPLES", 20));
    let size = env_usize("RB_BENCH_TRIAL_GRID", 15);

    for crew in [1usize, 2] {
        let mut seed = 0u64;
        group.bench_function(format!("grid{size}_crew{crew}"), |b| {
            b.iter(|| {
                seed += 1;
                let config = SearchConfig::new(size, 0.05, crew).with_seed(seed);
                run_trial(&config).expect("trial completes")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_posterior_update, bench_full_trial);
criterion_main!(benches);
