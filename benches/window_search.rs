use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hifitime::Epoch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use overlap_probe::config::derived::DerivedSettings;
use overlap_probe::config::reference_overlap::ReferenceOverlap;
use overlap_probe::config::OverlapParams;
use overlap_probe::daily_processing::process_day;
use overlap_probe::pre_checks::make_time_windows;
use overlap_probe::process_checks::{evaluate_time_window, WindowContext};
use overlap_probe::profiles::{InstrumentMeta, ProfileSet, RawDay, RawProfile};
use overlap_probe::sample_sorter::remove_outliers;

const N_BINS: usize = 200;

fn reference() -> ReferenceOverlap {
    ReferenceOverlap::new(
        (0..N_BINS)
            .map(|i| {
                let r = 15.0 * (i + 1) as f64;
                if r < 900.0 {
                    0.5 * (1.0 - (std::f64::consts::PI * r / 900.0).cos())
                } else {
                    1.0
                }
            })
            .collect(),
    )
}

/// Clear day with a small multiplicative noise on every bin.
fn noisy_day(rng: &mut StdRng, n_times: usize) -> ProfileSet {
    let range: Vec<f64> = (0..N_BINS).map(|i| 15.0 * (i + 1) as f64).collect();
    let slope = -1e-5 / std::f64::consts::LN_10;
    let profiles = (0..n_times)
        .map(|t| RawProfile {
            time: Epoch::from_unix_seconds(1_676_332_800.0 + 60.0 * t as f64),
            signal: range
                .iter()
                .map(|r| {
                    let noise = rng.random_range(-1e-4..1e-4);
                    Some(1e5 * 10f64.powf(slope * r) * (1.0 + noise))
                })
                .collect(),
            internal_temperature: Some(300.0),
            sky_condition: Some(0),
            cloud_base: vec![Some(-1.0)],
        })
        .collect();
    let raw = RawDay {
        meta: InstrumentMeta::default(),
        range,
        range_resolution: 15.0,
        profiles,
    };
    ProfileSet::from_raw(raw).unwrap()
}

fn params() -> OverlapParams {
    OverlapParams::builder()
        .max_fit_range(1500.0)
        .d_fit_range(60.0)
        .d_fit_length(60.0)
        .min_expected_zero_fit_value(3.0)
        .max_expected_zero_fit_value(8.0)
        .build()
        .unwrap()
}

fn bench_time_window(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x0E41A9);
    let set = noisy_day(&mut rng, 60);
    let params = params();
    let reference = reference();
    let derived = DerivedSettings::resolve(&params, &set.range, 15.0, &reference).unwrap();
    let window = make_time_windows(&set, &params)[0];
    let ctx = WindowContext::new(&set, &reference, &params, &derived, window, 1500.0).unwrap();

    c.bench_function("window_search/evaluate_time_window", |b| {
        b.iter(|| evaluate_time_window(black_box(&ctx)).unwrap())
    });
}

fn bench_day(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x0E41A9);
    let set = noisy_day(&mut rng, 240);
    let params = params();
    let reference = reference();

    let mut group = c.benchmark_group("window_search");
    group.sample_size(10);
    group.bench_function("process_day", |b| {
        b.iter(|| process_day(black_box(&set), &reference, &params).unwrap())
    });
    group.finish();
}

fn bench_outliers(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let curves: Vec<Vec<f64>> = (0..400)
        .map(|_| (0..N_BINS).map(|_| 1.0 + rng.random_range(-0.01..0.01)).collect())
        .collect();
    let views: Vec<&[f64]> = curves.iter().map(|c| c.as_slice()).collect();
    let params = OverlapParams::default();

    c.bench_function("window_search/remove_outliers", |b| {
        b.iter(|| remove_outliers(black_box(&views), &params))
    });
}

criterion_group!(benches, bench_time_window, bench_day, bench_outliers);
criterion_main!(benches);
