// benches/analysis_benchmarks.rs
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hdemg_core::analysis::{basic_mus_properties, PropertiesParams, SteadyRange};
use hdemg_core::config::SvrConfig;
use hdemg_core::electrodes::sort_rawemg;
use hdemg_core::io::json::emg_from_json;
use hdemg_core::muap::{sta, Firings};
use hdemg_core::processing::{correlate_full, BandType, IirFilter};
use hdemg_core::tools::compute_svr;
use hdemg_core::{save_json_emgfile, EmgFile, Source};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};

const FSAMP: f64 = 2048.0;
const SIGNAL_LENGTHS: &[usize] = &[2048, 8192, 32768];
const MU_COUNTS: &[usize] = &[5, 20];

fn synthetic_file(len: usize, n_mus: usize, channels: usize) -> EmgFile {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let raw = Array2::from_shape_fn((len, channels), |_| rng.gen_range(-1.0..1.0));
    let ref_signal = Array1::from_shape_fn(len, |i| {
        let x = i as f64 / len as f64;
        100.0 * (1.0 - (2.0 * x - 1.0).abs())
    });
    let mupulses = (0..n_mus)
        .map(|mu| {
            let first = len / 10 + mu * 40;
            (first..len - len / 10).step_by(150 + mu * 5).collect()
        })
        .collect();
    EmgFile::new(Source::CustomCsv, "bench", raw, FSAMP, 8.0)
        .with_mupulses(mupulses)
        .unwrap()
        .with_ref_signal(ref_signal)
}

fn benchmark_properties(c: &mut Criterion) {
    let mut group = c.benchmark_group("basic_mus_properties");
    for &n_mus in MU_COUNTS {
        let file = synthetic_file(32768, n_mus, 4);
        let params = PropertiesParams::new(SteadyRange::new(12000, 20000), 100.0);
        group.throughput(Throughput::Elements(n_mus as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_mus), &file, |b, file| {
            b.iter(|| basic_mus_properties(black_box(file), &params).unwrap());
        });
    }
    group.finish();
}

fn benchmark_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtfilt");
    let filter = IirFilter::butterworth(2, BandType::Bandpass(20.0, 500.0), FSAMP).unwrap();
    for &len in SIGNAL_LENGTHS {
        let mut rng = rand::rngs::StdRng::seed_from_u64(len as u64);
        let x: Vec<f64> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &x, |b, x| {
            b.iter(|| filter.filtfilt(black_box(x)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate_full");
    for &len in SIGNAL_LENGTHS {
        let a: Vec<f64> = (0..len).map(|i| (i as f64 * 0.01).sin()).collect();
        let b: Vec<f64> = (0..len).map(|i| (i as f64 * 0.013).cos()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &(a, b), |bench, (a, b)| {
            bench.iter(|| correlate_full(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

fn benchmark_sta(c: &mut Criterion) {
    let file = synthetic_file(32768, 10, 64);
    let sorted = sort_rawemg(&file, Some("GR08MM1305"), 180, true, None, None).unwrap();
    c.bench_function("sta_10mus_64ch", |b| {
        b.iter(|| sta(black_box(&file), &sorted, Firings::All, 50.0).unwrap());
    });
}

fn benchmark_svr(c: &mut Criterion) {
    let file = synthetic_file(16384, 3, 1);
    let config = SvrConfig::default();
    c.bench_function("compute_svr_3mus", |b| {
        b.iter(|| compute_svr(black_box(&file), &config).unwrap());
    });
}

fn benchmark_json_load(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bench.json");
    save_json_emgfile(&synthetic_file(32768, 10, 64).into(), &path, 4).unwrap();
    c.bench_function("emg_from_json_64ch", |b| {
        b.iter(|| emg_from_json(black_box(&path)).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_properties,
    benchmark_filtering,
    benchmark_correlation,
    benchmark_sta,
    benchmark_svr,
    benchmark_json_load
);
criterion_main!(benches);
