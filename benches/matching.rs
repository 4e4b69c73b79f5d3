use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ms2match::extract::QuerySpectrum;
use ms2match::library::Library;
use ms2match::matching::{
    match_batch, score_pair, Algorithm, BatchOptions, MatchingParams, MatchingStrategy, Tolerance,
};
use ms2match::spectrum::{Spectrum, SpectrumBuilder};

/// Deterministic spectrum with `n_peaks` fragments below `precursor`
fn synthetic_spectrum(seed: usize, n_peaks: usize, precursor: f64) -> Spectrum {
    let mut builder = SpectrumBuilder::new().precursor_mz(precursor);
    for j in 0..n_peaks {
        let mz = 50.0 + ((seed * 31 + j * 17) % 4000) as f64 * 0.1;
        let intensity = 100.0 + ((seed * 7 + j * 13) % 997) as f64 * 10.0;
        builder = builder.add_peak(mz, intensity);
    }
    builder.build().unwrap()
}

fn synthetic_queries(count: usize, n_peaks: usize) -> Vec<QuerySpectrum> {
    (0..count)
        .map(|i| {
            let precursor = 150.0 + (i % 300) as f64;
            QuerySpectrum {
                feature_name: format!("FT{:04}", i),
                scan: i as i64,
                precursor_mz: precursor,
                rt: 30.0 + i as f64,
                spectrum: synthetic_spectrum(i, n_peaks, precursor),
            }
        })
        .collect()
}

fn synthetic_library(count: usize, n_peaks: usize) -> Library {
    Library::from_spectra(
        (0..count)
            .map(|i| synthetic_spectrum(i + 10_000, n_peaks, 150.0 + (i % 300) as f64))
            .collect(),
    )
}

/// Pairwise scoring cost per algorithm
fn bench_score_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_pair");
    let query = synthetic_spectrum(1, 100, 300.0);
    let library = synthetic_spectrum(2, 100, 314.0);
    let tolerance = Tolerance::Da(0.01);

    for algorithm in [
        Algorithm::DotProduct,
        Algorithm::Cosine,
        Algorithm::ModifiedCosine,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &algorithm,
            |b, &algorithm| {
                b.iter(|| score_pair(black_box(&query), black_box(&library), algorithm, tolerance))
            },
        );
    }

    group.finish();
}

/// Whole-batch matching across thread counts
fn bench_match_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_batch");
    group.sample_size(10);

    let queries = synthetic_queries(200, 50);
    let library = synthetic_library(1000, 50);
    let params = MatchingParams::new(Algorithm::Cosine).with_min_score(0.1);
    let strategy = MatchingStrategy::Algorithmic(Algorithm::Cosine);

    group.throughput(Throughput::Elements((queries.len() * library.len()) as u64));

    for threads in [1, 2, 4] {
        let options = BatchOptions::default().with_threads(threads);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}threads", threads)),
            &options,
            |b, options| {
                b.iter(|| {
                    match_batch(
                        black_box(&queries),
                        library.entries(),
                        &params,
                        &strategy,
                        options,
                    )
                    .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_score_pair, bench_match_batch);
criterion_main!(benches);
