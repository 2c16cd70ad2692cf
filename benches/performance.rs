// Performance benchmarks across the configured trial matrix
//
// The matrix is selected through environment variables, e.g.
// ENABLE_REDB=1 ENABLE_DATA_RANDOM=1 STORAGE_FAST=/mnt/nvme cargo bench --bench performance

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logbench::bench::metrics::{last_per_trial, write_json_lines};
use logbench::bench::{Matrix, MatrixConfig, Runner, Workload};
use std::time::Duration;

fn benchmark_matrix(c: &mut Criterion) {
    let _ = env_logger::try_init();

    let config = match MatrixConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid matrix configuration: {}", e);
            return;
        }
    };
    let matrix = Matrix::new(&config, &Workload::ALL);

    let mut results = Vec::new();
    for trial in matrix.trials() {
        let mut group = c.benchmark_group(trial.benchmark());
        group.sample_size(10);
        group.throughput(Throughput::Elements(trial.workload.operations() as u64));

        group.bench_function(BenchmarkId::from_parameter(trial.engine.name()), |b| {
            b.iter_custom(|iters| match Runner::run_performance(trial, iters) {
                Ok(result) => {
                    let elapsed = Duration::from_nanos(result.elapsed_ns);
                    results.push(result);
                    elapsed
                }
                Err(e) => panic!("trial {} failed: {}", trial.name(), e),
            });
        });

        group.finish();
    }

    // Criterion runs each trial once per warm-up and sample.
    let results = last_per_trial(results);

    if let Err(e) = write_json_lines(std::io::stdout().lock(), &results) {
        log::error!("Failed to write results: {}", e);
    }
}

criterion_group!(benches, benchmark_matrix);
criterion_main!(benches);
