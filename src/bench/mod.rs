//! Benchmark harness.
//!
//! A [`Trial`](matrix::Trial) is one cell of the matrix {engine × storage
//! medium × data shape × workload}. The [`Runner`](runner::Runner) opens a
//! fresh storage instance per trial, runs the untimed setup and then the timed
//! workload, and reports a metrics record. Trials run one after another; a
//! failure only ends its own trial.

pub mod data;
pub mod matrix;
pub mod metrics;
pub mod runner;
pub mod workload;

pub use data::DataShape;
pub use matrix::{Matrix, MatrixConfig, StorageMedium, Trial, TrialOutcome};
pub use metrics::{PerformanceResult, SizeResult};
pub use runner::Runner;
pub use workload::Workload;

/// Splits `total` operations into transactions of at most `size`.
///
/// Full chunks come first and the remainder last. A zero `size` puts
/// everything in one chunk.
///
/// ```
/// use logbench::bench::batch;
///
/// assert_eq!(batch(250, 100), vec![100, 100, 50]);
/// assert!(batch(0, 100).is_empty());
/// ```
pub fn batch(total: usize, size: usize) -> Vec<usize> {
    if size == 0 {
        return if total == 0 { Vec::new() } else { vec![total] };
    }

    let mut batches = Vec::with_capacity(total.div_ceil(size));
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(size);
        batches.push(n);
        remaining -= n;
    }
    batches
}
