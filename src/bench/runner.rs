//! Executes trials against fresh storage instances.

use super::data::DataShape;
use super::matrix::Trial;
use super::metrics::{disk_usage, PerformanceResult, SizeResult};
use crate::error::{Result, ResultExt};
use crate::system::EngineConfig;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;

/// Values written per transaction by a sizing run.
pub const MAX_VALUES_PER_TRANSACTION: usize = 1000;

/// Runs trials. Every run gets its own directory, removed afterwards.
pub struct Runner;

impl Runner {
    /// Times `iterations` executions of the trial's workload.
    ///
    /// Setup is untimed. The timer covers the executions and the final sync,
    /// but not open or close.
    pub fn run_performance(trial: &Trial, iterations: u64) -> Result<PerformanceResult> {
        let dir = scratch_dir(&trial.medium.path, "logbench-perf-")?;
        let system = trial.engine.open(dir.path()).context("open")?;

        trial.workload.setup(system.as_ref(), trial.shape).context("setup")?;

        let started = Instant::now();
        for _ in 0..iterations {
            trial.workload.execute(system.as_ref(), trial.shape).context("execute")?;
        }
        system.sync().context("sync")?;
        let elapsed = started.elapsed();

        system.close().context("close")?;

        let elapsed_ns = elapsed.as_nanos() as u64;
        let result = PerformanceResult {
            name: trial.name(),
            system: trial.engine.name(),
            benchmark: trial.benchmark(),
            ns_per_op: elapsed_ns as f64 / iterations.max(1) as f64,
            iterations,
            operations: iterations * trial.workload.operations() as u64,
            elapsed_ns,
        };
        log::debug!("{}: {:.0} ns/op", result.name, result.ns_per_op);

        Ok(result)
    }

    /// Measures on-disk bytes per value, in a scratch directory under the
    /// system temp dir.
    pub fn run_size(engine: &EngineConfig, shape: DataShape, values: u64) -> Result<SizeResult> {
        Self::run_size_in(&std::env::temp_dir(), engine, shape, values)
    }

    /// Inserts `values` values in transactions of at most
    /// [`MAX_VALUES_PER_TRANSACTION`], syncs, closes, and measures the
    /// directory.
    pub fn run_size_in(
        root: &Path,
        engine: &EngineConfig,
        shape: DataShape,
        values: u64,
    ) -> Result<SizeResult> {
        let dir = scratch_dir(root, "logbench-size-")?;
        let system = engine.open(dir.path()).context("open")?;

        super::workload::populate(
            system.as_ref(),
            shape,
            values as usize,
            MAX_VALUES_PER_TRANSACTION,
        )
        .context("insert")?;
        system.sync().context("sync")?;
        system.close().context("close")?;

        let bytes = disk_usage(dir.path()).context("measure")?;
        let bytes_per_value = bytes as f64 / values.max(1) as f64;
        log::info!(
            "{}/{} with {} values: {} bytes ({:.0} per value)",
            engine.name(),
            shape.name(),
            values,
            bytes,
            bytes_per_value
        );

        Ok(SizeResult {
            system: engine.name(),
            benchmark: shape.name().to_string(),
            bytes,
            values,
            bytes_per_value,
        })
    }
}

fn scratch_dir(root: &Path, prefix: &str) -> Result<TempDir> {
    fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
    Ok(dir)
}
