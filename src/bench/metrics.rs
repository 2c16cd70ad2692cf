//! Metrics records and helpers for the external report renderer.
//!
//! Records are written as JSON lines, one object per line.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Result of one timed trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceResult {
    /// Full trial name.
    pub name: String,
    /// Engine configuration name, e.g. `redb_snappy_5000`.
    pub system: String,
    /// Trial name without the engine, e.g. `fast_storage/random_data/append`.
    pub benchmark: String,
    /// Mean time of one workload execution.
    pub ns_per_op: f64,
    /// Workload executions timed.
    pub iterations: u64,
    /// Individual appends or gets across all executions.
    pub operations: u64,
    /// Total timed duration.
    pub elapsed_ns: u64,
}

/// Result of one sizing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeResult {
    pub system: String,
    /// Data shape name.
    pub benchmark: String,
    /// Disk space allocated under the directory after close.
    pub bytes: u64,
    /// Values inserted.
    pub values: u64,
    pub bytes_per_value: f64,
}

/// A record that can be compared across engines.
pub trait Metric {
    fn system(&self) -> &str;
    fn benchmark(&self) -> &str;
    /// Lower is better.
    fn value(&self) -> f64;
}

impl Metric for PerformanceResult {
    fn system(&self) -> &str {
        &self.system
    }

    fn benchmark(&self) -> &str {
        &self.benchmark
    }

    fn value(&self) -> f64 {
        self.ns_per_op
    }
}

impl Metric for SizeResult {
    fn system(&self) -> &str {
        &self.system
    }

    fn benchmark(&self) -> &str {
        &self.benchmark
    }

    fn value(&self) -> f64 {
        self.bytes_per_value
    }
}

/// Results of every engine for one benchmark.
#[derive(Debug)]
pub struct BenchmarkGroup<'a, M> {
    pub benchmark: String,
    /// Sorted ascending by [`Metric::value`], ties by system name.
    pub results: Vec<&'a M>,
}

/// Groups results by benchmark name. Groups come out in name order.
pub fn group_by_benchmark<M: Metric>(results: &[M]) -> Vec<BenchmarkGroup<'_, M>> {
    let mut groups: BTreeMap<&str, Vec<&M>> = BTreeMap::new();
    for result in results {
        groups.entry(result.benchmark()).or_default().push(result);
    }

    groups
        .into_iter()
        .map(|(benchmark, mut results)| {
            results.sort_by(|a, b| {
                a.value().total_cmp(&b.value()).then_with(|| a.system().cmp(b.system()))
            });
            BenchmarkGroup { benchmark: benchmark.to_string(), results }
        })
        .collect()
}

/// Keeps the last result recorded under each trial name, in first-seen order.
pub fn last_per_trial(results: Vec<PerformanceResult>) -> Vec<PerformanceResult> {
    let mut kept: Vec<PerformanceResult> = Vec::new();
    for result in results {
        match kept.iter_mut().find(|r| r.name == result.name) {
            Some(slot) => *slot = result,
            None => kept.push(result),
        }
    }
    kept
}

/// Writes each record as one line of JSON.
pub fn write_json_lines<W: Write, T: Serialize>(mut writer: W, records: &[T]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Total size of all regular files under `path`.
pub fn dir_size(path: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            size += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            size += entry.metadata()?.len();
        }
    }
    Ok(size)
}

/// Bytes allocated on disk for all regular files under `path`.
///
/// Unlike [`dir_size`], holes left by growing a file with `set_len` are not
/// counted. Falls back to the apparent size where block counts are unknown.
pub fn disk_usage(path: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            size += disk_usage(&entry.path())?;
        } else if file_type.is_file() {
            size += allocated_bytes(&entry.metadata()?);
        }
    }
    Ok(size)
}

#[cfg(unix)]
fn allocated_bytes(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    // st_blocks is always in 512-byte units.
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_bytes(metadata: &fs::Metadata) -> u64 {
    metadata.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn size(system: &str, benchmark: &str, bytes_per_value: f64) -> SizeResult {
        SizeResult {
            system: system.to_string(),
            benchmark: benchmark.to_string(),
            bytes: 0,
            values: 1,
            bytes_per_value,
        }
    }

    #[test]
    fn test_group_by_benchmark_sorts_ascending() {
        let results = vec![
            size("sled_5000", "random_data", 1200.0),
            size("redb_5000", "feed_message", 600.0),
            size("offset_log_5000", "random_data", 1010.0),
            size("redb_5000", "random_data", 1010.0),
        ];

        let groups = group_by_benchmark(&results);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].benchmark, "feed_message");
        assert_eq!(groups[1].benchmark, "random_data");

        let order: Vec<&str> = groups[1].results.iter().map(|r| r.system.as_str()).collect();
        assert_eq!(order, vec!["offset_log_5000", "redb_5000", "sled_5000"]);
    }

    fn run(name: &str, iterations: u64) -> PerformanceResult {
        PerformanceResult {
            name: name.to_string(),
            system: "redb_5000".to_string(),
            benchmark: "fast_storage/random_data/append".to_string(),
            ns_per_op: 10.0,
            iterations,
            operations: iterations * 5000,
            elapsed_ns: iterations * 50_000,
        }
    }

    #[test]
    fn test_last_per_trial() {
        let results = vec![run("a", 1), run("b", 1), run("a", 2), run("a", 3), run("b", 4)];

        let kept = last_per_trial(results);
        let summary: Vec<(&str, u64)> =
            kept.iter().map(|r| (r.name.as_str(), r.iterations)).collect();
        assert_eq!(summary, vec![("a", 3), ("b", 4)]);
    }

    #[test]
    fn test_write_json_lines() {
        let results = vec![size("a", "x", 1.5), size("b", "x", 2.0)];
        let mut out = Vec::new();
        write_json_lines(&mut out, &results).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["system"], "a");
        assert_eq!(first["bytes_per_value"], 1.5);
    }

    #[test]
    fn test_dir_size_is_recursive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b"), vec![0u8; 23]).unwrap();

        assert_eq!(dir_size(dir.path()).unwrap(), 123);
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_usage_skips_holes() {
        let dir = TempDir::new().unwrap();
        let file = fs::File::create(dir.path().join("grown")).unwrap();
        file.set_len(64 * 1024 * 1024).unwrap();
        drop(file);
        fs::write(dir.path().join("small"), vec![1u8; 100]).unwrap();

        let usage = disk_usage(dir.path()).unwrap();
        assert!(usage >= 100);
        assert!(usage < 1024 * 1024, "{} bytes allocated", usage);
        assert_eq!(dir_size(dir.path()).unwrap(), 64 * 1024 * 1024 + 100);
    }
}
