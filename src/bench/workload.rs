//! Workloads a trial can time.

use super::batch;
use super::data::DataShape;
use crate::error::{Error, Result, ResultExt};
use crate::sequence::Sequence;
use crate::system::DatabaseSystem;
use rand::Rng;

/// Appends performed by one [`Workload::Append`] execution.
pub const APPEND_COUNT: usize = 5000;

/// Highest sequence populated before a read workload.
pub const READ_MAX_SEQUENCE: u64 = 100_000;

/// Reads performed by one execution of a read workload.
pub const READ_COUNT: usize = 5000;

/// A timed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Appends in transactions of the engine's preferred size.
    Append,
    /// Gets of uniformly random sequences in `[0, READ_MAX_SEQUENCE]`.
    ReadRandom,
    /// Gets of consecutive sequences starting at 0.
    ReadSequential,
    /// A forward scan starting at a random sequence.
    Iterate,
}

impl Workload {
    pub const ALL: [Workload; 4] =
        [Workload::Append, Workload::ReadRandom, Workload::ReadSequential, Workload::Iterate];

    pub fn name(&self) -> &'static str {
        match self {
            Workload::Append => "append",
            Workload::ReadRandom => "read_random",
            Workload::ReadSequential => "read_sequential",
            Workload::Iterate => "iterate",
        }
    }

    /// Operations in one execution.
    pub fn operations(&self) -> usize {
        match self {
            Workload::Append => APPEND_COUNT,
            Workload::ReadRandom | Workload::ReadSequential | Workload::Iterate => READ_COUNT,
        }
    }

    /// Untimed preparation. Read workloads populate every sequence up to
    /// [`READ_MAX_SEQUENCE`].
    pub fn setup(&self, system: &dyn DatabaseSystem, shape: DataShape) -> Result<()> {
        match self {
            Workload::Append => Ok(()),
            Workload::ReadRandom | Workload::ReadSequential | Workload::Iterate => {
                let count = READ_MAX_SEQUENCE as usize + 1;
                populate(system, shape, count, system.preferred_transaction_size())
                    .context("populate")
            }
        }
    }

    /// One timed execution.
    pub fn execute(&self, system: &dyn DatabaseSystem, shape: DataShape) -> Result<()> {
        let transaction_size = system.preferred_transaction_size();
        match self {
            Workload::Append => populate(system, shape, APPEND_COUNT, transaction_size),
            Workload::ReadRandom => {
                let mut rng = rand::rng();
                read_each(system, transaction_size, || {
                    Sequence::new(rng.random_range(0..=READ_MAX_SEQUENCE))
                })
            }
            Workload::ReadSequential => {
                let mut next = 0;
                read_each(system, transaction_size, || {
                    let seq = Sequence::new(next);
                    next += 1;
                    seq
                })
            }
            Workload::Iterate => {
                let last_start = READ_MAX_SEQUENCE + 1 - READ_COUNT as u64;
                let start = rand::rng().random_range(0..=last_start);
                scan(system, Sequence::new(start), transaction_size)
            }
        }
    }
}

/// Appends `count` generated values in transactions of `transaction_size`.
pub fn populate(
    system: &dyn DatabaseSystem,
    shape: DataShape,
    count: usize,
    transaction_size: usize,
) -> Result<()> {
    let mut rng = rand::rng();
    for n in batch(count, transaction_size) {
        system.update(&mut |updater| {
            for _ in 0..n {
                let value = shape.generate(&mut rng)?;
                updater.append(&value)?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Gets [`READ_COUNT`] sequences chosen by `next`, batched per transaction.
fn read_each(
    system: &dyn DatabaseSystem,
    transaction_size: usize,
    mut next: impl FnMut() -> Sequence,
) -> Result<()> {
    for n in batch(READ_COUNT, transaction_size) {
        system.read(&mut |reader| {
            for _ in 0..n {
                let seq = next();
                let value = reader.get(seq)?;
                if value.is_empty() {
                    return Err(Error::invalid_state(format!("empty value at sequence {}", seq)));
                }
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Scans [`READ_COUNT`] items from `start`, one transaction per batch.
fn scan(system: &dyn DatabaseSystem, start: Sequence, transaction_size: usize) -> Result<()> {
    let mut next = start;
    for n in batch(READ_COUNT, transaction_size) {
        let mut seen = 0;
        system.read(&mut |reader| {
            reader.iterate(next, n, &mut |item| {
                if item.value.is_empty() {
                    return Err(Error::invalid_state(format!(
                        "empty value at sequence {}",
                        item.sequence
                    )));
                }
                seen += 1;
                Ok(())
            })
        })?;

        if seen != n {
            return Err(Error::invalid_state(format!(
                "scan from {} returned {} of {} items",
                next, seen, n
            )));
        }
        next = Sequence::new(next.value() + n as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionType;
    use crate::config::OffsetLogOptions;
    use crate::system::EngineConfig;
    use tempfile::TempDir;

    fn small_log() -> EngineConfig {
        EngineConfig::OffsetLog {
            compression: CompressionType::None,
            options: OffsetLogOptions::new().transaction_size(700),
        }
    }

    #[test]
    fn test_workload_names() {
        let names: Vec<&str> = Workload::ALL.iter().map(|w| w.name()).collect();
        assert_eq!(names, vec!["append", "read_random", "read_sequential", "iterate"]);
    }

    #[test]
    fn test_append_execution_appends_count() {
        let dir = TempDir::new().unwrap();
        let system = small_log().open(dir.path()).unwrap();

        Workload::Append.execute(system.as_ref(), DataShape::RandomBytes { len: 8 }).unwrap();
        Workload::Append.execute(system.as_ref(), DataShape::RandomBytes { len: 8 }).unwrap();

        system
            .read(&mut |reader| {
                reader.get(Sequence::new(2 * APPEND_COUNT as u64 - 1))?;
                assert!(reader.get(Sequence::new(2 * APPEND_COUNT as u64)).unwrap_err().is_not_found());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reads_fail_without_setup() {
        let dir = TempDir::new().unwrap();
        let system = small_log().open(dir.path()).unwrap();
        let shape = DataShape::RandomBytes { len: 8 };

        let err = Workload::ReadSequential.execute(system.as_ref(), shape).unwrap_err();
        assert!(err.is_not_found());
        assert!(Workload::Iterate.execute(system.as_ref(), shape).is_err());
    }

    #[test]
    fn test_read_workloads_after_setup() {
        let dir = TempDir::new().unwrap();
        let system = small_log().open(dir.path()).unwrap();
        let shape = DataShape::RandomBytes { len: 8 };

        Workload::ReadRandom.setup(system.as_ref(), shape).unwrap();
        for workload in [Workload::ReadRandom, Workload::ReadSequential, Workload::Iterate] {
            workload.execute(system.as_ref(), shape).unwrap();
        }
    }
}
