//! The trial matrix and its environment-driven configuration.

use super::data::DataShape;
use super::metrics::PerformanceResult;
use super::runner::Runner;
use super::workload::Workload;
use crate::codec::CompressionType;
use crate::config::{OffsetLogOptions, RedbOptions, SledOptions, DEFAULT_TRANSACTION_SIZE};
use crate::error::{Error, Result};
use crate::system::EngineConfig;
use std::path::PathBuf;

/// zstd level used for the compressed sled variant.
pub const SLED_COMPRESSION_FACTOR: i32 = 3;

/// A directory on a particular kind of storage device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMedium {
    pub name: String,
    pub path: PathBuf,
}

impl StorageMedium {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }
}

/// Which dimensions of the matrix are enabled.
///
/// A toggle counts as set when its variable holds any non-empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConfig {
    /// `ENABLE_REDB`
    pub redb: bool,
    /// `ENABLE_SLED`
    pub sled: bool,
    /// `ENABLE_OFFSET_LOG`
    pub offset_log: bool,
    /// `ENABLE_COMPRESSION`: codec variants of redb and the offset log.
    pub compression: bool,
    /// `ENABLE_DATA_RANDOM`
    pub data_random: bool,
    /// `ENABLE_DATA_FEED`
    pub data_feed: bool,
    /// `STORAGE_FAST` and `STORAGE_SLOW`, in that order.
    pub storage: Vec<StorageMedium>,
    /// `TRANSACTION_SIZES`, comma separated.
    pub transaction_sizes: Vec<usize>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            redb: false,
            sled: false,
            offset_log: false,
            compression: false,
            data_random: false,
            data_feed: false,
            storage: Vec::new(),
            transaction_sizes: vec![DEFAULT_TRANSACTION_SIZE],
        }
    }
}

impl MatrixConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's
    /// value if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let toggle = |key: &str| {
            let set = value(key).is_some();
            if !set {
                log::info!("{} is not set", key);
            }
            set
        };

        let mut storage = Vec::new();
        for (key, name) in [("STORAGE_FAST", "fast_storage"), ("STORAGE_SLOW", "slow_storage")] {
            match value(key) {
                Some(path) => storage.push(StorageMedium::new(name, path)),
                None => log::info!("{} is not set", key),
            }
        }

        let transaction_sizes = match value("TRANSACTION_SIZES") {
            Some(sizes) => parse_sizes(&sizes)?,
            None => vec![DEFAULT_TRANSACTION_SIZE],
        };

        Ok(Self {
            redb: toggle("ENABLE_REDB"),
            sled: toggle("ENABLE_SLED"),
            offset_log: toggle("ENABLE_OFFSET_LOG"),
            compression: toggle("ENABLE_COMPRESSION"),
            data_random: toggle("ENABLE_DATA_RANDOM"),
            data_feed: toggle("ENABLE_DATA_FEED"),
            storage,
            transaction_sizes,
        })
    }

    /// Every enabled engine configuration.
    pub fn engines(&self) -> Vec<EngineConfig> {
        let codecs: Vec<CompressionType> = if self.compression {
            std::iter::once(CompressionType::None).chain(CompressionType::compressed()).collect()
        } else {
            vec![CompressionType::None]
        };

        let mut engines = Vec::new();
        for &size in &self.transaction_sizes {
            if self.redb {
                for &compression in &codecs {
                    let options = RedbOptions::new().transaction_size(size);
                    engines.push(EngineConfig::Redb { compression, options });
                }
            }
            if self.sled {
                let options = SledOptions::new().transaction_size(size);
                engines.push(EngineConfig::Sled(options.clone()));
                engines.push(EngineConfig::Sled(options.compression_factor(SLED_COMPRESSION_FACTOR)));
            }
            if self.offset_log {
                for &compression in &codecs {
                    let options = OffsetLogOptions::new().transaction_size(size);
                    engines.push(EngineConfig::OffsetLog { compression, options });
                }
            }
        }
        engines
    }

    /// Every enabled data shape.
    pub fn data_shapes(&self) -> Vec<DataShape> {
        let mut shapes = Vec::new();
        if self.data_random {
            shapes.push(DataShape::random_bytes());
        }
        if self.data_feed {
            shapes.push(DataShape::FeedMessage);
        }
        shapes
    }

    /// Directory sizing runs are placed under: the first configured medium,
    /// or the system temp dir.
    pub fn size_root(&self) -> PathBuf {
        match self.storage.first() {
            Some(medium) => medium.path.clone(),
            None => std::env::temp_dir(),
        }
    }
}

fn parse_sizes(sizes: &str) -> Result<Vec<usize>> {
    sizes
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(0) | Err(_) => {
                Err(Error::invalid_argument(format!("invalid transaction size '{}'", s)))
            }
            Ok(n) => Ok(n),
        })
        .collect()
}

/// One cell of the matrix.
#[derive(Debug, Clone)]
pub struct Trial {
    pub engine: EngineConfig,
    pub medium: StorageMedium,
    pub shape: DataShape,
    pub workload: Workload,
}

impl Trial {
    /// The part of the name shared by every engine run on the same
    /// benchmark, e.g. `fast_storage/random_data/append`.
    pub fn benchmark(&self) -> String {
        format!("{}/{}/{}", self.medium.name, self.shape.name(), self.workload.name())
    }

    /// Full trial name, e.g. `redb_5000/fast_storage/random_data/append`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.engine.name(), self.benchmark())
    }
}

/// What happened to one trial.
#[derive(Debug)]
pub struct TrialOutcome {
    pub trial: Trial,
    pub result: Result<PerformanceResult>,
}

/// All trials of a configuration, in a fixed order.
#[derive(Debug, Clone)]
pub struct Matrix {
    trials: Vec<Trial>,
}

impl Matrix {
    /// Builds the cartesian product of the enabled dimensions.
    pub fn new(config: &MatrixConfig, workloads: &[Workload]) -> Self {
        let mut trials = Vec::new();
        for engine in config.engines() {
            for medium in &config.storage {
                for shape in config.data_shapes() {
                    for &workload in workloads {
                        trials.push(Trial {
                            engine: engine.clone(),
                            medium: medium.clone(),
                            shape,
                            workload,
                        });
                    }
                }
            }
        }

        if trials.is_empty() {
            log::warn!("No trials enabled: set at least one engine, data shape and storage medium");
        }
        Self { trials }
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Runs every trial in order. A failed trial is logged and recorded,
    /// and the remaining trials still run.
    pub fn run(&self, iterations: u64) -> Vec<TrialOutcome> {
        let mut outcomes = Vec::with_capacity(self.trials.len());
        for trial in &self.trials {
            log::info!("Running {}", trial.name());
            let result = Runner::run_performance(trial, iterations);
            if let Err(e) = &result {
                log::error!("Trial {} failed: {}", trial.name(), e);
            }
            outcomes.push(TrialOutcome { trial: trial.clone(), result });
        }
        outcomes
    }
}
