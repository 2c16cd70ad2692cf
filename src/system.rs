//! The storage contract every engine adapter implements.
//!
//! A [`DatabaseSystem`] owns one opened storage instance. Work happens inside
//! scoped transactions: [`DatabaseSystem::update`] hands the callback an
//! [`Updater`] that can only append, [`DatabaseSystem::read`] hands it a
//! [`Reader`] that can only look values up.

use crate::codec::CompressionType;
use crate::config::{OffsetLogOptions, RedbOptions, SledOptions};
use crate::engine::{LogSystem, RedbSystem, SledSystem};
use crate::error::{Error, Result};
use crate::sequence::Sequence;
use std::path::Path;

/// A stored value together with its sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Address of the value.
    pub sequence: Sequence,
    /// The decoded value.
    pub value: Vec<u8>,
}

/// Write capability of a read-write transaction.
pub trait Updater {
    /// Appends a value and returns the sequence assigned to it.
    ///
    /// Empty values are rejected.
    fn append(&mut self, value: &[u8]) -> Result<Sequence>;
}

/// Read capability of a read-only transaction.
pub trait Reader {
    /// Returns the value stored at `seq`, or [`Error::NotFound`].
    fn get(&self, seq: Sequence) -> Result<Vec<u8>>;

    /// Calls `f` for up to `limit` items in sequence order, starting at
    /// `start`. Stops at and returns the first error `f` reports.
    fn iterate(
        &self,
        start: Sequence,
        limit: usize,
        f: &mut dyn FnMut(Item) -> Result<()>,
    ) -> Result<()>;
}

/// Callback run inside a read-write transaction.
pub type UpdateFn<'a> = dyn FnMut(&mut dyn Updater) -> Result<()> + 'a;

/// Callback run inside a read-only transaction.
pub type ReadFn<'a> = dyn FnMut(&dyn Reader) -> Result<()> + 'a;

/// One opened storage instance.
pub trait DatabaseSystem {
    /// Runs `f` in a read-write transaction.
    ///
    /// Commits if `f` succeeds. Otherwise nothing `f` appended becomes
    /// visible and the error is returned.
    fn update(&self, f: &mut UpdateFn<'_>) -> Result<()>;

    /// Runs `f` in a read-only transaction.
    fn read(&self, f: &mut ReadFn<'_>) -> Result<()>;

    /// Operations per transaction that give representative throughput.
    fn preferred_transaction_size(&self) -> usize;

    /// Forces all committed data to persistent storage.
    fn sync(&self) -> Result<()>;

    /// Tears the instance down, reporting any I/O failure.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Rejects values the log does not store.
pub(crate) fn check_value(value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_argument("empty values cannot be appended"));
    }
    Ok(())
}

/// Iterates a reader into a vector, for tests and small scans.
pub fn collect_items(reader: &dyn Reader, start: Sequence, limit: usize) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    reader.iterate(start, limit, &mut |item| {
        items.push(item);
        Ok(())
    })?;
    Ok(items)
}

/// A storage engine together with its configuration.
#[derive(Debug, Clone)]
pub enum EngineConfig {
    /// redb with a generic value codec.
    Redb {
        /// Codec applied to every value.
        compression: CompressionType,
        /// Engine options.
        options: RedbOptions,
    },
    /// sled with engine-native compression.
    Sled(SledOptions),
    /// The offset log with the codec injected as its marshal hooks.
    OffsetLog {
        /// Codec applied to every value.
        compression: CompressionType,
        /// Engine options.
        options: OffsetLogOptions,
    },
}

impl EngineConfig {
    /// redb with default options.
    pub fn redb(compression: CompressionType) -> Self {
        EngineConfig::Redb { compression, options: RedbOptions::default() }
    }

    /// sled with default options.
    pub fn sled() -> Self {
        EngineConfig::Sled(SledOptions::default())
    }

    /// The offset log with default options.
    pub fn offset_log(compression: CompressionType) -> Self {
        EngineConfig::OffsetLog { compression, options: OffsetLogOptions::default() }
    }

    /// Engine name without configuration, e.g. `redb`.
    pub fn engine_name(&self) -> &'static str {
        match self {
            EngineConfig::Redb { .. } => "redb",
            EngineConfig::Sled(_) => "sled",
            EngineConfig::OffsetLog { .. } => "offset_log",
        }
    }

    /// Name used in trial names, e.g. `redb_snappy_5000`.
    pub fn name(&self) -> String {
        match self {
            EngineConfig::Redb { compression, options } => {
                with_compression("redb", compression.name(), options.transaction_size)
            }
            EngineConfig::Sled(options) => {
                let compression = if options.compression_factor.is_some() { "zstd" } else { "none" };
                with_compression("sled", compression, options.transaction_size)
            }
            EngineConfig::OffsetLog { compression, options } => {
                with_compression("offset_log", compression.name(), options.transaction_size)
            }
        }
    }

    /// Opens a storage instance rooted at `dir`.
    pub fn open(&self, dir: &Path) -> Result<Box<dyn DatabaseSystem>> {
        let system: Box<dyn DatabaseSystem> = match self {
            EngineConfig::Redb { compression, options } => {
                Box::new(RedbSystem::open(dir, *compression, options.clone())?)
            }
            EngineConfig::Sled(options) => Box::new(SledSystem::open(dir, options.clone())?),
            EngineConfig::OffsetLog { compression, options } => {
                Box::new(LogSystem::open(dir, *compression, options.clone())?)
            }
        };
        log::debug!("Opened {} at {:?}", self.name(), dir);
        Ok(system)
    }
}

fn with_compression(engine: &str, compression: &str, transaction_size: usize) -> String {
    if compression == "none" {
        format!("{}_{}", engine, transaction_size)
    } else {
        format!("{}_{}_{}", engine, compression, transaction_size)
    }
}
