//! Log adapter over sled.
//!
//! sled compresses pages itself, so values are stored as given. A write
//! transaction is the exclusive writer lock plus one [`sled::Batch`]: appends
//! accumulate in the batch and the batch is applied atomically on commit.

use crate::config::SledOptions;
use crate::error::{Error, Result, ResultExt};
use crate::sequence::{CounterKey, CounterStore, Sequence, SequenceAllocator, SEQUENCE_SIZE};
use crate::system::{check_value, DatabaseSystem, Item, ReadFn, Reader, UpdateFn, Updater};
use parking_lot::Mutex;
use sled::{Batch, Db, Tree};
use std::fs;
use std::path::{Path, PathBuf};

/// Tree holding the counter and all values.
pub const VALUES_TREE: &str = "values";

const VALUE_PREFIX: &[u8] = b"value";
const LAST_SEQUENCE_KEY: &[u8] = b"last_sequence";

/// A log stored in a sled database directory.
pub struct SledSystem {
    db: Db,
    values: Tree,
    writer: Mutex<()>,
    dir: PathBuf,
    options: SledOptions,
}

impl SledSystem {
    /// Opens or creates a sled database in `dir`.
    pub fn open(dir: &Path, options: SledOptions) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(dir)?;

        let mut config = sled::Config::new()
            .path(dir)
            .cache_capacity(options.cache_capacity)
            .flush_every_ms(options.flush_every_ms);
        if let Some(factor) = options.compression_factor {
            config = config.use_compression(true).compression_factor(factor);
        }

        let db = config.open().context("open database")?;
        let values = db.open_tree(VALUES_TREE).context("open values tree")?;

        Ok(Self { db, values, writer: Mutex::new(()), dir: dir.to_path_buf(), options })
    }
}

/// Key of the value stored at `seq`: the prefix followed by the big-endian
/// sequence, so byte order matches sequence order.
fn value_key(seq: Sequence) -> Vec<u8> {
    let mut key = Vec::with_capacity(VALUE_PREFIX.len() + SEQUENCE_SIZE);
    key.extend_from_slice(VALUE_PREFIX);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Reads committed state from the tree and buffers writes in the batch.
struct SledTxn<'a> {
    tree: &'a Tree,
    batch: Batch,
}

impl CounterStore for SledTxn<'_> {
    fn load(&self) -> Result<Option<Sequence>> {
        match self.tree.get(LAST_SEQUENCE_KEY)? {
            Some(bytes) => Ok(Some(Sequence::from_be_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store(&mut self, seq: Sequence) -> Result<()> {
        self.batch.insert(LAST_SEQUENCE_KEY, seq.to_be_bytes().to_vec());
        Ok(())
    }
}

struct SledUpdater<'a> {
    counter: CounterKey<SledTxn<'a>>,
}

impl Updater for SledUpdater<'_> {
    fn append(&mut self, value: &[u8]) -> Result<Sequence> {
        check_value(value)?;
        let seq = self.counter.allocate_next()?;
        self.counter.store_mut().batch.insert(value_key(seq), value);
        Ok(seq)
    }
}

struct SledReader<'a> {
    tree: &'a Tree,
}

impl Reader for SledReader<'_> {
    fn get(&self, seq: Sequence) -> Result<Vec<u8>> {
        match self.tree.get(value_key(seq)).context("get")? {
            Some(value) => Ok(value.to_vec()),
            None => Err(Error::NotFound(seq)),
        }
    }

    fn iterate(
        &self,
        start: Sequence,
        limit: usize,
        f: &mut dyn FnMut(Item) -> Result<()>,
    ) -> Result<()> {
        let range = value_key(start)..=value_key(Sequence::MAX);
        for entry in self.tree.range(range).take(limit) {
            let (key, value) = entry.context("range next")?;
            let sequence = Sequence::from_be_bytes(&key[VALUE_PREFIX.len()..])?;
            f(Item { sequence, value: value.to_vec() })?;
        }
        Ok(())
    }
}

impl DatabaseSystem for SledSystem {
    fn update(&self, f: &mut UpdateFn<'_>) -> Result<()> {
        let _writer = self.writer.lock();

        let txn = SledTxn { tree: &self.values, batch: Batch::default() };
        let mut updater = SledUpdater { counter: CounterKey::new(txn) };
        f(&mut updater)?;

        let txn = updater.counter.into_store();
        self.values.apply_batch(txn.batch).context("apply batch")
    }

    fn read(&self, f: &mut ReadFn<'_>) -> Result<()> {
        f(&SledReader { tree: &self.values })
    }

    fn preferred_transaction_size(&self) -> usize {
        self.options.transaction_size
    }

    fn sync(&self) -> Result<()> {
        self.db.flush().context("flush")?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.sync()?;
        let SledSystem { db, values, dir, .. } = *self;
        drop(values);
        drop(db);
        log::debug!("Closed sled database {:?}", dir);
        Ok(())
    }
}
