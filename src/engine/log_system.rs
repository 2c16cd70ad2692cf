//! Log adapter over the in-crate [`OffsetLog`].
//!
//! There is no separate transaction layer: appends go straight to the log.
//! An update holds the write gate for its whole duration and, if the
//! callback fails, truncates the log back to where the update started.

use crate::codec::{new_codec, CompressionType, ValueCodec};
use crate::config::OffsetLogOptions;
use crate::error::{Error, Result, ResultExt};
use crate::offset_log::{LogCodec, OffsetLog};
use crate::sequence::{AutoIncrement, NativeCounter, Sequence, SequenceAllocator};
use crate::system::{check_value, DatabaseSystem, Item, ReadFn, Reader, UpdateFn, Updater};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Injects a [`ValueCodec`] as the log's marshal hooks.
pub struct CodecHooks(Arc<dyn ValueCodec>);

impl CodecHooks {
    /// Wraps `codec` for use as an [`OffsetLog`] codec.
    pub fn new(codec: Arc<dyn ValueCodec>) -> Self {
        Self(codec)
    }
}

impl LogCodec for CodecHooks {
    fn marshal(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.0.encode(value)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.0.decode(data)
    }
}

/// A log stored as an offset log directory.
pub struct LogSystem {
    log: OffsetLog<CodecHooks>,
    gate: RwLock<()>,
    options: OffsetLogOptions,
}

impl LogSystem {
    /// Opens or creates an offset log in `dir`.
    pub fn open(dir: &Path, compression: CompressionType, options: OffsetLogOptions) -> Result<Self> {
        let hooks = CodecHooks::new(new_codec(compression));
        let log = OffsetLog::open(dir, hooks, options.clone())?;
        Ok(Self { log, gate: RwLock::new(()), options })
    }

    /// Number of entries in the log.
    pub fn len(&self) -> u64 {
        self.log.len()
    }

    /// Returns true if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

/// A single append seen as one step of the log's 1-based counter.
struct PendingAppend<'a> {
    log: &'a OffsetLog<CodecHooks>,
    value: &'a [u8],
}

impl AutoIncrement for PendingAppend<'_> {
    fn increment(&mut self) -> Result<u64> {
        self.log.append(self.value)
    }

    fn count(&self) -> u64 {
        self.log.len()
    }
}

struct LogUpdater<'a> {
    log: &'a OffsetLog<CodecHooks>,
}

impl Updater for LogUpdater<'_> {
    fn append(&mut self, value: &[u8]) -> Result<Sequence> {
        check_value(value)?;
        NativeCounter::new(PendingAppend { log: self.log, value })
            .allocate_next()
            .context("append")
    }
}

struct LogReader<'a> {
    log: &'a OffsetLog<CodecHooks>,
}

impl Reader for LogReader<'_> {
    fn get(&self, seq: Sequence) -> Result<Vec<u8>> {
        self.log.get(seq.value()).context("get")?.ok_or(Error::NotFound(seq))
    }

    fn iterate(
        &self,
        start: Sequence,
        limit: usize,
        f: &mut dyn FnMut(Item) -> Result<()>,
    ) -> Result<()> {
        for entry in self.log.iter(start.value())?.take(limit) {
            let (index, value) = entry.context("iterate")?;
            f(Item { sequence: Sequence::new(index), value })?;
        }
        Ok(())
    }
}

impl DatabaseSystem for LogSystem {
    fn update(&self, f: &mut UpdateFn<'_>) -> Result<()> {
        let _gate = self.gate.write();
        let start = self.log.len();

        let result = f(&mut LogUpdater { log: &self.log });
        if let Err(e) = result {
            // On failure the log refuses further writes until reopened.
            if let Err(truncate) = self.log.truncate(start) {
                log::error!(
                    "Failed to roll offset log {:?} back to {} entries: {}",
                    self.log.dir(),
                    start,
                    truncate
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn read(&self, f: &mut ReadFn<'_>) -> Result<()> {
        let _gate = self.gate.read();
        f(&LogReader { log: &self.log })
    }

    fn preferred_transaction_size(&self) -> usize {
        self.options.transaction_size
    }

    /// Every append is already handed to the OS.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let LogSystem { log, .. } = *self;
        log.close()
    }
}
