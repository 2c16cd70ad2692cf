//! Configuration options for the storage engines under test.

/// Operations per transaction the harness uses unless an engine says otherwise.
pub const DEFAULT_TRANSACTION_SIZE: usize = 5000;

/// Options for the redb-backed log.
#[derive(Debug, Clone)]
pub struct RedbOptions {
    /// Appends/gets the harness should batch per transaction.
    /// Default: 5000
    pub transaction_size: usize,

    /// Fsync on every commit. When false, commits are made with no
    /// durability and only `sync()` persists them.
    /// Default: true
    pub sync_commits: bool,

    /// Page cache size (in bytes).
    /// Default: 64MB
    pub cache_size: usize,

    /// Rewrite the database into a fresh file on close so the file size
    /// reflects live data rather than pre-allocated regions.
    /// Default: true
    pub compact_on_close: bool,
}

impl Default for RedbOptions {
    fn default() -> Self {
        Self {
            transaction_size: DEFAULT_TRANSACTION_SIZE,
            sync_commits: true,
            cache_size: 64 * 1024 * 1024, // 64MB
            compact_on_close: true,
        }
    }
}

impl RedbOptions {
    /// Creates a new RedbOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preferred transaction size.
    pub fn transaction_size(mut self, size: usize) -> Self {
        self.transaction_size = size;
        self
    }

    /// Sets whether every commit is fsync'd.
    pub fn sync_commits(mut self, value: bool) -> Self {
        self.sync_commits = value;
        self
    }

    /// Sets the page cache size.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Sets whether the file is compacted on close.
    pub fn compact_on_close(mut self, value: bool) -> Self {
        self.compact_on_close = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        validate_transaction_size(self.transaction_size)?;
        if self.cache_size == 0 {
            return Err(crate::Error::invalid_argument("cache_size must be > 0"));
        }
        Ok(())
    }
}

/// Options for the sled-backed log.
///
/// Compression is applied by sled itself, not by the generic codec layer.
#[derive(Debug, Clone)]
pub struct SledOptions {
    /// Appends/gets the harness should batch per transaction.
    /// Default: 5000
    pub transaction_size: usize,

    /// Zstd compression level, `None` disables compression.
    /// Default: None
    pub compression_factor: Option<i32>,

    /// Page cache capacity (in bytes).
    /// Default: 64MB
    pub cache_capacity: u64,

    /// Background flush interval in milliseconds, `None` disables it.
    /// Default: Some(500)
    pub flush_every_ms: Option<u64>,
}

impl Default for SledOptions {
    fn default() -> Self {
        Self {
            transaction_size: DEFAULT_TRANSACTION_SIZE,
            compression_factor: None,
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(500),
        }
    }
}

impl SledOptions {
    /// Creates a new SledOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preferred transaction size.
    pub fn transaction_size(mut self, size: usize) -> Self {
        self.transaction_size = size;
        self
    }

    /// Enables zstd compression at the given level.
    pub fn compression_factor(mut self, factor: i32) -> Self {
        self.compression_factor = Some(factor);
        self
    }

    /// Sets the page cache capacity.
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Sets the background flush interval.
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        validate_transaction_size(self.transaction_size)?;
        if let Some(factor) = self.compression_factor {
            if !(1..=22).contains(&factor) {
                return Err(crate::Error::invalid_argument(
                    "compression_factor must be between 1 and 22",
                ));
            }
        }
        if self.cache_capacity == 0 {
            return Err(crate::Error::invalid_argument("cache_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Options for the offset log.
#[derive(Debug, Clone)]
pub struct OffsetLogOptions {
    /// Appends/gets the harness should batch per transaction.
    /// Default: 5000
    pub transaction_size: usize,

    /// Fsync data and offsets after every append.
    /// Default: false
    pub sync_writes: bool,

    /// Largest encoded value accepted by a single append (in bytes).
    /// Default: 64MB
    pub max_entry_size: usize,
}

impl Default for OffsetLogOptions {
    fn default() -> Self {
        Self {
            transaction_size: DEFAULT_TRANSACTION_SIZE,
            sync_writes: false,
            max_entry_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl OffsetLogOptions {
    /// Creates a new OffsetLogOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preferred transaction size.
    pub fn transaction_size(mut self, size: usize) -> Self {
        self.transaction_size = size;
        self
    }

    /// Sets whether every append is fsync'd.
    pub fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the maximum encoded entry size.
    pub fn max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        validate_transaction_size(self.transaction_size)?;
        if self.max_entry_size == 0 || self.max_entry_size > u32::MAX as usize {
            return Err(crate::Error::invalid_argument(
                "max_entry_size must be > 0 and fit in 32 bits",
            ));
        }
        Ok(())
    }
}

fn validate_transaction_size(size: usize) -> crate::Result<()> {
    if size == 0 {
        return Err(crate::Error::invalid_argument("transaction_size must be > 0"));
    }
    Ok(())
}
