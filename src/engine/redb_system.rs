//! Log adapter over redb.
//!
//! Values live in the `values` table keyed by sequence; the last assigned
//! sequence lives in the `meta` table. Both tables are created by the first
//! read-write transaction, so a read-only transaction on a fresh database
//! sees an empty log rather than an error.
//!
//! redb grows its file in large regions and only trims the tail at commit
//! time. [`DatabaseSystem::close`] rewrites the live data into a fresh file,
//! commits until redb stops trimming it, then swaps it in place of the
//! original. Space held by pages freed in earlier transactions is dropped.

use crate::codec::{new_codec, CompressionType, ValueCodec};
use crate::config::RedbOptions;
use crate::error::{Error, Result, ResultExt};
use crate::sequence::{CounterKey, CounterStore, Sequence, SequenceAllocator};
use crate::system::{check_value, DatabaseSystem, Item, ReadFn, Reader, UpdateFn, Updater};
use redb::{Database, Durability, ReadableTable, Table, TableDefinition, TableError};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the database file inside the storage directory.
pub const DATABASE_FILE: &str = "database.redb";

const VALUES: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("values");
const META: TableDefinition<'static, &'static str, u64> = TableDefinition::new("meta");
const LAST_SEQUENCE_KEY: &str = "last_sequence";

/// Upper bound on the empty commits used to trim a compacted file.
const MAX_TRIM_COMMITS: usize = 32;

/// A log stored in a single redb file.
pub struct RedbSystem {
    db: Database,
    path: PathBuf,
    codec: Arc<dyn ValueCodec>,
    options: RedbOptions,
}

impl RedbSystem {
    /// Opens or creates `database.redb` inside `dir`.
    pub fn open(dir: &Path, compression: CompressionType, options: RedbOptions) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(dir)?;

        let path = dir.join(DATABASE_FILE);
        let db = Database::builder()
            .set_cache_size(options.cache_size)
            .create(&path)
            .context("open database")?;

        Ok(Self { db, path, codec: new_codec(compression), options })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn durability(&self) -> Durability {
        if self.options.sync_commits {
            Durability::Immediate
        } else {
            Durability::None
        }
    }
}

/// Both tables of one write transaction.
struct RedbTables<'txn> {
    values: Table<'txn, u64, &'static [u8]>,
    meta: Table<'txn, &'static str, u64>,
}

impl CounterStore for RedbTables<'_> {
    fn load(&self) -> Result<Option<Sequence>> {
        Ok(self.meta.get(LAST_SEQUENCE_KEY)?.map(|guard| Sequence::new(guard.value())))
    }

    fn store(&mut self, seq: Sequence) -> Result<()> {
        self.meta.insert(LAST_SEQUENCE_KEY, seq.value())?;
        Ok(())
    }
}

struct RedbUpdater<'txn> {
    counter: CounterKey<RedbTables<'txn>>,
    codec: &'txn dyn ValueCodec,
}

impl Updater for RedbUpdater<'_> {
    fn append(&mut self, value: &[u8]) -> Result<Sequence> {
        check_value(value)?;
        let encoded = self.codec.encode(value).context("encode")?;
        let seq = self.counter.allocate_next()?;
        self.counter
            .store_mut()
            .values
            .insert(seq.value(), encoded.as_slice())
            .context("insert value")?;
        Ok(seq)
    }
}

struct RedbReader<'a, T> {
    /// None until the first write transaction creates the table.
    values: Option<T>,
    codec: &'a dyn ValueCodec,
}

impl<T: ReadableTable<u64, &'static [u8]>> Reader for RedbReader<'_, T> {
    fn get(&self, seq: Sequence) -> Result<Vec<u8>> {
        let Some(values) = &self.values else {
            return Err(Error::NotFound(seq));
        };

        match values.get(seq.value()).context("get")? {
            Some(guard) => self.codec.decode(guard.value()).context("decode"),
            None => Err(Error::NotFound(seq)),
        }
    }

    fn iterate(
        &self,
        start: Sequence,
        limit: usize,
        f: &mut dyn FnMut(Item) -> Result<()>,
    ) -> Result<()> {
        let Some(values) = &self.values else {
            return Ok(());
        };

        for entry in values.range(start.value()..).context("range")?.take(limit) {
            let (key, value) = entry.context("range next")?;
            let value = self.codec.decode(value.value()).context("decode")?;
            f(Item { sequence: Sequence::new(key.value()), value })?;
        }
        Ok(())
    }
}

impl DatabaseSystem for RedbSystem {
    fn update(&self, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut txn = self.db.begin_write().context("begin write")?;
        txn.set_durability(self.durability());

        let result = {
            let tables = RedbTables {
                values: txn.open_table(VALUES).context("open values table")?,
                meta: txn.open_table(META).context("open meta table")?,
            };
            let mut updater =
                RedbUpdater { counter: CounterKey::new(tables), codec: self.codec.as_ref() };
            f(&mut updater)
        };

        match result {
            Ok(()) => txn.commit().context("commit"),
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    log::warn!("Failed to abort redb transaction: {}", abort);
                }
                Err(e)
            }
        }
    }

    fn read(&self, f: &mut ReadFn<'_>) -> Result<()> {
        let txn = self.db.begin_read().context("begin read")?;
        let values = match txn.open_table(VALUES) {
            Ok(table) => Some(table),
            Err(TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(Error::from(e).context("open values table")),
        };

        let reader = RedbReader { values, codec: self.codec.as_ref() };
        f(&reader)
    }

    fn preferred_transaction_size(&self) -> usize {
        self.options.transaction_size
    }

    fn sync(&self) -> Result<()> {
        let mut txn = self.db.begin_write().context("begin sync")?;
        txn.set_durability(Durability::Immediate);
        txn.commit().context("sync commit")
    }

    fn close(self: Box<Self>) -> Result<()> {
        // Commits made without durability are only persisted by a durable one.
        self.sync()?;

        let RedbSystem { db, path, options, .. } = *self;
        if !options.compact_on_close {
            drop(db);
            log::debug!("Closed redb database {:?}", path);
            return Ok(());
        }

        compact_and_swap(db, &path)
    }
}

/// Path of the temporary file a compaction writes into.
pub fn compact_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".compact");
    PathBuf::from(name)
}

/// Copies all live data into a fresh file, then renames it over `path`.
///
/// The rename is the last step. If anything before it fails, the fresh file
/// is removed and the original is left as it was.
fn compact_and_swap(db: Database, path: &Path) -> Result<()> {
    let fresh_path = compact_path(path);
    if fresh_path.exists() {
        fs::remove_file(&fresh_path).context("remove stale compaction file")?;
    }

    let before = fs::metadata(path)?.len();
    let copied = match copy_into(&db, &fresh_path) {
        Ok(copied) => copied,
        Err(e) => {
            if let Err(remove) = fs::remove_file(&fresh_path) {
                log::warn!("Failed to remove compaction file {:?}: {}", fresh_path, remove);
            }
            return Err(e.context("compact"));
        }
    };
    drop(db);

    fs::rename(&fresh_path, path).context("swap compacted file")?;
    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }

    let after = fs::metadata(path)?.len();
    log::info!(
        "Compacted {:?}: {} entries, {} -> {} bytes",
        path,
        copied,
        before,
        after
    );

    Ok(())
}

/// Copies both tables into a new database at `fresh_path`.
fn copy_into(db: &Database, fresh_path: &Path) -> Result<u64> {
    let fresh = Database::create(fresh_path).context("create compaction file")?;
    let read = db.begin_read()?;
    let write = fresh.begin_write()?;
    let mut copied = 0;

    {
        match read.open_table(VALUES) {
            Ok(src) => {
                let mut dst = write.open_table(VALUES)?;
                for entry in src.iter()? {
                    let (key, value) = entry?;
                    dst.insert(key.value(), value.value())?;
                    copied += 1;
                }
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(e.into()),
        }

        match read.open_table(META) {
            Ok(src) => {
                let mut dst = write.open_table(META)?;
                for entry in src.iter()? {
                    let (key, value) = entry?;
                    dst.insert(key.value(), value.value())?;
                }
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    write.commit().context("commit compaction")?;
    trim_tail(&fresh, fresh_path)?;
    Ok(copied)
}

/// Commits empty transactions until redb stops shrinking the file.
///
/// Each commit cuts at most half of the free pages at the end of the file,
/// and pages freed by one commit are only released by a later one, so the
/// loop stops after two commits in a row leave the length unchanged.
fn trim_tail(db: &Database, path: &Path) -> Result<()> {
    let mut len = fs::metadata(path)?.len();
    let mut unchanged = 0;
    for _ in 0..MAX_TRIM_COMMITS {
        let mut txn = db.begin_write().context("begin trim")?;
        txn.set_durability(Durability::Immediate);
        txn.commit().context("trim commit")?;

        let trimmed = fs::metadata(path)?.len();
        if trimmed < len {
            len = trimmed;
            unchanged = 0;
        } else {
            unchanged += 1;
            if unchanged == 2 {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::metrics::disk_usage;
    use crate::system::collect_items;
    use tempfile::TempDir;

    fn open(dir: &Path) -> RedbSystem {
        RedbSystem::open(dir, CompressionType::None, RedbOptions::default()).unwrap()
    }

    #[test]
    fn test_read_before_first_write_is_empty() {
        let dir = TempDir::new().unwrap();
        let system = open(dir.path());

        system
            .read(&mut |reader| {
                assert!(reader.get(Sequence::ZERO).unwrap_err().is_not_found());
                assert!(collect_items(reader, Sequence::ZERO, 10)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_counter_persists_in_meta_table() {
        let dir = TempDir::new().unwrap();
        let system = open(dir.path());

        system
            .update(&mut |updater| {
                updater.append(b"a")?;
                updater.append(b"b")?;
                Ok(())
            })
            .unwrap();

        let txn = system.db.begin_read().unwrap();
        let meta = txn.open_table(META).unwrap();
        assert_eq!(meta.get(LAST_SEQUENCE_KEY).unwrap().unwrap().value(), 1);
    }

    #[test]
    fn test_close_compacts_into_single_file() {
        let dir = TempDir::new().unwrap();
        let system = open(dir.path());

        system
            .update(&mut |updater| {
                for i in 0..100u32 {
                    updater.append(&i.to_le_bytes())?;
                }
                Ok(())
            })
            .unwrap();
        Box::new(system).close().unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![DATABASE_FILE.to_string()]);

        let system = open(dir.path());
        system
            .read(&mut |reader| {
                assert_eq!(reader.get(Sequence::new(42))?, 42u32.to_le_bytes().to_vec());
                Ok(())
            })
            .unwrap();
    }

    /// Appends values after a large scratch table, then drops the table.
    fn open_pre_grown(dir: &Path, options: RedbOptions) -> RedbSystem {
        const SCRATCH: TableDefinition<'static, u64, &'static [u8]> =
            TableDefinition::new("scratch");

        let system = RedbSystem::open(dir, CompressionType::None, options).unwrap();

        let txn = system.db.begin_write().unwrap();
        {
            let mut scratch = txn.open_table(SCRATCH).unwrap();
            let filler = vec![0x5A; 8192];
            for i in 0..4000u64 {
                scratch.insert(i, filler.as_slice()).unwrap();
            }
        }
        txn.commit().unwrap();

        system
            .update(&mut |updater| {
                for i in 0..100u32 {
                    updater.append(&[i as u8; 1000])?;
                }
                Ok(())
            })
            .unwrap();

        let txn = system.db.begin_write().unwrap();
        assert!(txn.delete_table(SCRATCH).unwrap());
        txn.commit().unwrap();

        system
    }

    #[test]
    fn test_compaction_reclaims_pre_grown_space() {
        let compacted_dir = TempDir::new().unwrap();
        let raw_dir = TempDir::new().unwrap();

        let compacted = open_pre_grown(compacted_dir.path(), RedbOptions::default());
        let raw = open_pre_grown(raw_dir.path(), RedbOptions::new().compact_on_close(false));
        let compacted_path = compacted.path().to_path_buf();
        let raw_path = raw.path().to_path_buf();
        Box::new(compacted).close().unwrap();
        Box::new(raw).close().unwrap();

        let compacted_len = fs::metadata(&compacted_path).unwrap().len();
        let raw_len = fs::metadata(&raw_path).unwrap().len();
        assert!(raw_len > 16 * 1024 * 1024, "raw file is {} bytes", raw_len);
        assert!(compacted_len * 2 < raw_len, "{} vs {}", compacted_len, raw_len);

        let compacted_usage = disk_usage(compacted_dir.path()).unwrap();
        let raw_usage = disk_usage(raw_dir.path()).unwrap();
        assert!(compacted_usage < raw_usage, "{} vs {}", compacted_usage, raw_usage);

        let system = open(compacted_dir.path());
        system
            .read(&mut |reader| {
                assert_eq!(collect_items(reader, Sequence::ZERO, 1000)?.len(), 100);
                assert_eq!(reader.get(Sequence::new(99))?, vec![99u8; 1000]);
                Ok(())
            })
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_compaction_keeps_original() {
        let dir = TempDir::new().unwrap();
        let system = open(dir.path());
        system.update(&mut |updater| updater.append(b"kept").map(|_| ())).unwrap();

        // The compaction file cannot be created through a link into a missing directory.
        let fresh = compact_path(system.path());
        std::os::unix::fs::symlink(dir.path().join("missing").join("db"), &fresh).unwrap();

        assert!(Box::new(system).close().is_err());
        assert!(fs::symlink_metadata(&fresh).is_err());

        let system = open(dir.path());
        system
            .read(&mut |reader| {
                assert_eq!(reader.get(Sequence::ZERO)?, b"kept".to_vec());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_compact_path() {
        let path = Path::new("/tmp/x/database.redb");
        assert_eq!(compact_path(path), PathBuf::from("/tmp/x/database.redb.compact"));
    }

    #[test]
    fn test_unsynced_commits_survive_close() {
        let dir = TempDir::new().unwrap();
        let options = RedbOptions::new().sync_commits(false).compact_on_close(false);
        let system = RedbSystem::open(dir.path(), CompressionType::None, options.clone()).unwrap();

        system.update(&mut |updater| updater.append(b"kept").map(|_| ())).unwrap();
        Box::new(system).close().unwrap();

        let system = RedbSystem::open(dir.path(), CompressionType::None, options).unwrap();
        system
            .read(&mut |reader| {
                assert_eq!(reader.get(Sequence::ZERO)?, b"kept".to_vec());
                Ok(())
            })
            .unwrap();
    }
}
