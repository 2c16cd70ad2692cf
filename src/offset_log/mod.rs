//! Append-only offset log.
//!
//! A log directory holds two files:
//!
//! - **data**: codec-encoded values, each wrapped in a checksummed frame
//! - **offsets**: one little-endian `u64` per entry, the position of its frame
//!
//! Entries are addressed by their 0-based index in the log. Appends go
//! straight to both files, data first, so a crash can only leave a torn tail,
//! which [`OffsetLog::open`] discards.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use logbench::config::OffsetLogOptions;
//! use logbench::offset_log::{OffsetLog, RawCodec};
//!
//! # fn main() -> Result<(), logbench::Error> {
//! let log = OffsetLog::open("./log", RawCodec, OffsetLogOptions::default())?;
//! let count = log.append(b"first")?;
//! assert_eq!(count, 1);
//! assert_eq!(log.get(0)?, Some(b"first".to_vec()));
//! log.close()?;
//! # Ok(())
//! # }
//! ```

pub mod record;

use crate::config::OffsetLogOptions;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use record::{FrameHeader, HEADER_SIZE};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the frame file inside a log directory.
pub const DATA_FILE: &str = "data";

/// Name of the offset index file inside a log directory.
pub const OFFSETS_FILE: &str = "offsets";

const OFFSET_SIZE: u64 = 8;

/// Marshalling hooks the log uses for every value.
///
/// `encode`/`decode` are the streaming hooks; by default they delegate to
/// `marshal`/`unmarshal`.
pub trait LogCodec: Send + Sync {
    /// Turns a value into its stored form.
    fn marshal(&self, value: &[u8]) -> Result<Vec<u8>>;

    /// Restores a value from its stored form.
    fn unmarshal(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Writes the stored form of `value` to `writer`.
    fn encode(&self, value: &[u8], writer: &mut dyn Write) -> Result<()> {
        let data = self.marshal(value)?;
        writer.write_all(&data)?;
        Ok(())
    }

    /// Reads one stored value from `reader` until EOF.
    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.unmarshal(&data)
    }
}

/// Stores values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl LogCodec for RawCodec {
    fn marshal(&self, value: &[u8]) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

struct Inner {
    data: File,
    offsets_file: File,
    /// Frame position of every entry.
    offsets: Vec<u64>,
    /// End of the last complete frame.
    data_size: u64,
    /// Set when a rollback left the files out of step with `offsets`.
    failure: Option<String>,
}

impl Inner {
    fn check_writable(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => {
                Err(Error::invalid_state(format!("offset log must be reopened: {}", reason)))
            }
            None => Ok(()),
        }
    }
}

/// An append-only log addressed by entry index.
pub struct OffsetLog<C> {
    dir: PathBuf,
    codec: C,
    options: OffsetLogOptions,
    inner: Mutex<Inner>,
}

impl<C: LogCodec> OffsetLog<C> {
    /// Open or create a log in `dir`.
    ///
    /// The directory is created if missing. Torn trailing writes from a
    /// previous crash are discarded.
    pub fn open<P: AsRef<Path>>(dir: P, codec: C, options: OffsetLogOptions) -> Result<Self> {
        options.validate()?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut data = open_append(&dir.join(DATA_FILE))?;
        let mut offsets_file = open_append(&dir.join(OFFSETS_FILE))?;

        let (offsets, data_size) = recover(&mut data, &mut offsets_file)?;

        log::info!("Opened offset log {:?} with {} entries", dir, offsets.len());

        Ok(Self {
            dir,
            codec,
            options,
            inner: Mutex::new(Inner { data, offsets_file, offsets, data_size, failure: None }),
        })
    }

    /// Append a value and return the number of entries in the log after it.
    ///
    /// The returned count is 1-based: the first append returns 1. If a failed
    /// write cannot be rolled back, every later append and truncate fails
    /// with [`Error::InvalidState`] until the log is reopened.
    pub fn append(&self, value: &[u8]) -> Result<u64> {
        let mut payload = Vec::with_capacity(value.len());
        self.codec.encode(value, &mut payload)?;

        if payload.len() > self.options.max_entry_size {
            return Err(Error::invalid_argument(format!(
                "encoded entry of {} bytes exceeds max_entry_size {}",
                payload.len(),
                self.options.max_entry_size
            )));
        }

        let frame = record::encode_frame(&payload);

        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let position = inner.data_size;
        let count = inner.offsets.len() as u64;

        if let Err(e) = write_entry(&mut inner, &frame, position, self.options.sync_writes) {
            // Drop whatever part of the entry reached the files.
            let data = inner.data.set_len(position);
            let offsets = inner.offsets_file.set_len(count * OFFSET_SIZE);
            if let Err(rollback) = data.and(offsets) {
                log::error!("Failed to roll back append to offset log {:?}: {}", self.dir, rollback);
                inner.failure = Some(format!("append rollback failed: {}", rollback));
            }
            return Err(e);
        }

        inner.data_size = position + frame.len() as u64;
        inner.offsets.push(position);

        Ok(count + 1)
    }

    /// Read the value at `index`, or None if no such entry exists.
    pub fn get(&self, index: u64) -> Result<Option<Vec<u8>>> {
        let payload = {
            let mut inner = self.inner.lock();
            let Some(&position) = inner.offsets.get(index as usize) else {
                return Ok(None);
            };
            let end = inner
                .offsets
                .get(index as usize + 1)
                .copied()
                .unwrap_or(inner.data_size);

            let size = end
                .checked_sub(position)
                .filter(|&size| size >= HEADER_SIZE as u64 && end <= inner.data_size)
                .ok_or_else(|| {
                    Error::corruption(format!(
                        "entry {} spans invalid range {}..{}",
                        index, position, end
                    ))
                })?;

            let mut frame = vec![0u8; size as usize];
            inner.data.seek(SeekFrom::Start(position))?;
            inner.data.read_exact(&mut frame)?;
            record::decode_frame(&frame)?
        };

        self.codec.decode(&mut payload.as_slice()).map(Some)
    }

    /// Stream entries from `start` up to the log length at call time.
    pub fn iter(&self, start: u64) -> Result<LogIter<'_, C>> {
        let (position, end, data_size) = {
            let inner = self.inner.lock();
            let end = inner.offsets.len() as u64;
            let position = inner.offsets.get(start as usize).copied().unwrap_or(inner.data_size);
            (position, end, inner.data_size)
        };

        let mut file = File::open(self.dir.join(DATA_FILE))?;
        file.seek(SeekFrom::Start(position))?;

        Ok(LogIter {
            codec: &self.codec,
            reader: BufReader::new(file),
            next: start,
            end,
            remaining: data_size.saturating_sub(position),
        })
    }

    /// Number of entries in the log.
    pub fn len(&self) -> u64 {
        self.inner.lock().offsets.len() as u64
    }

    /// Returns true if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every entry at index `len` and above.
    ///
    /// A failure part way leaves the log refusing writes until reopened.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let current = inner.offsets.len() as u64;
        if len >= current {
            return Ok(());
        }

        inner.check_writable()?;

        let data_size = inner.offsets[len as usize];
        if let Err(e) = inner.offsets_file.set_len(len * OFFSET_SIZE) {
            inner.failure = Some(format!("truncating offsets failed: {}", e));
            return Err(e.into());
        }
        // Once the index is cut, it decides what a reopen keeps.
        inner.offsets.truncate(len as usize);
        inner.data_size = data_size;
        if let Err(e) = inner.data.set_len(data_size) {
            inner.failure = Some(format!("truncating data failed: {}", e));
            return Err(e.into());
        }

        log::debug!("Truncated offset log {:?} from {} to {} entries", self.dir, current, len);

        Ok(())
    }

    /// Fsync both files.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.data.sync_all()?;
        inner.offsets_file.sync_all()?;
        Ok(())
    }

    /// Get the log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Close the log, syncing all data
    pub fn close(self) -> Result<()> {
        self.sync()?;
        log::debug!("Closed offset log {:?}", self.dir);
        Ok(())
    }

    /// Swaps in a read-only data handle so that writes and truncation fail.
    #[cfg(test)]
    pub(crate) fn make_data_read_only(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.data = File::open(self.dir.join(DATA_FILE))?;
        Ok(())
    }
}

/// Forward iterator over log entries.
pub struct LogIter<'a, C> {
    codec: &'a C,
    reader: BufReader<File>,
    next: u64,
    end: u64,
    /// Data bytes between the reader and the end of the log.
    remaining: u64,
}

impl<C: LogCodec> Iterator for LogIter<'_, C> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let index = self.next;
        let max_payload = self.remaining.saturating_sub(HEADER_SIZE as u64);
        let payload = match record::read_frame(&mut self.reader, max_payload) {
            Ok(Some(payload)) => {
                self.remaining =
                    self.remaining.saturating_sub(HEADER_SIZE as u64 + payload.len() as u64);
                payload
            }
            Ok(None) => {
                self.next = self.end;
                return Some(Err(Error::corruption(format!("entry {} missing from data file", index))));
            }
            Err(e) => {
                self.next = self.end;
                return Some(Err(e));
            }
        };

        self.next += 1;
        Some(self.codec.decode(&mut payload.as_slice()).map(|value| (index, value)))
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).append(true).create(true).open(path)?)
}

fn write_entry(inner: &mut Inner, frame: &[u8], position: u64, sync: bool) -> Result<()> {
    inner.data.write_all(frame)?;
    inner.offsets_file.write_all(&position.to_le_bytes())?;
    if sync {
        inner.data.sync_data()?;
        inner.offsets_file.sync_data()?;
    }
    Ok(())
}

/// Load the offset index and cut off anything a crash left half-written.
///
/// Positions out of order are reported as corruption, not repaired.
fn recover(data: &mut File, offsets_file: &mut File) -> Result<(Vec<u64>, u64)> {
    let offsets_len = offsets_file.metadata()?.len();
    let whole = offsets_len - offsets_len % OFFSET_SIZE;
    if whole != offsets_len {
        log::warn!("Dropping partial offset slot ({} bytes)", offsets_len - whole);
    }

    let mut raw = vec![0u8; whole as usize];
    offsets_file.seek(SeekFrom::Start(0))?;
    offsets_file.read_exact(&mut raw)?;

    let mut offsets: Vec<u64> = raw
        .chunks_exact(OFFSET_SIZE as usize)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();

    let data_len = data.metadata()?.len();
    let mut data_size = 0;

    while let Some(&position) = offsets.last() {
        match frame_end(data, position, data_len) {
            Ok(end) => {
                data_size = end;
                break;
            }
            Err(e) => {
                log::warn!("Offset log corruption at entry {}: {}", offsets.len() - 1, e);
                offsets.pop();
            }
        }
    }

    check_positions(&offsets)?;

    let kept = offsets.len() as u64 * OFFSET_SIZE;
    if kept != offsets_len {
        offsets_file.set_len(kept)?;
    }
    if data_len != data_size {
        log::warn!("Truncating {} trailing bytes from offset log data", data_len - data_size);
        data.set_len(data_size)?;
    }

    Ok((offsets, data_size))
}

/// Entries start at 0 and each one leaves room for at least a frame header.
fn check_positions(offsets: &[u64]) -> Result<()> {
    if let Some(&first) = offsets.first() {
        if first != 0 {
            return Err(Error::corruption(format!("first entry starts at {}", first)));
        }
    }

    for (index, pair) in offsets.windows(2).enumerate() {
        if pair[1] < pair[0].saturating_add(HEADER_SIZE as u64) {
            return Err(Error::corruption(format!(
                "entry {} starts at {}, inside entry {} at {}",
                index + 1,
                pair[1],
                index,
                pair[0]
            )));
        }
    }
    Ok(())
}

/// Validate the frame at `position` and return where it ends.
fn frame_end(data: &mut File, position: u64, data_len: u64) -> Result<u64> {
    if position.saturating_add(HEADER_SIZE as u64) > data_len {
        return Err(Error::corruption("frame header past end of data"));
    }

    let mut header = [0u8; HEADER_SIZE];
    data.seek(SeekFrom::Start(position))?;
    data.read_exact(&mut header)?;
    let header = FrameHeader::decode(&header)?;

    let end = position + header.frame_size();
    if end > data_len {
        return Err(Error::corruption("frame payload past end of data"));
    }

    let mut payload = vec![0u8; header.length as usize];
    data.read_exact(&mut payload)?;
    header.verify(&payload)?;

    Ok(end)
}
