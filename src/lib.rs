//! # logbench - Append-Only Log Storage Benchmarks
//!
//! logbench measures throughput, latency and on-disk size of append-only,
//! sequence-addressed logs built on three embedded storage engines, under
//! different compression codecs, value shapes and transaction sizes.
//!
//! ## Architecture
//!
//! - **Codec**: pluggable value transform (identity, Snappy, LZ4), owned by
//!   each storage instance
//! - **Sequence Allocator**: dense 0-based sequences, either from a counter
//!   key written inside the transaction or from an engine's native counter
//! - **Offset Log**: checksummed frame file plus a fixed-width offset index
//! - **Adapters**: redb, sled and the offset log behind one
//!   [`DatabaseSystem`] contract
//! - **Harness**: data shapes, workloads, the trial matrix and metrics
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use logbench::{CompressionType, EngineConfig, Sequence};
//!
//! # fn main() -> Result<(), logbench::Error> {
//! let engine = EngineConfig::redb(CompressionType::None);
//! let system = engine.open("./data".as_ref())?;
//!
//! // Appends are assigned sequences 0, 1, 2, ...
//! system.update(&mut |updater| {
//!     updater.append(b"first")?;
//!     updater.append(b"second")?;
//!     Ok(())
//! })?;
//!
//! system.read(&mut |reader| {
//!     assert_eq!(reader.get(Sequence::new(1))?, b"second".to_vec());
//!     Ok(())
//! })?;
//!
//! system.sync()?;
//! system.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

// Module declarations
pub mod bench;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod offset_log;
pub mod sequence;
pub mod system;

// Re-exports
pub use codec::{new_codec, CompressionType, ValueCodec};
pub use config::{OffsetLogOptions, RedbOptions, SledOptions};
pub use error::{Error, Result, ResultExt};
pub use sequence::Sequence;
pub use system::{DatabaseSystem, EngineConfig, Item, Reader, Updater};
