//! Storage adapters.
//!
//! Each adapter maps the [`DatabaseSystem`](crate::system::DatabaseSystem)
//! contract onto one engine:
//!
//! - [`RedbSystem`]: redb tables, counter kept in a meta table, generic codec,
//!   compacted into a fresh file on close.
//! - [`SledSystem`]: a sled tree written through atomic batches, sled's own
//!   zstd compression.
//! - [`LogSystem`]: the [`OffsetLog`](crate::offset_log::OffsetLog), whose
//!   1-based entry count serves as the sequence counter.

pub mod log_system;
pub mod redb_system;
pub mod sled_system;

pub use log_system::LogSystem;
pub use redb_system::RedbSystem;
pub use sled_system::SledSystem;
