//! Value codecs.
//!
//! A codec transforms each value before it is stored and reverses the
//! transform on read. Codecs are constructed per storage instance with
//! [`new_codec`] and owned by it, so no compressor state is shared between
//! instances.

use crate::error::{Error, Result};
use std::sync::Arc;

#[cfg(feature = "snappy")]
use parking_lot::Mutex;

/// Compression algorithms supported by the generic codec layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Short name used in trial names.
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "none",
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => "snappy",
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => "lz4",
        }
    }

    /// Every compressing variant compiled into this build.
    pub fn compressed() -> Vec<CompressionType> {
        #[allow(unused_mut)]
        let mut v = Vec::new();
        #[cfg(feature = "snappy")]
        v.push(CompressionType::Snappy);
        #[cfg(feature = "lz4-compression")]
        v.push(CompressionType::Lz4);
        v
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

/// Reversible transform applied to every stored value.
pub trait ValueCodec: Send + Sync {
    /// Encodes a value for storage.
    fn encode(&self, value: &[u8]) -> Result<Vec<u8>>;

    /// Decodes bytes produced by [`ValueCodec::encode`].
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// The algorithm implemented by this codec.
    fn compression(&self) -> CompressionType;
}

/// Creates an owned codec for one storage instance.
pub fn new_codec(compression: CompressionType) -> Arc<dyn ValueCodec> {
    match compression {
        CompressionType::None => Arc::new(Identity),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => Arc::new(Snappy::new()),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => Arc::new(Lz4),
    }
}

/// Stores values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ValueCodec for Identity {
    fn encode(&self, value: &[u8]) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn compression(&self) -> CompressionType {
        CompressionType::None
    }
}

/// Snappy raw-format codec.
///
/// The encoder keeps a reusable hash table, so both halves live behind
/// mutexes owned by the codec instance.
#[cfg(feature = "snappy")]
pub struct Snappy {
    encoder: Mutex<snap::raw::Encoder>,
    decoder: Mutex<snap::raw::Decoder>,
}

#[cfg(feature = "snappy")]
impl Snappy {
    /// Creates a codec with fresh encoder and decoder state.
    pub fn new() -> Self {
        Self {
            encoder: Mutex::new(snap::raw::Encoder::new()),
            decoder: Mutex::new(snap::raw::Decoder::new()),
        }
    }
}

#[cfg(feature = "snappy")]
impl Default for Snappy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "snappy")]
impl ValueCodec for Snappy {
    fn encode(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.encoder
            .lock()
            .compress_vec(value)
            .map_err(|e| Error::codec(format!("snappy compression failed: {}", e)))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decoder
            .lock()
            .decompress_vec(data)
            .map_err(|e| Error::codec(format!("snappy decompression failed: {}", e)))
    }

    fn compression(&self) -> CompressionType {
        CompressionType::Snappy
    }
}

/// Upper bound on LZ4 expansion per input byte.
#[cfg(feature = "lz4-compression")]
const LZ4_MAX_RATIO: usize = 255;

/// LZ4 block codec with the uncompressed size prepended.
#[cfg(feature = "lz4-compression")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

#[cfg(feature = "lz4-compression")]
impl ValueCodec for Lz4 {
    fn encode(&self, value: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(value, None, true)
            .map_err(|e| Error::codec(format!("lz4 compression failed: {}", e)))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(Error::codec(format!("lz4 frame too short: {} bytes", data.len())));
        }

        // Reject size prefixes no valid block could produce before the
        // decoder allocates for them.
        let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let limit = (data.len() - 4).saturating_mul(LZ4_MAX_RATIO).saturating_add(16);
        if declared > limit || declared > i32::MAX as usize {
            return Err(Error::codec(format!(
                "lz4 declared size {} exceeds bound {}",
                declared, limit
            )));
        }

        lz4::block::decompress(data, None)
            .map_err(|e| Error::codec(format!("lz4 decompression failed: {}", e)))
    }

    fn compression(&self) -> CompressionType {
        CompressionType::Lz4
    }
}
