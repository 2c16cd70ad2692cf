//! Offset log frame format.
//!
//! Each frame consists of:
//! - Checksum (4 bytes): CRC32 of the payload
//! - Length (4 bytes): Length of the payload
//! - Payload (variable): Codec-encoded value

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Read};

/// Size of the frame header (checksum + length)
pub const HEADER_SIZE: usize = 8;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// CRC32 of the payload
    pub checksum: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl FrameHeader {
    /// Decode a header from its fixed-size encoding
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!("Frame header too short: {} bytes", data.len())));
        }
        let checksum = data.get_u32_le();
        let length = data.get_u32_le();
        Ok(Self { checksum, length })
    }

    /// Total encoded size of the frame this header describes
    pub fn frame_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.length as u64
    }

    /// Check the payload against the stored checksum
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.length as usize {
            return Err(Error::corruption(format!(
                "Incomplete frame: expected {} bytes, got {}",
                self.length,
                payload.len()
            )));
        }

        let actual = crc32fast::hash(payload);
        if actual != self.checksum {
            return Err(Error::corruption(format!(
                "Checksum mismatch: expected {:#x}, got {:#x}",
                self.checksum, actual
            )));
        }
        Ok(())
    }
}

/// Encode a payload into a frame
///
/// Format: [checksum: u32][length: u32][payload: bytes]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Decode a complete frame, verifying its checksum
pub fn decode_frame(data: &[u8]) -> Result<Vec<u8>> {
    let header = FrameHeader::decode(data)?;
    let payload = &data[HEADER_SIZE..];
    header.verify(payload)?;
    Ok(payload.to_vec())
}

/// Read the next frame from a stream
///
/// Returns None on a clean EOF at a frame boundary. A header claiming more
/// than `max_payload` bytes is reported as corruption before any allocation.
pub fn read_frame<R: Read>(reader: &mut R, max_payload: u64) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }

    let header = FrameHeader::decode(&header)?;
    if u64::from(header.length) > max_payload {
        return Err(Error::corruption(format!(
            "Frame length {} exceeds the {} bytes left",
            header.length, max_payload
        )));
    }
    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::corruption("EOF inside frame payload")
        } else {
            Error::Io(e)
        }
    })?;

    header.verify(&payload)?;
    Ok(Some(payload))
}
