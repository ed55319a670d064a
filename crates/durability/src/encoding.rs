//! Frame encoding with CRC32 checksums
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+----------------+-------------------+
//! | body_len (u32) | crc32 (u32)    | body (body_len B) |
//! +----------------+----------------+-------------------+
//! ```
//!
//! Both header fields are little-endian; the CRC covers the body only.
//! A log that ends inside a frame (torn write) reads as [`FrameRead::Torn`].

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use kvindex_core::{Error, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest accepted frame body; anything bigger is treated as corruption
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Outcome of reading one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// A complete, checksum-valid body is in the buffer
    Frame,
    /// Stream ended cleanly at a frame boundary
    End,
    /// Stream ended partway through a frame
    Torn,
}

/// Write `body` as one frame, returning the bytes written
pub fn encode_frame<W: Write>(out: &mut W, body: &[u8]) -> Result<usize> {
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Serialization(format!(
            "frame body of {} bytes exceeds {}",
            body.len(),
            MAX_FRAME_LEN
        )));
    }
    out.write_u32::<LittleEndian>(body.len() as u32)?;
    out.write_u32::<LittleEndian>(crc32fast::hash(body))?;
    out.write_all(body)?;
    Ok(FRAME_HEADER_SIZE + body.len())
}

/// Fill as much of `buf` as the stream allows, returning the bytes read
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Read one frame body into `buffer`
///
/// `buffer` is cleared and reused across calls so replaying a long log
/// does not allocate per entry.
pub fn decode_frame<R: Read>(input: &mut R, buffer: &mut Vec<u8>) -> Result<FrameRead> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match read_full(input, &mut header)? {
        0 => return Ok(FrameRead::End),
        n if n < FRAME_HEADER_SIZE => return Ok(FrameRead::Torn),
        _ => {}
    }
    let len = LittleEndian::read_u32(&header[0..4]) as usize;
    let expected_crc = LittleEndian::read_u32(&header[4..8]);
    if len > MAX_FRAME_LEN {
        return Err(Error::Corruption(format!(
            "frame length {} exceeds {}",
            len, MAX_FRAME_LEN
        )));
    }

    buffer.clear();
    buffer.resize(len, 0);
    if read_full(input, buffer)? < len {
        return Ok(FrameRead::Torn);
    }

    let actual_crc = crc32fast::hash(buffer);
    if actual_crc != expected_crc {
        return Err(Error::Corruption(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }
    Ok(FrameRead::Frame)
}
