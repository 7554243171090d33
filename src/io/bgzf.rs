//! # BGZF Block Framing
//!
//! Writes block-gzip (BGZF) members: standard gzip members carrying the
//! `BC` extra field with the compressed block size, so the output is both
//! a valid multi-member gzip stream and seekable by BGZF-aware readers.
//! Input is chunked so each block's uncompressed payload stays below the
//! BGZF 64 KiB limit; the compressed payload is raw deflate, followed by
//! the CRC32 and length of the uncompressed chunk.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

use crate::error::{IbdclustError, Result};

/// Maximum uncompressed bytes per BGZF block
const MAX_BLOCK_INPUT: usize = 0xff00;

/// The canonical 28-byte BGZF end-of-file marker (an empty block)
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Compress `data` into consecutive BGZF members appended to `out`.
///
/// Empty input appends nothing; callers append [`BGZF_EOF`] once at the
/// very end of the file.
pub fn write_bgzf_members(data: &[u8], out: &mut Vec<u8>) -> Result<()> {
    for chunk in data.chunks(MAX_BLOCK_INPUT) {
        write_block(chunk, out)?;
    }
    Ok(())
}

fn write_block(chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(chunk)?;
    let deflated = encoder.finish()?;

    // header(12) + BC extra(6) + payload + crc32(4) + isize(4)
    let block_len = 18 + deflated.len() + 8;
    if block_len > 0x1_0000 {
        return Err(IbdclustError::invalid_data(format!(
            "BGZF block overflow: {block_len} bytes"
        )));
    }
    let bsize = (block_len - 1) as u16;

    out.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04]); // magic, deflate, FEXTRA
    out.extend_from_slice(&[0, 0, 0, 0]); // mtime
    out.extend_from_slice(&[0x00, 0xff]); // xfl, os = unknown
    out.extend_from_slice(&6u16.to_le_bytes()); // xlen
    out.extend_from_slice(&[0x42, 0x43]); // 'B' 'C'
    out.extend_from_slice(&2u16.to_le_bytes()); // subfield length
    out.extend_from_slice(&bsize.to_le_bytes());
    out.extend_from_slice(&deflated);

    let mut crc = Crc::new();
    crc.update(chunk);
    out.extend_from_slice(&crc.sum().to_le_bytes());
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    Ok(())
}
