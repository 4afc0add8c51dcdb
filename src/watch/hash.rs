// src/watch/hash.rs

//! Streaming CRC32 (IEEE) content checksums.
//!
//! The checksum is published as a gauge, so the 32-bit value is later widened
//! to f64 (exact for any u32).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Files are read in fixed 32 KiB chunks.
const CHUNK_SIZE: usize = 32 * 1024;

/// Compute the CRC32 (IEEE polynomial) of a file's content.
///
/// Every chunk is folded into the accumulator before the end-of-stream check,
/// so an empty file yields the well-known checksum 0. Read errors propagate
/// to the caller; there is no retry here.
pub fn compute_crc32(path: &Path) -> Result<u32> {
    let mut file = File::open(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        hasher.update(&buf[..n]);
        if n == 0 {
            break;
        }
    }

    Ok(hasher.finalize())
}
