//! Streaming SHA-256 over container byte ranges.
//!
//! Integrity of the payload region is always a SHA-256 digest: raw in the
//! footer and legacy tail, lowercase hex in the header.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::Result;

/// Length of a raw SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Chunk size for streaming reads.
const READ_CHUNK: usize = 64 * 1024;

/// Compute the SHA-256 digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

/// Compute the SHA-256 digest of everything a reader yields.
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<[u8; DIGEST_LEN]> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Compute the SHA-256 digest of a byte range of a file.
///
/// Reads in bounded chunks; never materializes the range in memory.
pub fn sha256_file_range(path: &Path, offset: u64, size: u64) -> Result<[u8; DIGEST_LEN]> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut hasher = Sha256::new();
    let mut remaining = size;
    let mut buf = [0u8; READ_CHUNK];

    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..to_read])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }

    Ok(hasher.finalize().into())
}

/// Render a raw digest as a 64-character lowercase hex string.
pub fn to_hex(digest: &[u8; DIGEST_LEN]) -> String {
    hex::encode(digest)
}
