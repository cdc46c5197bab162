//! Container reading and self-location.
//!
//! Mirrors the writer: locates the footer in an installer executable,
//! parses the header, and exposes the payload as a bounded stream. Readers
//! prefer the trailing footer; containers that predate it are found by
//! scanning for the header signature from the start of the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::{Footer, Header, FOOTER_SIZE, HEADER_MAGIC, LEGACY_TAIL_LEN};
use crate::hash::{sha256_file_range, to_hex, DIGEST_LEN};
use crate::{PackError, Result};

/// Chunk size for the legacy header scan.
const SCAN_CHUNK: usize = 64 * 1024;

/// An opened installer container.
pub struct Container {
    path: PathBuf,
    footer: Footer,
    header: Header,
    legacy: bool,
}

impl Container {
    /// Open an installer file and locate its embedded container.
    ///
    /// Tries the trailing footer first. When the footer magic is absent the
    /// reader falls back to a linear scan for the legacy header signature;
    /// the first match from file start wins.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let (footer, legacy) = match read_trailing_footer(&mut file, file_size) {
            Ok(footer) => {
                check_footer_geometry(&footer, file_size)?;
                (footer, false)
            }
            Err(PackError::FooterNotFound) => {
                debug!(path = %path.display(), "no footer, trying legacy scan");
                (legacy_scan(&mut file, file_size)?, true)
            }
            Err(e) => return Err(e),
        };

        let header = read_header(&mut file, &footer, legacy)?;

        Ok(Self {
            path: path.to_path_buf(),
            footer,
            header,
            legacy,
        })
    }

    /// Parsed header record.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Located (or synthesized, in legacy mode) footer.
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// Whether this container was located via the legacy scan.
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-hash the payload range and compare against the recorded digest.
    ///
    /// Must pass before any filesystem mutation during installation.
    pub fn verify(&self) -> Result<()> {
        let actual = sha256_file_range(
            &self.path,
            self.footer.payload_offset,
            self.footer.payload_size,
        )?;
        if actual != self.footer.payload_sha256 {
            return Err(PackError::IntegrityFailure {
                expected: to_hex(&self.footer.payload_sha256),
                actual: to_hex(&actual),
            });
        }
        Ok(())
    }

    /// Open a bounded reader over the payload byte range.
    pub fn payload_reader(&self) -> Result<PayloadRegion> {
        PayloadRegion::open(
            &self.path,
            self.footer.payload_offset,
            self.footer.payload_size,
        )
    }
}

/// A `Read + Seek` view over the payload byte range of the container file.
///
/// Seek positions are relative to the payload start; the rest of the file
/// is not reachable through this reader.
pub struct PayloadRegion {
    file: File,
    start: u64,
    len: u64,
    pos: u64,
}

impl PayloadRegion {
    fn open(path: &Path, start: u64, len: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file,
            start,
            len,
            pos: 0,
        })
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for PayloadRegion {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(remaining as usize);
        let n = self.file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for PayloadRegion {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(off) => self.len as i64 + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before payload start",
            ));
        }
        self.pos = target as u64;
        self.file.seek(SeekFrom::Start(self.start + self.pos))?;
        Ok(self.pos)
    }
}

fn read_trailing_footer(file: &mut File, file_size: u64) -> Result<Footer> {
    if file_size < FOOTER_SIZE as u64 {
        return Err(PackError::FooterNotFound);
    }
    file.seek(SeekFrom::Start(file_size - FOOTER_SIZE as u64))?;
    let mut buf = [0u8; FOOTER_SIZE];
    file.read_exact(&mut buf)?;
    Footer::from_bytes(&buf)
}

fn check_footer_geometry(footer: &Footer, file_size: u64) -> Result<()> {
    let payload_end = footer
        .payload_offset
        .checked_add(footer.payload_size)
        .ok_or_else(|| PackError::HeaderMalformed("payload range overflows".to_string()))?;

    if footer.header_offset + 8 + footer.header_len != footer.payload_offset {
        return Err(PackError::HeaderMalformed(
            "footer offsets are inconsistent".to_string(),
        ));
    }

    // Accept both the compat layout (with legacy tail) and the pure-new
    // layout without it.
    let with_tail = payload_end + LEGACY_TAIL_LEN as u64 + FOOTER_SIZE as u64;
    let without_tail = payload_end + FOOTER_SIZE as u64;
    if with_tail != file_size && without_tail != file_size {
        return Err(PackError::HeaderMalformed(
            "footer does not account for the file size".to_string(),
        ));
    }
    Ok(())
}

/// Scan for the legacy header signature and synthesize a footer from it.
///
/// Layout assumed: `stub ‖ header_len(8) ‖ header ‖ payload ‖ sha256(32)`.
fn legacy_scan(file: &mut File, file_size: u64) -> Result<Footer> {
    let signature = {
        let mut sig = Vec::with_capacity(10 + HEADER_MAGIC.len());
        sig.extend_from_slice(b"{\"magic\":\"");
        sig.extend_from_slice(HEADER_MAGIC.as_bytes());
        sig
    };

    let header_start = scan_for(file, &signature)?.ok_or(PackError::FooterNotFound)?;
    if header_start < 8 || file_size < header_start + LEGACY_TAIL_LEN as u64 {
        return Err(PackError::FooterNotFound);
    }

    file.seek(SeekFrom::Start(header_start - 8))?;
    let mut len_buf = [0u8; 8];
    file.read_exact(&mut len_buf)?;
    let header_len = u64::from_le_bytes(len_buf);

    let payload_offset = header_start + header_len;
    let tail_start = file_size - LEGACY_TAIL_LEN as u64;
    if payload_offset > tail_start {
        return Err(PackError::HeaderMalformed(
            "legacy header length exceeds file".to_string(),
        ));
    }

    file.seek(SeekFrom::Start(tail_start))?;
    let mut tail = [0u8; DIGEST_LEN];
    file.read_exact(&mut tail)?;

    debug!(header_start, header_len, "located legacy header");

    Ok(Footer {
        header_offset: header_start - 8,
        header_len,
        payload_offset,
        payload_size: tail_start - payload_offset,
        payload_sha256: tail,
    })
}

/// Find the first occurrence of `needle` in the file, chunked with overlap.
fn scan_for(file: &mut File, needle: &[u8]) -> Result<Option<u64>> {
    file.seek(SeekFrom::Start(0))?;
    let overlap = needle.len() - 1;
    let mut buf = vec![0u8; SCAN_CHUNK + overlap];
    let mut carried = 0usize;
    let mut base = 0u64;

    loop {
        let n = file.read(&mut buf[carried..])?;
        if n == 0 {
            return Ok(None);
        }
        let filled = carried + n;
        if let Some(pos) = buf[..filled]
            .windows(needle.len())
            .position(|w| w == needle)
        {
            return Ok(Some(base + pos as u64));
        }

        // Keep the last overlap bytes so a match spanning chunks is seen.
        let keep = filled.min(overlap);
        base += (filled - keep) as u64;
        buf.copy_within(filled - keep..filled, 0);
        carried = keep;
    }
}

fn read_header(file: &mut File, footer: &Footer, legacy: bool) -> Result<Header> {
    file.seek(SeekFrom::Start(footer.header_offset))?;
    let mut len_buf = [0u8; 8];
    file.read_exact(&mut len_buf)?;
    let recorded_len = u64::from_le_bytes(len_buf);

    // In footer mode the prefix and the footer must agree; in legacy mode
    // the prefix is the source of truth and always agrees by construction.
    if !legacy && recorded_len != footer.header_len {
        return Err(PackError::HeaderMalformed(format!(
            "length prefix {} disagrees with footer {}",
            recorded_len, footer.header_len
        )));
    }

    let mut header_bytes = vec![0u8; footer.header_len as usize];
    file.read_exact(&mut header_bytes)
        .map_err(|_| PackError::HeaderMalformed("header region truncated".to_string()))?;
    Header::from_wire(&header_bytes)
}
