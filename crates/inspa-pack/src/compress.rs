//! Streaming payload compression.
//!
//! The payload is one logical stream regardless of algorithm. For zstd the
//! decompressed bytes are a sequence of records in manifest order:
//!
//! ```text
//! [8 bytes path_len LE][path UTF-8][8 bytes file_size LE][file_size bytes]
//! ```
//!
//! For the zip fallback each manifest entry becomes a stored entry named by
//! its logical path; the zip central directory provides the structure and
//! the record framing above is not used.

use std::fs::File;
use std::io::{Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::format::{CompressionAlgo, CompressionSettings};
use crate::{PackError, Result};

/// Upper bound on a record path length; anything larger is corruption.
pub const RECORD_PATH_MAX: u64 = 4096;

/// Write one record prefix (path and size) to a framed stream.
pub fn write_record_prefix<W: Write>(writer: &mut W, path: &str, size: u64) -> Result<()> {
    let path_bytes = path.as_bytes();
    writer.write_all(&(path_bytes.len() as u64).to_le_bytes())?;
    writer.write_all(path_bytes)?;
    writer.write_all(&size.to_le_bytes())?;
    Ok(())
}

/// Read one record prefix from a framed stream.
///
/// Returns `Ok(None)` on a clean end of stream. A partial prefix or an
/// implausible path length is reported as [`PackError::Framing`].
pub fn read_record_prefix<R: Read>(reader: &mut R) -> Result<Option<(String, u64)>> {
    let mut len_buf = [0u8; 8];
    match read_exact_or_eof(reader, &mut len_buf)? {
        ReadOutcome::Eof => return Ok(None),
        ReadOutcome::Partial(n) => {
            return Err(PackError::Framing(format!(
                "truncated record header: {n} trailing bytes"
            )))
        }
        ReadOutcome::Full => {}
    }

    let path_len = u64::from_le_bytes(len_buf);
    if path_len == 0 || path_len > RECORD_PATH_MAX {
        return Err(PackError::Framing(format!(
            "implausible record path length {path_len}"
        )));
    }

    let mut path_buf = vec![0u8; path_len as usize];
    reader
        .read_exact(&mut path_buf)
        .map_err(|_| PackError::Framing("truncated record path".to_string()))?;
    let path = String::from_utf8(path_buf)
        .map_err(|_| PackError::Framing("record path is not UTF-8".to_string()))?;

    let mut size_buf = [0u8; 8];
    reader
        .read_exact(&mut size_buf)
        .map_err(|_| PackError::Framing("truncated record size".to_string()))?;

    Ok(Some((path, u64::from_le_bytes(size_buf))))
}

enum ReadOutcome {
    Full,
    Partial(usize),
    Eof,
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(match filled {
                0 => ReadOutcome::Eof,
                n => ReadOutcome::Partial(n),
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

/// Streaming encoder writing manifest entries into the payload region.
///
/// One entry at a time: `begin_entry`, then `write_chunk` until the entry's
/// bytes are consumed, then the next entry. `finish` flushes the stream.
/// Working memory is bounded by the algorithm's window, not input size.
pub trait PayloadEncoder {
    /// Start the next manifest entry.
    fn begin_entry(&mut self, logical_path: &str, size: u64) -> Result<()>;

    /// Append content bytes of the current entry.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Finish the stream and flush everything to the underlying file.
    fn finish(self: Box<Self>) -> Result<()>;
}

struct ZstdPayloadEncoder<'a> {
    inner: Option<zstd::stream::Encoder<'static, &'a mut File>>,
}

impl PayloadEncoder for ZstdPayloadEncoder<'_> {
    fn begin_entry(&mut self, logical_path: &str, size: u64) -> Result<()> {
        let writer = self.inner.as_mut().expect("encoder not finished");
        write_record_prefix(writer, logical_path, size)
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let writer = self.inner.as_mut().expect("encoder not finished");
        writer.write_all(chunk)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        let encoder = self.inner.take().expect("encoder not finished");
        let file = encoder
            .finish()
            .map_err(|e| PackError::Compression(e.to_string()))?;
        file.flush()?;
        Ok(())
    }
}

struct ZipPayloadEncoder<'a> {
    inner: Option<ZipWriter<&'a mut File>>,
}

impl PayloadEncoder for ZipPayloadEncoder<'_> {
    fn begin_entry(&mut self, logical_path: &str, _size: u64) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        self.inner
            .as_mut()
            .expect("encoder not finished")
            .start_file(logical_path, options)
            .map_err(|e| PackError::Compression(e.to_string()))
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.inner
            .as_mut()
            .expect("encoder not finished")
            .write_all(chunk)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        let writer = self.inner.take().expect("encoder not finished");
        let file = writer
            .finish()
            .map_err(|e| PackError::Compression(e.to_string()))?;
        file.flush()?;
        Ok(())
    }
}

/// Decide which algorithm a build will actually use.
///
/// zstd gets a single initialization attempt; if that fails and
/// `fallback_to_zip` is set, the build restarts with zip from scratch.
/// Once payload bytes have been emitted no switch happens; the decision
/// is final before encoding starts.
pub fn resolve_algo(settings: &CompressionSettings) -> Result<CompressionAlgo> {
    resolve_algo_with(settings, |level| {
        zstd::stream::Encoder::new(std::io::sink(), level).map(|_| ())
    })
}

fn resolve_algo_with<F>(settings: &CompressionSettings, probe: F) -> Result<CompressionAlgo>
where
    F: Fn(i32) -> std::io::Result<()>,
{
    match settings.algo {
        CompressionAlgo::Zip => Ok(CompressionAlgo::Zip),
        CompressionAlgo::Zstd => match probe(settings.level) {
            Ok(()) => Ok(CompressionAlgo::Zstd),
            Err(e) if settings.fallback_to_zip => {
                tracing::warn!(error = %e, "zstd init failed, falling back to zip");
                Ok(CompressionAlgo::Zip)
            }
            Err(e) => Err(PackError::CompressionInit(e.to_string())),
        },
    }
}

/// Create the payload encoder for an already-resolved algorithm.
///
/// The file must be positioned at the payload offset.
pub fn new_encoder<'a>(
    algo: CompressionAlgo,
    level: i32,
    file: &'a mut File,
) -> Result<Box<dyn PayloadEncoder + 'a>> {
    match algo {
        CompressionAlgo::Zstd => {
            let encoder = zstd::stream::Encoder::new(file, level)
                .map_err(|e| PackError::CompressionInit(e.to_string()))?;
            Ok(Box::new(ZstdPayloadEncoder {
                inner: Some(encoder),
            }))
        }
        CompressionAlgo::Zip => Ok(Box::new(ZipPayloadEncoder {
            inner: Some(ZipWriter::new(file)),
        })),
    }
}
