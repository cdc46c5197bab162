//! Payload extraction into the install directory.
//!
//! Files are written below a hidden staging directory and renamed into
//! final position only after the whole extraction succeeds; a failed or
//! cancelled extraction leaves nothing under the target directory. Every
//! destination path is validated against the staging root before any byte
//! is written.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use inspa_pack::compress::read_record_prefix;
use inspa_pack::format::{CompressionAlgo, Header};
use inspa_pack::PackError;
use tracing::debug;

use crate::log::InstallLog;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink};
use crate::{Result, RuntimeError};

/// Hidden staging directory under the install target.
pub const STAGING_DIR: &str = ".inspa_staging";

/// Copy buffer for streaming file content.
const COPY_CHUNK: usize = 64 * 1024;

/// Extracts a verified payload into a target directory.
pub struct Extractor<'a> {
    header: &'a Header,
    log: &'a InstallLog,
    cancel: &'a CancelFlag,
}

impl<'a> Extractor<'a> {
    /// Create an extractor for a parsed header.
    pub fn new(header: &'a Header, log: &'a InstallLog, cancel: &'a CancelFlag) -> Self {
        Self {
            header,
            log,
            cancel,
        }
    }

    /// Extract the payload stream into `target_dir`.
    ///
    /// On any error the staging tree is removed and the target directory is
    /// left as it was.
    pub fn extract<R: Read + std::io::Seek>(
        &self,
        payload: R,
        target_dir: &Path,
        progress: &mut ProgressSink,
    ) -> Result<()> {
        fs::create_dir_all(target_dir)?;
        let staging = target_dir.join(STAGING_DIR);
        if staging.exists() {
            // Leftover from an earlier failed run.
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        self.log
            .info(format!("staging files into {}", staging.display()));

        let result = self
            .extract_into(payload, &staging, progress)
            .and_then(|_| promote(&staging, target_dir));

        if let Err(e) = &result {
            self.log
                .error(format!("extraction aborted, staging removed: {e}"));
            let _ = fs::remove_dir_all(&staging);
        }
        result
    }

    fn extract_into<R: Read + std::io::Seek>(
        &self,
        payload: R,
        staging: &Path,
        progress: &mut ProgressSink,
    ) -> Result<()> {
        let mtimes: HashMap<&str, i64> = self
            .header
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.mtime))
            .collect();
        let bytes_total = self.header.total_file_size();

        match self.header.compression.algo {
            CompressionAlgo::Zstd => {
                self.extract_records(payload, staging, &mtimes, bytes_total, progress)
            }
            CompressionAlgo::Zip => {
                self.extract_zip(payload, staging, &mtimes, bytes_total, progress)
            }
        }
    }

    /// Decode the record-framed zstd stream.
    fn extract_records<R: Read>(
        &self,
        payload: R,
        staging: &Path,
        mtimes: &HashMap<&str, i64>,
        bytes_total: u64,
        progress: &mut ProgressSink,
    ) -> Result<()> {
        let mut decoder = zstd::stream::Decoder::new(payload)
            .map_err(|e| PackError::Compression(e.to_string()))?;
        let mut bytes_done = 0u64;

        loop {
            let (logical_path, size) = match read_record_prefix(&mut decoder) {
                Ok(Some(prefix)) => prefix,
                Ok(None) => break,
                Err(PackError::Framing(_)) => return Err(RuntimeError::TrailingBytes),
                Err(e) => return Err(e.into()),
            };

            let dest = secure_dest(staging, &logical_path)?;
            progress.send(ProgressEvent::FileStarted {
                path: logical_path.clone(),
            });

            let mut out = create_dest_file(staging, &dest, &logical_path)?;
            let mut remaining = size;
            let mut buf = [0u8; COPY_CHUNK];
            while remaining > 0 {
                if self.cancel.is_cancelled() {
                    return Err(RuntimeError::Cancelled);
                }
                let want = remaining.min(buf.len() as u64) as usize;
                let n = decoder.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(RuntimeError::Pack(PackError::Framing(format!(
                        "record content truncated: {logical_path}"
                    ))));
                }
                std::io::Write::write_all(&mut out, &buf[..n])?;
                remaining -= n as u64;
                bytes_done += n as u64;
                progress.bytes(&logical_path, bytes_done, bytes_total);
            }

            restore_mtime(&out, mtimes.get(logical_path.as_str()).copied());
            progress.send(ProgressEvent::FileFinished {
                path: logical_path,
            });

            if self.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
        }

        debug!(bytes_done, "record stream fully consumed");
        Ok(())
    }

    /// Walk the zip central directory in its stored order.
    fn extract_zip<R: Read + std::io::Seek>(
        &self,
        payload: R,
        staging: &Path,
        mtimes: &HashMap<&str, i64>,
        bytes_total: u64,
        progress: &mut ProgressSink,
    ) -> Result<()> {
        let mut archive =
            zip::ZipArchive::new(payload).map_err(|e| RuntimeError::Zip(e.to_string()))?;
        let mut bytes_done = 0u64;

        for index in 0..archive.len() {
            if self.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let mut entry = archive
                .by_index(index)
                .map_err(|e| RuntimeError::Zip(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }

            // enclosed_name rejects absolute and parent-relative names;
            // secure_dest re-checks against the staging root.
            let logical_path = match entry.enclosed_name() {
                Some(name) => name.to_string_lossy().replace('\\', "/"),
                None => {
                    return Err(RuntimeError::PathEscape {
                        path: entry.name().to_string(),
                    })
                }
            };
            let dest = secure_dest(staging, &logical_path)?;
            progress.send(ProgressEvent::FileStarted {
                path: logical_path.clone(),
            });

            let mut out = create_dest_file(staging, &dest, &logical_path)?;
            let mut buf = [0u8; COPY_CHUNK];
            loop {
                if self.cancel.is_cancelled() {
                    return Err(RuntimeError::Cancelled);
                }
                let n = entry.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                std::io::Write::write_all(&mut out, &buf[..n])?;
                bytes_done += n as u64;
                progress.bytes(&logical_path, bytes_done, bytes_total);
            }

            restore_mtime(&out, mtimes.get(logical_path.as_str()).copied());
            progress.send(ProgressEvent::FileFinished {
                path: logical_path,
            });
        }

        Ok(())
    }
}

/// Validate a logical path and map it below `root`.
///
/// Rejects absolute paths and any component that is not a plain name, so
/// `..` segments and drive prefixes cannot escape the root.
fn secure_dest(root: &Path, logical_path: &str) -> Result<PathBuf> {
    let rel = Path::new(logical_path);
    if rel.is_absolute() || logical_path.starts_with('/') {
        return Err(RuntimeError::PathEscape {
            path: logical_path.to_string(),
        });
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(RuntimeError::PathEscape {
                    path: logical_path.to_string(),
                })
            }
        }
    }
    Ok(root.join(rel))
}

/// Create the destination file, guarding against symlinked parents that
/// would carry the write outside the staging root.
fn create_dest_file(root: &Path, dest: &Path, logical_path: &str) -> Result<File> {
    let parent = dest.parent().unwrap_or(root);
    fs::create_dir_all(parent)?;

    let canon_root = fs::canonicalize(root)?;
    let canon_parent = fs::canonicalize(parent)?;
    if !canon_parent.starts_with(&canon_root) {
        return Err(RuntimeError::PathEscape {
            path: logical_path.to_string(),
        });
    }

    Ok(File::create(dest)?)
}

fn restore_mtime(file: &File, mtime: Option<i64>) {
    if let Some(secs) = mtime {
        if secs >= 0 {
            let when = UNIX_EPOCH + Duration::from_secs(secs as u64);
            // Best effort; a filesystem that refuses is not an error.
            let _ = file.set_modified(when);
        }
    }
}

/// Move every staged file into final position, then drop the staging tree.
fn promote(staging: &Path, target_dir: &Path) -> Result<()> {
    promote_dir(staging, staging, target_dir)?;
    fs::remove_dir_all(staging)?;
    Ok(())
}

fn promote_dir(staging_root: &Path, dir: &Path, target_root: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path
            .strip_prefix(staging_root)
            .expect("staging child is under staging root");
        let dest = target_root.join(rel);

        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dest)?;
            promote_dir(staging_root, &path, target_root)?;
        } else {
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            fs::rename(&path, &dest)?;
        }
    }
    Ok(())
}
