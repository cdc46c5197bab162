//! Container assembly.
//!
//! Splices the runtime stub, header, compressed payload, legacy hash tail
//! and footer into the final installer. The output appears atomically: all
//! writing happens in a sibling temp file that is renamed into place only
//! after a successful fsync.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::collect::{collect_files, FileManifest};
use crate::compress::{new_encoder, resolve_algo};
use crate::config::InstallerConfig;
use crate::format::{
    find_archive_placeholder, BuildInfo, CompressionAlgo, CompressionSettings, Footer, HashInfo,
    Header, PayloadStats, ARCHIVE_HASH_PLACEHOLDER, HEADER_MAGIC,
};
use crate::hash::{sha256_file_range, to_hex};
use crate::{PackError, Result};

/// Copy buffer for streaming source files through the compressor.
const COPY_CHUNK: usize = 64 * 1024;

/// Information about a completed build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Size of the stub executable.
    pub stub_size: u64,
    /// Compressed payload size.
    pub payload_size: u64,
    /// Total uncompressed size of all files.
    pub original_size: u64,
    /// Number of files in the payload.
    pub file_count: u64,
    /// Total installer size.
    pub total_size: u64,
    /// Algorithm actually used.
    pub algo: CompressionAlgo,
    /// Payload digest, lowercase hex.
    pub archive_sha256: String,
}

/// Builds installer containers from a configuration and a stub executable.
pub struct ContainerWriter {
    builder_version: String,
    timestamp: Option<u64>,
}

impl Default for ContainerWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerWriter {
    /// Create a writer stamping this crate's version into the header.
    pub fn new() -> Self {
        Self {
            builder_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: None,
        }
    }

    /// Override the builder version recorded in the header.
    pub fn with_builder_version(mut self, version: impl Into<String>) -> Self {
        self.builder_version = version.into();
        self
    }

    /// Pin the build timestamp. With identical configuration and inputs a
    /// pinned timestamp makes the output byte-identical across builds.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build an installer from `config`, splicing the payload onto the stub
    /// at `stub_path` and writing the result to `output_path`.
    pub fn build(
        &self,
        mut config: InstallerConfig,
        stub_path: &Path,
        output_path: &Path,
    ) -> Result<BuildOutcome> {
        config.validate()?;
        let fingerprint = config.fingerprint();

        let manifest = collect_files(&config.inputs, &config.exclude)?;
        let algo = resolve_algo(&config.compression)?;

        if !stub_path.is_file() {
            return Err(PackError::StubMissing(stub_path.to_path_buf()));
        }

        info!(
            output = %output_path.display(),
            files = manifest.len(),
            algo = algo.as_str(),
            "assembling installer"
        );

        // Sibling temp file so the final rename stays on one filesystem.
        // Dropping it on any error below removes the partial output.
        let out_dir = parent_dir(output_path);
        let mut temp = NamedTempFile::new_in(out_dir)?;

        let outcome = self.write_container(&config, &manifest, algo, &fingerprint, stub_path, &mut temp)?;

        temp.as_file().sync_all()?;
        temp.persist(output_path).map_err(|e| PackError::Io(e.error))?;

        info!(
            total_size = outcome.total_size,
            payload_size = outcome.payload_size,
            "installer assembled"
        );
        Ok(outcome)
    }

    fn write_container(
        &self,
        config: &InstallerConfig,
        manifest: &FileManifest,
        algo: CompressionAlgo,
        fingerprint: &str,
        stub_path: &Path,
        temp: &mut NamedTempFile,
    ) -> Result<BuildOutcome> {
        let temp_path = temp.path().to_path_buf();
        let file = temp.as_file_mut();

        // 1. Stub, copied verbatim.
        let mut stub = File::open(stub_path)?;
        let stub_size = io::copy(&mut stub, file)?;

        // 2. Header, finalized up front with a digest placeholder. It
        // contains the manifest but no per-file hashes, so its length is
        // known before the payload encodes.
        let header = self.build_header(config, manifest, algo, fingerprint);
        let header_bytes = header.to_wire()?;
        let header_len = header_bytes.len() as u64;
        file.write_all(&header_len.to_le_bytes())?;
        file.write_all(&header_bytes)?;

        let payload_offset = stub_size + 8 + header_len;

        // 3. Payload, streamed through the compressor one entry at a time.
        let mut encoder = new_encoder(algo, config.compression.level, &mut *file)?;
        for entry in manifest.entries() {
            encoder.begin_entry(&entry.logical_path, entry.size)?;

            let mut source = File::open(&entry.source_path)?;
            let mut buf = [0u8; COPY_CHUNK];
            let mut copied = 0u64;
            loop {
                let n = source.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                copied += n as u64;
                if copied > entry.size {
                    break;
                }
                encoder.write_chunk(&buf[..n])?;
            }
            if copied != entry.size {
                return Err(PackError::SizeMismatch {
                    path: entry.logical_path.clone(),
                    expected: entry.size,
                    actual: copied,
                });
            }
        }
        encoder.finish()?;

        let payload_end = file.stream_position()?;
        let payload_size = payload_end - payload_offset;

        // 4. Single digest over the payload range, used for the legacy
        // tail, the footer, and the header patch.
        let digest = sha256_file_range(&temp_path, payload_offset, payload_size)?;

        // 5. Legacy tail: raw digest for pre-footer readers.
        file.seek(SeekFrom::End(0))?;
        file.write_all(&digest)?;

        // 6. Footer.
        let footer = Footer {
            header_offset: stub_size,
            header_len,
            payload_offset,
            payload_size,
            payload_sha256: digest,
        };
        file.write_all(&footer.to_bytes())?;

        // 7. Patch the digest into the header placeholder. The placeholder
        // is a fixed 64-character run, so the header length is unchanged.
        let placeholder = find_archive_placeholder(&header_bytes).ok_or_else(|| {
            PackError::HeaderMalformed("archive hash placeholder missing".to_string())
        })?;
        file.seek(SeekFrom::Start(stub_size + 8 + placeholder as u64))?;
        file.write_all(to_hex(&digest).as_bytes())?;
        file.flush()?;

        debug!(
            stub_size,
            header_len, payload_offset, payload_size, "container offsets"
        );

        let total_size = payload_end + 32 + crate::format::FOOTER_SIZE as u64;
        Ok(BuildOutcome {
            stub_size,
            payload_size,
            original_size: manifest.total_size(),
            file_count: manifest.len() as u64,
            total_size,
            algo,
            archive_sha256: to_hex(&digest),
        })
    }

    fn build_header(
        &self,
        config: &InstallerConfig,
        manifest: &FileManifest,
        algo: CompressionAlgo,
        fingerprint: &str,
    ) -> Header {
        let timestamp = self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

        Header {
            magic: HEADER_MAGIC.to_string(),
            schema_version: config.schema_version,
            product: config.product.clone(),
            ui: config.ui.clone(),
            install: config.install.clone(),
            compression: CompressionSettings {
                algo,
                level: config.compression.level,
                fallback_to_zip: config.compression.fallback_to_zip,
            },
            env: config.env.clone(),
            files: manifest.to_file_entries(),
            scripts: config.post_actions.clone(),
            hash: HashInfo {
                algo: "sha256".to_string(),
                archive: ARCHIVE_HASH_PLACEHOLDER.to_string(),
            },
            build: BuildInfo {
                timestamp,
                builder_version: self.builder_version.clone(),
                config_fingerprint: fingerprint.to_string(),
            },
            stats: Some(PayloadStats {
                original_size: manifest.total_size(),
                file_count: manifest.len() as u64,
            }),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{InputSpec, Resources};
    use crate::format::{InstallOptions, ProductInfo, UiText, FOOTER_MAGIC, FOOTER_SIZE};
    use crate::hash::sha256_bytes;
    use std::fs;

    pub(crate) fn test_config(input: &Path) -> InstallerConfig {
        InstallerConfig {
            schema_version: 1,
            product: ProductInfo {
                name: "TestApp".to_string(),
                version: "1.0.0".to_string(),
                company: None,
                description: None,
                copyright: None,
                website: None,
            },
            install: InstallOptions {
                default_path: "%LOCALAPPDATA%/TestApp".to_string(),
                allow_user_path: true,
                force_hidden_path: false,
                silent_allowed: true,
                require_admin: false,
                license_file: None,
                privacy_file: None,
            },
            inputs: vec![InputSpec {
                path: input.to_path_buf(),
                recursive: true,
                preserve_structure: false,
            }],
            ui: UiText::default(),
            compression: CompressionSettings {
                algo: CompressionAlgo::Zstd,
                level: 3,
                fallback_to_zip: true,
            },
            exclude: Vec::new(),
            post_actions: Vec::new(),
            env: None,
            resources: Resources::default(),
        }
    }

    pub(crate) fn write_stub(dir: &Path) -> PathBuf {
        let stub = dir.join("stub.exe");
        fs::write(&stub, b"MZ-not-a-real-pe-but-opaque-to-the-writer").unwrap();
        stub
    }

    #[test]
    fn test_footer_invariants_hold() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("readme.txt"), b"hello\n").unwrap();
        let stub = write_stub(temp_dir.path());
        let out = temp_dir.path().join("installer.exe");

        let outcome = ContainerWriter::new()
            .build(test_config(&root), &stub, &out)
            .unwrap();

        let data = fs::read(&out).unwrap();
        let footer_bytes: [u8; FOOTER_SIZE] =
            data[data.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = Footer::from_bytes(&footer_bytes).unwrap();

        assert_eq!(&footer_bytes[0..8], FOOTER_MAGIC);
        assert_eq!(
            footer.header_offset + 8 + footer.header_len,
            footer.payload_offset
        );
        assert_eq!(
            footer.payload_offset + footer.payload_size + 32 + FOOTER_SIZE as u64,
            data.len() as u64
        );
        assert!(footer.payload_size > 0);
        assert_eq!(outcome.payload_size, footer.payload_size);

        // Footer digest covers exactly the payload range.
        let payload =
            &data[footer.payload_offset as usize..(footer.payload_offset + footer.payload_size) as usize];
        assert_eq!(footer.payload_sha256, sha256_bytes(payload));

        // Legacy tail carries the same raw digest.
        let tail_start = data.len() - FOOTER_SIZE - 32;
        assert_eq!(&data[tail_start..tail_start + 32], &footer.payload_sha256[..]);
    }

    #[test]
    fn test_header_hash_patched_and_agrees_with_footer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.bin"), vec![7u8; 10_000]).unwrap();
        let stub = write_stub(temp_dir.path());
        let out = temp_dir.path().join("installer.exe");

        ContainerWriter::new()
            .build(test_config(&root), &stub, &out)
            .unwrap();

        let data = fs::read(&out).unwrap();
        let footer_bytes: [u8; FOOTER_SIZE] =
            data[data.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = Footer::from_bytes(&footer_bytes).unwrap();

        let header_start = (footer.header_offset + 8) as usize;
        let header_bytes = &data[header_start..header_start + footer.header_len as usize];
        let header = Header::from_wire(header_bytes).unwrap();

        assert_eq!(header.hash.algo, "sha256");
        assert_eq!(header.hash.archive, to_hex(&footer.payload_sha256));
        assert_ne!(header.hash.archive, ARCHIVE_HASH_PLACEHOLDER);
        assert_eq!(header.files.len(), 1);
        assert_eq!(header.files[0].size, 10_000);
    }

    #[test]
    fn test_pinned_timestamp_builds_are_byte_identical() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("one.txt"), b"1").unwrap();
        fs::write(root.join("two.txt"), b"22").unwrap();
        let stub = write_stub(temp_dir.path());

        let out_a = temp_dir.path().join("a.exe");
        let out_b = temp_dir.path().join("b.exe");
        ContainerWriter::new()
            .with_timestamp(1_700_000_000)
            .build(test_config(&root), &stub, &out_a)
            .unwrap();
        ContainerWriter::new()
            .with_timestamp(1_700_000_000)
            .build(test_config(&root), &stub, &out_b)
            .unwrap();

        assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
    }

    #[test]
    fn test_empty_manifest_builds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("only.txt"), b"x").unwrap();
        let stub = write_stub(temp_dir.path());
        let out = temp_dir.path().join("installer.exe");

        let mut config = test_config(&root);
        config.exclude = vec!["*".to_string()];
        let outcome = ContainerWriter::new().build(config, &stub, &out).unwrap();

        assert_eq!(outcome.file_count, 0);
        assert_eq!(outcome.original_size, 0);
        // An empty zstd frame still has a few bytes of framing.
        assert!(out.exists());
    }

    #[test]
    fn test_missing_stub_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        let out = temp_dir.path().join("installer.exe");

        let missing = temp_dir.path().join("no-stub.exe");
        let result = ContainerWriter::new().build(test_config(&root), &missing, &out);
        assert!(matches!(result, Err(PackError::StubMissing(_))));
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_leaves_no_output() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        let locked = root.join("locked.bin");
        fs::write(&locked, b"secret").unwrap();
        let stub = write_stub(temp_dir.path());

        let out_dir = temp_dir.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();
        let out = out_dir.join("installer.exe");

        // Unreadable source: collection sees it, streaming fails.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // Permission bits are not enforced (running as root).
            return;
        }
        let result = ContainerWriter::new().build(test_config(&root), &stub, &out);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(result.is_err());
        assert!(!out.exists());
        // The sibling temp file must be gone too.
        let leftovers: Vec<_> = fs::read_dir(&out_dir).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_zip_payload_builds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("readme.txt"), b"hello\n").unwrap();
        let stub = write_stub(temp_dir.path());
        let out = temp_dir.path().join("installer.exe");

        let mut config = test_config(&root);
        config.compression.algo = CompressionAlgo::Zip;
        config.compression.level = 6;
        let outcome = ContainerWriter::new().build(config, &stub, &out).unwrap();
        assert_eq!(outcome.algo, CompressionAlgo::Zip);
        assert!(outcome.payload_size > 0);
    }
}
