//! Binary format definitions for the installer container.
//!
//! This module defines the fixed-size trailing footer, the JSON header
//! record, and the wire types shared between builder and runtime. Field
//! names in the serde types are stable on the wire; renaming one is a
//! format break.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hash::DIGEST_LEN;
use crate::{PackError, Result};

/// Magic bytes identifying the trailing footer.
pub const FOOTER_MAGIC: &[u8; 8] = b"INSPAF01";

/// Magic string identifying the header record.
pub const HEADER_MAGIC: &str = "INSPRO1";

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 72;

/// Length of the legacy raw-hash tail that precedes the footer.
pub const LEGACY_TAIL_LEN: usize = 32;

/// Current header schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Header schema versions this build can read.
pub const SUPPORTED_SCHEMAS: &[u32] = &[1];

/// Hex placeholder written for `hash.archive` before the payload digest is
/// known. Exactly 64 characters so the patched value is byte-length
/// invariant.
pub const ARCHIVE_HASH_PLACEHOLDER: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Fixed-size footer at the end of a built installer.
///
/// Layout (72 bytes total, little-endian):
/// ```text
/// Offset  Size  Field
/// 0       8     magic ("INSPAF01")
/// 8       8     header_offset (u64) - offset of the header length prefix
/// 16      8     header_len (u64) - length of the header JSON
/// 24      8     payload_offset (u64) - offset of the compressed payload
/// 32      8     payload_size (u64) - length of the compressed payload
/// 40      32    payload_sha256 - raw SHA-256 of the payload range
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Offset of the 8-byte header length prefix (= stub size).
    pub header_offset: u64,
    /// Length of the header JSON in bytes.
    pub header_len: u64,
    /// Offset of the first payload byte.
    pub payload_offset: u64,
    /// Length of the compressed payload in bytes.
    pub payload_size: u64,
    /// SHA-256 of the exact payload byte range.
    pub payload_sha256: [u8; DIGEST_LEN],
}

impl Footer {
    /// Serialize the footer to its 72-byte wire form.
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];

        buf[0..8].copy_from_slice(FOOTER_MAGIC);
        buf[8..16].copy_from_slice(&self.header_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.header_len.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[40..72].copy_from_slice(&self.payload_sha256);

        buf
    }

    /// Deserialize a footer from its 72-byte wire form.
    pub fn from_bytes(buf: &[u8; FOOTER_SIZE]) -> Result<Self> {
        if &buf[0..8] != FOOTER_MAGIC {
            return Err(PackError::FooterNotFound);
        }

        let mut payload_sha256 = [0u8; DIGEST_LEN];
        payload_sha256.copy_from_slice(&buf[40..72]);

        Ok(Self {
            header_offset: u64::from_le_bytes(buf[8..16].try_into().expect("8-byte slice")),
            header_len: u64::from_le_bytes(buf[16..24].try_into().expect("8-byte slice")),
            payload_offset: u64::from_le_bytes(buf[24..32].try_into().expect("8-byte slice")),
            payload_size: u64::from_le_bytes(buf[32..40].try_into().expect("8-byte slice")),
            payload_sha256,
        })
    }
}

/// Compression algorithm of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgo {
    /// Zstandard, record-framed stream. The primary algorithm.
    Zstd,
    /// ZIP archive with stored entries. The fallback.
    Zip,
}

impl CompressionAlgo {
    /// Wire name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Zip => "zip",
        }
    }
}

/// Script interpreter kind for post-install actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// PowerShell script file.
    Powershell,
    /// Batch file run through the command interpreter.
    Batch,
}

/// Condition gating whether a post-install action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunCondition {
    /// Run unconditionally.
    Always,
    /// Run only if every prior action succeeded.
    Success,
    /// Run only if any prior action failed.
    Failure,
}

/// Product identity carried into the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Product name.
    pub name: String,
    /// Product version string.
    pub version: String,
    /// Company name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Short product description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Copyright line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    /// Product website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Installer GUI text. Opaque to the core; copied verbatim into the
/// header for the runtime GUI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiText {
    /// Installer window title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    /// Welcome page heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_heading: Option<String>,
    /// Welcome page subtitle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_subtitle: Option<String>,
    /// GUI theme identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Whether script output appears on the progress page.
    #[serde(default = "default_true")]
    pub show_progress_script_output: bool,
}

impl Default for UiText {
    fn default() -> Self {
        Self {
            window_title: None,
            welcome_heading: None,
            welcome_subtitle: None,
            theme: None,
            show_progress_script_output: true,
        }
    }
}

/// Install behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Default install directory; may contain `%VAR%` placeholders.
    pub default_path: String,
    /// Whether the user may pick a different directory.
    #[serde(default = "default_true")]
    pub allow_user_path: bool,
    /// Hide the path chooser and force the default path.
    #[serde(default)]
    pub force_hidden_path: bool,
    /// Whether silent (`/S`) installation is permitted.
    #[serde(default = "default_true")]
    pub silent_allowed: bool,
    /// Whether the installer must run elevated.
    #[serde(default)]
    pub require_admin: bool,
    /// License text shown by the GUI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_file: Option<String>,
    /// Privacy statement shown by the GUI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_file: Option<String>,
}

/// Compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Requested algorithm.
    #[serde(default = "default_algo")]
    pub algo: CompressionAlgo,
    /// Compression level: 1-22 for zstd, 1-9 for zip.
    #[serde(default = "default_level")]
    pub level: i32,
    /// Fall back to zip when zstd cannot be initialized.
    #[serde(default = "default_true")]
    pub fallback_to_zip: bool,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            algo: default_algo(),
            level: default_level(),
            fallback_to_zip: true,
        }
    }
}

/// Environment changes applied after extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Directories to append to `PATH` if not already present.
    #[serde(default)]
    pub add_path: Vec<String>,
    /// Variables to write into the persistent environment store.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    /// Machine scope instead of user scope; requires elevation.
    #[serde(default)]
    pub system_scope: bool,
}

/// A declared post-install action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSpec {
    /// Interpreter kind.
    #[serde(rename = "type")]
    pub kind: ScriptKind,
    /// Script path, relative to the install directory.
    pub command: String,
    /// Extra arguments passed to the script.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds before the child process tree is killed.
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
    /// Condition gating execution.
    #[serde(default = "default_run_if")]
    pub run_if: RunCondition,
    /// Start without a visible console window.
    #[serde(default = "default_true")]
    pub hidden: bool,
    /// Forward captured output to the progress sink.
    #[serde(default = "default_true")]
    pub show_in_ui: bool,
    /// Working directory relative to the install directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

/// One file of the payload as recorded in the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Logical path, forward slashes.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// Payload digest as recorded in the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashInfo {
    /// Digest algorithm; always `"sha256"`.
    pub algo: String,
    /// Lowercase hex digest of the payload range. Duplicates the footer
    /// value for legacy readers.
    pub archive: String,
}

/// Build provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Build timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Version of the builder that produced the container.
    pub builder_version: String,
    /// SHA-256 of the normalized configuration document.
    pub config_fingerprint: String,
}

/// Aggregate payload statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadStats {
    /// Total uncompressed size of all files.
    pub original_size: u64,
    /// Number of files in the payload.
    pub file_count: u64,
}

/// The JSON header record describing the installer.
///
/// Serialization is canonical: UTF-8, compact, declaration field order, no
/// BOM, no trailing newline. `hash.archive` is written as a 64-zero
/// placeholder and patched in place once the payload digest is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Header kind discriminator; always [`HEADER_MAGIC`].
    pub magic: String,
    /// Header schema version.
    pub schema_version: u32,
    /// Product identity.
    pub product: ProductInfo,
    /// GUI text, opaque to the core.
    pub ui: UiText,
    /// Install behavior.
    pub install: InstallOptions,
    /// Compression actually used for the payload.
    pub compression: CompressionSettings,
    /// Environment changes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSpec>,
    /// Payload file list in payload order.
    pub files: Vec<FileEntry>,
    /// Post-install actions in declaration order.
    pub scripts: Vec<ScriptSpec>,
    /// Payload digest.
    pub hash: HashInfo,
    /// Build provenance.
    pub build: BuildInfo,
    /// Aggregate statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PayloadStats>,
}

impl Header {
    /// Serialize to canonical wire bytes.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate header bytes.
    ///
    /// Checks the magic string and that `schema_version` is one this build
    /// understands.
    pub fn from_wire(data: &[u8]) -> Result<Self> {
        let header: Header = serde_json::from_slice(data)
            .map_err(|e| PackError::HeaderMalformed(e.to_string()))?;

        if header.magic != HEADER_MAGIC {
            return Err(PackError::HeaderMalformed(format!(
                "bad header magic: {:?}",
                header.magic
            )));
        }
        if !SUPPORTED_SCHEMAS.contains(&header.schema_version) {
            return Err(PackError::UnsupportedSchema(header.schema_version));
        }

        Ok(header)
    }

    /// Total uncompressed size of all payload files.
    pub fn total_file_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Locate the `hash.archive` placeholder inside serialized header bytes.
///
/// Returns the byte offset of the 64-character hex run. The search key
/// includes the JSON key and opening quote, which cannot occur inside any
/// string value (quotes are escaped there), so the match is unambiguous.
pub fn find_archive_placeholder(header_bytes: &[u8]) -> Option<usize> {
    let key = b"\"archive\":\"";
    let needle: Vec<u8> = {
        let mut v = key.to_vec();
        v.extend_from_slice(ARCHIVE_HASH_PLACEHOLDER.as_bytes());
        v
    };
    header_bytes
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map(|pos| pos + key.len())
}

fn default_true() -> bool {
    true
}

fn default_algo() -> CompressionAlgo {
    CompressionAlgo::Zstd
}

fn default_level() -> i32 {
    10
}

fn default_timeout() -> u64 {
    300
}

fn default_run_if() -> RunCondition {
    RunCondition::Always
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            magic: HEADER_MAGIC.to_string(),
            schema_version: SCHEMA_VERSION,
            product: ProductInfo {
                name: "Demo App".to_string(),
                version: "1.0.0".to_string(),
                company: Some("Acme".to_string()),
                description: None,
                copyright: None,
                website: None,
            },
            ui: UiText::default(),
            install: InstallOptions {
                default_path: "%LOCALAPPDATA%/DemoApp".to_string(),
                allow_user_path: true,
                force_hidden_path: false,
                silent_allowed: true,
                require_admin: false,
                license_file: None,
                privacy_file: None,
            },
            compression: CompressionSettings::default(),
            env: None,
            files: vec![FileEntry {
                path: "readme.txt".to_string(),
                size: 6,
                mtime: 1_700_000_000,
            }],
            scripts: Vec::new(),
            hash: HashInfo {
                algo: "sha256".to_string(),
                archive: ARCHIVE_HASH_PLACEHOLDER.to_string(),
            },
            build: BuildInfo {
                timestamp: 1_700_000_000,
                builder_version: "0.3.1".to_string(),
                config_fingerprint: "feed".to_string(),
            },
            stats: None,
        }
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = Footer {
            header_offset: 512 * 1024,
            header_len: 2048,
            payload_offset: 512 * 1024 + 8 + 2048,
            payload_size: 50 * 1024 * 1024,
            payload_sha256: [0xAB; 32],
        };

        let bytes = footer.to_bytes();
        assert_eq!(bytes.len(), FOOTER_SIZE);
        assert_eq!(&bytes[0..8], FOOTER_MAGIC);

        let restored = Footer::from_bytes(&bytes).unwrap();
        assert_eq!(restored, footer);
    }

    #[test]
    fn test_footer_rejects_bad_magic() {
        let mut bytes = [0u8; FOOTER_SIZE];
        bytes[0..8].copy_from_slice(b"BADMAGIC");

        assert!(matches!(
            Footer::from_bytes(&bytes),
            Err(PackError::FooterNotFound)
        ));
    }

    #[test]
    fn test_footer_no_32bit_truncation() {
        // Sizes past 2^31 must survive the codec untouched.
        let footer = Footer {
            header_offset: 1,
            header_len: 2,
            payload_offset: 11,
            payload_size: (1u64 << 31) + 17,
            payload_sha256: [0; 32],
        };
        let restored = Footer::from_bytes(&footer.to_bytes()).unwrap();
        assert_eq!(restored.payload_size, (1u64 << 31) + 17);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let wire = header.to_wire().unwrap();

        // Canonical form: no BOM, no trailing newline.
        assert_ne!(&wire[0..3], [0xEF, 0xBB, 0xBF]);
        assert_ne!(*wire.last().unwrap(), b'\n');

        let restored = Header::from_wire(&wire).unwrap();
        assert_eq!(restored.product.name, "Demo App");
        assert_eq!(restored.files.len(), 1);
        assert_eq!(restored.files[0].size, 6);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut header = sample_header();
        header.magic = "NOTME".to_string();
        let wire = header.to_wire().unwrap();
        assert!(matches!(
            Header::from_wire(&wire),
            Err(PackError::HeaderMalformed(_))
        ));
    }

    #[test]
    fn test_header_rejects_unknown_schema() {
        let mut header = sample_header();
        header.schema_version = 99;
        let wire = header.to_wire().unwrap();
        assert!(matches!(
            Header::from_wire(&wire),
            Err(PackError::UnsupportedSchema(99))
        ));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&CompressionAlgo::Zstd).unwrap(),
            "\"zstd\""
        );
        assert_eq!(
            serde_json::to_string(&ScriptKind::Powershell).unwrap(),
            "\"powershell\""
        );
        assert_eq!(
            serde_json::to_string(&RunCondition::Failure).unwrap(),
            "\"failure\""
        );
    }

    #[test]
    fn test_find_archive_placeholder() {
        let header = sample_header();
        let wire = header.to_wire().unwrap();

        let offset = find_archive_placeholder(&wire).expect("placeholder present");
        let span = &wire[offset..offset + 64];
        assert_eq!(span, ARCHIVE_HASH_PLACEHOLDER.as_bytes());
    }

    #[test]
    fn test_placeholder_not_confused_by_file_names() {
        // A file named like the placeholder must not shadow the hash slot.
        let mut header = sample_header();
        header.files.insert(
            0,
            FileEntry {
                path: ARCHIVE_HASH_PLACEHOLDER.to_string(),
                size: 1,
                mtime: 0,
            },
        );
        let wire = header.to_wire().unwrap();

        let offset = find_archive_placeholder(&wire).unwrap();
        // The bytes just before the match must be the hash key, not a path.
        let key_start = offset - b"\"archive\":\"".len();
        assert_eq!(&wire[key_start..offset], b"\"archive\":\"");
    }
}
