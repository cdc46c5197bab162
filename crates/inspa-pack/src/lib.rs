//! Installer container format for inspa.
//!
//! This crate owns the on-disk container that the builder produces and the
//! runtime stub consumes. Both halves must agree on it bit-exactly.
//!
//! # Container Layout
//!
//! ```text
//! offset 0          +---------------------------+
//!                   | Stub Executable           |  opaque, length S
//! offset S          +---------------------------+
//!                   | Header Len (u64 LE)       |  8 bytes
//! offset S+8        +---------------------------+
//!                   | Header (JSON, UTF-8)      |  length H
//! offset S+8+H      +---------------------------+
//!                   | Compressed Payload        |  length C
//! offset S+8+H+C    +---------------------------+
//!                   | Legacy Hash Tail          |  32 bytes, SHA-256 of payload
//! offset EOF-72     +---------------------------+
//!                   | Footer (72 bytes)         |
//!                   |  - magic: "INSPAF01"      |
//!                   |  - header/payload offsets |
//!                   |  - payload SHA-256        |
//!                   +---------------------------+
//! ```
//!
//! The footer gives readers O(1) self-location. The 32-byte legacy tail
//! exists only for readers that predate the footer and verify payloads via
//! linear scan; new readers prefer the footer.

#![deny(missing_docs)]

pub mod collect;
pub mod compress;
pub mod config;
pub mod format;
pub mod hash;
pub mod reader;
pub mod writer;

pub use collect::{FileManifest, ManifestEntry};
pub use config::InstallerConfig;
pub use format::{Footer, Header, FOOTER_MAGIC, FOOTER_SIZE, HEADER_MAGIC, LEGACY_TAIL_LEN};
pub use reader::Container;
pub use writer::{BuildOutcome, ContainerWriter};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while producing or consuming a container.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Header JSON encode/decode error.
    #[error("header codec failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    /// An input root does not exist.
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Two source paths mapped to the same logical path.
    #[error("duplicate logical path: {0}")]
    DuplicateLogicalPath(String),

    /// The stub executable was not found.
    #[error("stub not found: {}", .0.display())]
    StubMissing(PathBuf),

    /// Compressor could not be initialized and fallback was not allowed.
    #[error("compressor init failed: {0}")]
    CompressionInit(String),

    /// Compression or decompression failed mid-stream.
    #[error("compression failed: {0}")]
    Compression(String),

    /// A source file changed size between collection and encoding.
    #[error("file changed during build: {path}: expected {expected} bytes, read {actual}")]
    SizeMismatch {
        /// Logical path of the offending entry.
        path: String,
        /// Size recorded in the manifest.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// The trailing footer magic did not match and no legacy header
    /// signature was found either.
    #[error("footer not found: no INSPAF01 trailer and no legacy header signature")]
    FooterNotFound,

    /// The header region could not be parsed.
    #[error("header malformed: {0}")]
    HeaderMalformed(String),

    /// The header declares a schema version this build does not support.
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),

    /// Payload bytes do not hash to the recorded digest.
    #[error("payload integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure {
        /// Digest recorded in the footer (hex).
        expected: String,
        /// Digest computed over the payload region (hex).
        actual: String,
    },

    /// Payload record framing was truncated or inconsistent.
    #[error("payload framing invalid: {0}")]
    Framing(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, PackError>;
