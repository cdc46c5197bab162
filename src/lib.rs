//! inspa - builder for single-file self-extracting Windows installers.
//!
//! From a declarative YAML configuration the builder collects a tree of
//! input files, compresses them into one payload, and splices that payload
//! onto a prebuilt runtime stub:
//!
//! ```text
//! config.yaml ──> collect ──> compress ──> header ──> [stub|header|payload|footer]
//! ```
//!
//! The container format itself lives in `inspa-pack`; the runtime half in
//! `inspa-stub`. This crate is the operator-facing CLI plus configuration
//! loading.

#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Builder version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
