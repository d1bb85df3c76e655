//! Error types for incremental-state operations.

use std::path::PathBuf;

use crate::dependency::DependencyItem;

/// Errors that can occur while recording dependencies or touching persisted state.
///
/// Reading prior state is fail-safe and never produces these: a missing or
/// damaged manifest degrades to a full rebuild instead. This enum covers the
/// write paths and contract violations reported by build steps.
#[derive(Debug, thiserror::Error)]
pub enum IncrementalError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An artifact file has an invalid or missing header.
    #[error("invalid artifact header in {path}: {reason}")]
    InvalidHeader {
        /// The artifact file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The artifact file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A build step reported a malformed dependency fact.
    #[error("invalid dependency {item}: {reason}")]
    InvalidDependency {
        /// The rejected fact.
        item: Box<DependencyItem>,
        /// Why the fact was rejected.
        reason: &'static str,
    },

    /// The worker pool for build steps could not be created.
    #[error("failed to start build workers: {reason}")]
    WorkerPool {
        /// Description of the failure.
        reason: String,
    },
}
