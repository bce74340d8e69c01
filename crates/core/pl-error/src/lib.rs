//! Error types for pelican.
//!
//! This crate provides:
//! - [`PelicanError`] - Top-level error enum shared by all pipeline stages
//! - Domain-specific errors ([`ConfigError`], [`ScanError`], [`MatchError`],
//!   [`StorageError`], [`PipelineError`])
//! - A [`Result`] alias used throughout the workspace
//!
//! Errors raised inside a pipeline stage are recorded in that stage's result
//! object and travel downstream with it; they are never thrown across stage
//! boundaries. [`StorageError`] is `Clone` because backend results are stored
//! per marker and forwarded over channels.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for pelican.
#[derive(Error, Debug)]
pub enum PelicanError {
    /// Configuration loading or validation errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Directory traversal and marker discovery errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// File matcher errors (pattern parsing, sibling resolution)
    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    /// Storage backend errors (pre-sync, upload, checksum)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pipeline orchestration errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A marker failed replication; wraps the first backend error observed.
    #[error("{message}: {}", .marker.display())]
    Marker {
        /// Marker file the failure belongs to
        marker: PathBuf,
        /// Rendered first backend error
        message: String,
    },

    /// Local file removal failed after a successful replication
    #[error("Failed to remove local file {}: {message}", .path.display())]
    Remove { path: PathBuf, message: String },

    /// Cooperative cancellation; propagated silently by supervisors
    #[error("operation canceled")]
    Canceled,
}

impl PelicanError {
    /// True when this error is a cancellation marker rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read configuration file {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    /// Config file could not be parsed
    #[error("failed to parse configuration file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// A duration string was malformed
    #[error("invalid duration '{value}': {reason}")]
    Duration { value: String, reason: String },

    /// An environment-variable override carried an unusable value
    #[error("invalid value for {var}: {value}")]
    EnvOverride { var: String, value: String },

    /// Semantic validation failed
    #[error("{0}")]
    Validation(String),
}

/// Scanner and walker errors.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Marker pattern contained wildcards or lacked the leading dot
    #[error(
        "invalid file extension '{0}'. use a file extension without * or regex characters; i.e. '.rcd.gz'"
    )]
    InvalidPattern(String),

    /// Traversal failed below the scan root
    #[error("error walking '{}': {message}", .path.display())]
    Walk { path: PathBuf, message: String },
}

/// File matcher errors.
#[derive(Error, Debug)]
pub enum MatchError {
    /// A basic-matcher pattern was not a plain extension
    #[error("{0} is not a valid file extension")]
    NotAnExtension(String),

    /// A glob pattern failed to compile
    #[error("failed to compile glob pattern '{pattern}': {message}")]
    BadGlob { pattern: String, message: String },

    /// I/O failure while walking the marker directory
    #[error("error walking directory '{}': {message}", .dir.display())]
    Walk { dir: PathBuf, message: String },
}

/// Storage backend errors.
///
/// String payloads keep the type `Clone`: a backend result owns its error
/// while the aggregated marker error quotes it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Container bootstrap (bucket / directory creation) failed
    #[error("pre-sync validation failed: {0}")]
    PreSync(String),

    /// A matched candidate vanished before upload
    #[error("candidate file is missing: {0}")]
    MissingCandidate(String),

    /// The underlying client rejected or failed a request
    #[error("storage client error: {0}")]
    Client(String),

    /// Local I/O failure while reading, hashing or copying
    #[error("storage i/o error: {0}")]
    Io(String),

    /// Strong-integrity check failed after upload
    #[error(
        "checksum mismatch after upload: expected {expected}, got {actual} \
         (file_size_in_bucket = {remote_size}, file_size_local = {local_size})"
    )]
    ChecksumMismatch {
        expected: String,
        actual: String,
        remote_size: u64,
        local_size: u64,
    },

    /// Cancellation observed mid-operation
    #[error("storage operation canceled")]
    Canceled,
}

/// Pipeline orchestration errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stop-on-error pipeline observed at least one cycle error
    #[error("pipeline '{0}' encountered error")]
    Stopped(String),

    /// The marker disappeared while waiting for it to become ready
    #[error("marker file doesn't exist {}", .0.display())]
    MarkerVanished(PathBuf),
}

/// Result type alias using PelicanError.
pub type Result<T> = std::result::Result<T, PelicanError>;
