//! Error taxonomy for indexing, loading and configuration.
//!
//! "Not found" during symbol resolution is not an error; see
//! [`crate::resolve::Resolution`].

use std::path::PathBuf;

/// Errors raised by the indexing core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// A provider failed on one resource. Traversal continues.
    #[error("failed to scan {resource}: {message}")]
    ScanFailure { resource: String, message: String },

    /// A runtime dependency path entry could not be turned into a location
    #[error("invalid dependency path entry '{entry}' for project {project}: {reason}")]
    DependencyPathEntryInvalid {
        project: String,
        entry: String,
        reason: String,
    },

    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// The project subtree could not be enumerated
    #[error("failed to walk project {project}: {message}")]
    Walk { project: String, message: String },

    /// A newer full or clean build replaced this queued one
    #[error("build superseded by a newer trigger")]
    Superseded,

    #[error("build worker stopped")]
    WorkerStopped,
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid provider '{name}': {message}")]
    InvalidProvider { name: String, message: String },

    #[error("invalid type model {path}: {message}")]
    InvalidTypeModel { path: PathBuf, message: String },
}
