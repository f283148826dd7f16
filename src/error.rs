//! Unified error handling for registry operations
//!
//! Every fallible operation in the library returns [`RegistryResult`]. Git,
//! I/O and JSON failures convert automatically; the domain variants carry the
//! path or principal involved so callers can report them without extra context.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Error types for the version-controlled registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A master or private repository could not be created or opened
    #[error("Repository initialization failed at {path:?}: {message}")]
    RepositoryInit { path: PathBuf, message: String },

    /// A principal could not be mapped to a usable repository
    #[error("Cannot resolve repository for principal '{principal}': {message}")]
    RepositoryResolution { principal: String, message: String },

    /// Importing the pre-existing registry into the first master commit failed
    #[error("Seeding master repository failed: {message}")]
    Seeding { message: String },

    /// Record store read or write failure
    #[error("Persistence error at {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// No service definition with the requested identity
    #[error("Service {id} not found")]
    ServiceNotFound { id: i64 },

    /// Bootstrap ended in degraded mode
    #[error("Version control is unavailable: master repository was not initialized")]
    VersionControlUnavailable,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal library errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Git errors from libgit2
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Create a repository initialization error
    pub fn repository_init<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::RepositoryInit {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a repository resolution error
    pub fn resolution<P: Into<String>, S: Into<String>>(principal: P, message: S) -> Self {
        Self::RepositoryResolution {
            principal: principal.into(),
            message: message.into(),
        }
    }

    /// Create a seeding error
    pub fn seeding<S: Into<String>>(message: S) -> Self {
        Self::Seeding {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means version control is switched off
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::VersionControlUnavailable)
    }

    /// Whether the error concerns a single record rather than the repository
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::ServiceNotFound { .. })
    }
}
