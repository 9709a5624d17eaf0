//! Error types for a reconciliation run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can abort a reconciliation run.
///
/// None of these are retried. Every variant except `Persistence` is raised
/// before the document is touched; `Persistence` leaves the file on disk at
/// its previous version.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The provider session is missing or expired. The user has to log in again.
    #[error("provider session unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider returned an error or output we could not interpret.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// A running machine has no usable public address.
    #[error("cannot resolve address of running machine '{machine}': {reason}")]
    AddressResolution { machine: String, reason: String },

    #[error("document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("cannot read document {}: {source}", path.display())]
    DocumentUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document parsed but violates the expected structure.
    #[error("malformed document: {0}")]
    DocumentMalformed(String),

    #[error("folder '{0}' not found in document")]
    FolderMissing(String),

    #[error("failed to persist document {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;
