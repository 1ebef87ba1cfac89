use std::fmt;
use std::io;

/// Errors produced by the depot core.
///
/// Validation variants are raised before any state is mutated. `NotFound` on
/// a delete path is a normal reported outcome, not a system fault. `Io` wraps
/// unexpected disk failures, including a failed snapshot persist.
#[derive(Debug)]
pub enum StoreError {
    /// Bucket is not in the configured allow-list.
    BucketNotAllowed(String),
    /// File extension is not in the configured allow-list.
    ExtensionNotAllowed(String),
    /// Upload payload exceeded the configured size limit (bytes).
    PayloadTooLarge(u64),
    /// No payload or empty original filename supplied.
    NoFile,
    NotFound,
    /// Filename does not match the server-generated format.
    InvalidName(String),
    /// Bulk delete called with an empty id list.
    NoIds,
    /// Destructive operation called without its confirmation flag.
    ConfirmationRequired,
    /// Insert would overwrite an existing id or filename.
    DuplicateKey(String),
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::BucketNotAllowed(bucket) => write!(f, "Bucket not allowed: {}", bucket),
            StoreError::ExtensionNotAllowed(name) => write!(f, "Extension not allowed: {}", name),
            StoreError::PayloadTooLarge(limit) => {
                write!(f, "Payload exceeds limit of {} bytes", limit)
            }
            StoreError::NoFile => write!(f, "No file supplied"),
            StoreError::NotFound => write!(f, "Not found"),
            StoreError::InvalidName(name) => write!(f, "Invalid filename: {}", name),
            StoreError::NoIds => write!(f, "No ids supplied"),
            StoreError::ConfirmationRequired => write!(f, "Confirmation required"),
            StoreError::DuplicateKey(key) => write!(f, "Duplicate key: {}", key),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}
