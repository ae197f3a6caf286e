use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum GraftStorageError {
    /// An error that occurs during chunk decoding
    #[error("Failed to decode a chunk: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// An error that occurs when byte digest verification fails
    #[error("Chunk digest verification failed: {0}")]
    Verification(String),
}
