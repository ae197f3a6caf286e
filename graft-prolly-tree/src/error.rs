use graft_storage::GraftStorageError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum GraftProllyTreeError {
    /// There was an attempt to access the tree in an incorrect way
    #[error("Incorrect tree access: {0}")]
    IncorrectTreeAccess(String),

    /// The tree as constructed is not valid
    #[error("Invalid tree construction: {0}")]
    InvalidConstruction(String),

    /// There was a problem when accessing storage
    #[error("Storage error: {0}")]
    Storage(#[from] GraftStorageError),

    /// A required chunk is missing from storage
    #[error("Chunk not found in storage: {0}")]
    MissingChunk(String),

    /// A chunk body did not decode as the node it claims to be
    #[error("Malformed node: {0}")]
    MalformedNode(String),

    /// The tree did not match the expected shape
    #[error("Tree did not match expected shape: {0}")]
    UnexpectedTreeShape(String),
}
