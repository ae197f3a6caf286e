use graft_prolly_tree::GraftProllyTreeError;
use graft_storage::GraftStorageError;
use thiserror::Error;

/// The flat error enumeration every public repository operation returns.
///
/// Failed operations leave all repository state untouched: head tables are
/// only updated after the chunks they point at are durable, and orphan
/// chunks written by an aborted operation are inert.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The requested operation is not recognized
    #[error("Unknown operation")]
    UnknownOp,

    /// An I/O fault while reading or writing repository state
    #[error("I/O fault: {0}")]
    IoFault(String),

    /// A malformed or unusable file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A range that does not fit the addressed value
    #[error("Invalid range")]
    InvalidRange,

    /// The branch to be created already exists
    #[error("Branch already exists")]
    BranchExists,

    /// The named branch does not exist
    #[error("Branch does not exist")]
    BranchNotExists,

    /// A version referred to by the operation does not exist
    #[error("Referring version does not exist")]
    ReferringVersionNotExist,

    /// No cell is stored under the given version
    #[error("Cell does not exist")]
    UCellNotExists,

    /// A data chunk is missing from the store
    #[error("Chunk does not exist")]
    ChunkNotExists,

    /// The value type is not supported by this operation
    #[error("Type not supported")]
    TypeUnsupported,

    /// A blob value could not be created
    #[error("Failed to create blob")]
    FailedCreateBlob,

    /// A string value could not be created
    #[error("Failed to create string")]
    FailedCreateString,

    /// A list value could not be created
    #[error("Failed to create list")]
    FailedCreateList,

    /// A map value could not be created
    #[error("Failed to create map")]
    FailedCreateMap,

    /// A set value could not be created
    #[error("Failed to create set")]
    FailedCreateSet,

    /// A commit cell could not be created
    #[error("Failed to create cell")]
    FailedCreateUCell,

    /// A cell was addressed through a key it does not belong to
    #[error("Inconsistent key")]
    InconsistentKey,

    /// A merge conflict could not be resolved without an explicit value
    #[error("Invalid value")]
    InvalidValue,

    /// A blob value could not be modified
    #[error("Failed to modify blob")]
    FailedModifyBlob,

    /// A list value could not be modified
    #[error("Failed to modify list")]
    FailedModifyList,

    /// A map value could not be modified
    #[error("Failed to modify map")]
    FailedModifyMap,

    /// A set value could not be modified
    #[error("Failed to modify set")]
    FailedModifySet,

    /// An element index beyond the value's bounds
    #[error("Index out of range")]
    IndexOutOfRange,

    /// The operation does not apply to values of this type
    #[error("Type mismatch")]
    TypeMismatch,

    /// The addressed key does not exist
    #[error("Key does not exist")]
    KeyNotExists,

    /// The addressed key already exists
    #[error("Key already exists")]
    KeyExists,

    /// The addressed map key does not exist
    #[error("Map key does not exist")]
    MapKeyNotExists,

    /// The addressed map key already exists
    #[error("Map key already exists")]
    MapKeyExists,

    /// The element is already present in the set
    #[error("Element already exists")]
    ElementExists,

    /// A malformed parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A value did not match the expected schema
    #[error("Invalid schema")]
    InvalidSchema,

    /// The value type disagrees with the stored value's type
    #[error("Inconsistent type")]
    InconsistentType,

    /// An error bubbled up from chunk storage
    #[error("Storage error: {0}")]
    Storage(#[from] GraftStorageError),

    /// An error bubbled up from the tree engine
    #[error("Tree error: {0}")]
    Tree(#[from] GraftProllyTreeError),
}
