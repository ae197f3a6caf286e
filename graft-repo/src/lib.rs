#![warn(missing_docs)]

//! The versioning core of the graft store.
//!
//! Every update to a key writes an immutable [`UCell`] chunk (the commit)
//! whose digest is the version. Cells link to up to two parent versions,
//! forming a DAG per key; branches are mutable named pointers into that DAG
//! kept by [`HeadVersion`] and updated through a [`Worker`]. Values are
//! structured objects ([`UBlob`], [`UString`], [`UList`], [`UMap`],
//! [`USet`]) represented as prolly trees, so equal values share structure
//! and converge on equal data roots.
//!
//! ```rust
//! # async fn example() -> Result<(), graft_repo::RepositoryError> {
//! use graft_repo::{UBlob, Value, Worker};
//! use graft_storage::MemoryChunkStore;
//!
//! let store = MemoryChunkStore::default();
//! let mut worker = Worker::new(1, store.clone());
//!
//! let version = worker
//!     .put(b"greeting", &Value::blob(&b"hello"[..]), "master")
//!     .await?;
//!
//! let cell = worker.get_version(b"greeting", &version).await?;
//! let blob = UBlob::load(cell.data_root(), store).await?;
//! assert_eq!(blob.read(0, 5).await?, b"hello");
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod cell;
pub use cell::*;

mod value;
pub use value::*;

mod types;
pub use types::*;

mod head;
pub use head::*;

mod merge;

mod worker;
pub use worker::*;
