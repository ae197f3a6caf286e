#![warn(missing_docs)]

//! Content-addressed chunk storage for the graft versioned store.
//!
//! A [`Chunk`] is an immutable, typed byte buffer addressed by the
//! [`graft_common::Digest`] of its type tag and body. A [`ChunkStore`] keeps
//! chunks by digest with idempotent writes; [`ChunkLoader`] and
//! [`ChunkWriter`] are the narrow facets that tree machinery borrows during
//! an edit.
//!
//! ```rust
//! # async fn example() -> Result<(), graft_storage::GraftStorageError> {
//! use graft_common::Bytes;
//! use graft_storage::{Chunk, ChunkStore, ChunkType, MemoryChunkStore};
//!
//! let store = MemoryChunkStore::default();
//! let chunk = Chunk::new(ChunkType::Blob, Bytes::from(&b"some bytes"[..]));
//! let digest = chunk.digest();
//!
//! store.put(&digest, &chunk).await?;
//! assert!(store.exists(&digest).await?);
//! # Ok(())
//! # }
//! ```

mod chunk;
pub use chunk::*;

mod error;
pub use error::*;

mod store;
pub use store::*;

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;
