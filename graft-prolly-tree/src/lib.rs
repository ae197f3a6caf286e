#![warn(missing_docs)]

//! A content-defined, history-independent prolly tree engine over
//! content-addressed chunk storage.
//!
//! Every structured value (blob, list, map, set) is represented as a tree of
//! immutable chunks. Chunk boundaries are chosen by a rolling hash over
//! entry bytes, so a tree's shape, and therefore its root digest, is a
//! pure function of its leaf sequence, no matter what sequence of edits
//! produced it. Edits are splices run through [`NodeBuilder`]; batches of
//! splices go through [`AdvancedNodeBuilder`], which persists only chunks
//! reachable from the final root.
//!
//! ```rust
//! # async fn example() -> Result<(), graft_prolly_tree::GraftProllyTreeError> {
//! use graft_prolly_tree::{AdvancedNodeBuilder, Chunker, Segment};
//! use graft_storage::MemoryChunkStore;
//!
//! let store = MemoryChunkStore::default();
//!
//! // Build a blob, then edit it; equal content always converges on one root.
//! let root = AdvancedNodeBuilder::fresh(&store, &store)
//!     .insert(0, vec![Segment::fixed(&b"hello trees"[..])])
//!     .commit(Chunker::Blob)
//!     .await?;
//!
//! let edited = AdvancedNodeBuilder::from_root(root, &store, &store)
//!     .splice(6, 5, vec![Segment::fixed(&b"prolly trees"[..])])
//!     .commit(Chunker::Blob)
//!     .await?;
//! # let _ = edited;
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod key;
pub use key::*;

pub mod entry;
pub use entry::{FRAME_PREFIX_SIZE, MetaEntry};

mod rolling;
pub use rolling::*;

mod segment;
pub use segment::*;

mod node;
pub use node::*;

mod chunker;
pub use chunker::*;

mod cursor;
pub use cursor::*;

mod builder;
pub use builder::*;

mod transaction;
pub use transaction::*;

mod diff;
pub use diff::*;
