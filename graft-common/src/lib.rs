#![warn(missing_docs)]

//! Light weight helpers shared across the other `graft` crates: the content
//! digest type, a bytes newtype with byte-string serialization, and the
//! cross-target `Send`/`Sync` bound aliases used by the async traits.

mod sync;
pub use sync::*;

mod bytes;
pub use bytes::Bytes;

mod digest;
pub use digest::*;
