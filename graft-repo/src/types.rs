//! User-facing structured values.
//!
//! Each type is a read view over a data-root digest plus an owned chunk
//! store handle. Edit methods never mutate the receiver: they run a tree
//! transaction and return the data root of the edited value.

mod blob;
pub use blob::*;

mod string;
pub use string::*;

mod list;
pub use list::*;

mod map;
pub use map::*;

mod set;
pub use set::*;
