//! Persistent (copy-on-write) ordered collections used for every indexed
//! structure in a snapshot.

pub mod cursor;
pub mod pmap;

pub use cursor::{Cursor, Iter};
pub use pmap::PMap;
