pub mod conflict;
pub mod executor;
pub mod fixup;
pub mod tx;

pub use executor::{CommitResult, commit};
pub use fixup::FixupMap;
pub use tx::Transaction;
