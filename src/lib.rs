pub mod catalog;
pub mod commit;
pub mod config;
pub mod error;
pub mod offline;
pub mod recovery;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod wal;

pub use catalog::types::{DataType, Value};
pub use catalog::uid::Uid;
pub use catalog::{DbObject, Field, RowImage};
pub use commit::{CommitResult, Transaction};
pub use config::{DbConfig, DurabilityMode, RecoveryMode};
pub use error::{SnapError, SnapErrorCode};
pub use registry::{AutoCommit, Registry};
pub use snapshot::Snapshot;
