pub mod buffer;
pub mod codec;
pub mod log_file;
pub mod record;

pub use buffer::CommitBuffer;
pub use log_file::{LOG_EXTENSION, LOG_HEADER_LEN, LogCursor, LogFile, LogWriter};
pub use record::{LogEntry, Origin, decode_entry, decode_object, encode_object};
