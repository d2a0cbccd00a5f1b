use crate::catalog::DbObject;
use crate::config::{DbConfig, DurabilityMode};
use crate::error::{FormatError, SnapError};
use crate::wal::codec::ByteSource;
use crate::wal::record::{Origin, decode_object};
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub const LOG_MAGIC: [u8; 4] = *b"SDBL";
pub const LOG_HEADER_LEN: u64 = LOG_MAGIC.len() as u64;
pub const LOG_EXTENSION: &str = "sdblog";

/// One database's append-only log file.
///
/// `length` is the durable end of the log; bytes past it are never read.
/// Appends and truncation go through a [`LogWriter`], which holds the
/// single-writer lock for as long as it lives.
pub struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
    length: AtomicU64,
    writer: Mutex<()>,
    page_size: usize,
    durability: DurabilityMode,
    max_record_bytes: usize,
}

impl LogFile {
    /// Opens `path` for reading and appending, creating it with just the
    /// magic header when it does not exist.
    pub fn open(path: &Path, config: &DbConfig) -> Result<Self, SnapError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(&LOG_MAGIC)?;
            file.sync_all()?;
        }
        Self::from_file(path, file, config)
    }

    /// Opens an existing log without write access.
    pub fn open_read_only(path: &Path, config: &DbConfig) -> Result<Self, SnapError> {
        let file = File::open(path)?;
        Self::from_file(path, file, config)
    }

    fn from_file(path: &Path, mut file: File, config: &DbConfig) -> Result<Self, SnapError> {
        let length = file.metadata()?.len();
        let mut magic = [0u8; 4];
        if length < LOG_HEADER_LEN {
            return Err(SnapError::LogCorruption {
                offset: 0,
                message: format!("file is {length} bytes, shorter than the log header"),
            });
        }
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut magic)?;
        if magic != LOG_MAGIC {
            return Err(SnapError::LogCorruption {
                offset: 0,
                message: "bad log magic".into(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            length: AtomicU64::new(length),
            writer: Mutex::new(()),
            page_size: config.page_size,
            durability: config.durability_mode,
            max_record_bytes: config.max_record_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= LOG_HEADER_LEN
    }

    pub fn max_record_bytes(&self) -> usize {
        self.max_record_bytes
    }

    /// Blocks until no other writer holds the log.
    pub fn lock_writer(&self) -> LogWriter<'_> {
        LogWriter {
            log: self,
            _guard: self.writer.lock(),
        }
    }

    /// Copies bytes starting at `offset` into `buf`, stopping at the durable
    /// end. Returns the number of bytes copied.
    pub fn fill(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let end = self.len();
        if offset >= end {
            return Ok(0);
        }
        let want = buf.len().min((end - offset) as usize);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut got = 0;
        while got < want {
            match file.read(&mut buf[got..want])? {
                0 => break,
                n => got += n,
            }
        }
        Ok(got)
    }

    /// Paged reader positioned at `offset`.
    pub fn cursor(&self, offset: u64) -> LogCursor<'_> {
        LogCursor {
            log: self,
            page: vec![0; self.page_size],
            page_start: 0,
            page_len: 0,
            pos: offset,
            limit: self.len(),
        }
    }

    /// Decodes the object whose tag byte is at `pos`.
    pub fn read_object(&self, pos: u64) -> Result<DbObject, FormatError> {
        let mut cursor = self.cursor(pos);
        decode_object(&mut cursor, Origin::Log, self.max_record_bytes)
    }
}

/// Exclusive write access to a [`LogFile`].
pub struct LogWriter<'a> {
    log: &'a LogFile,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> LogWriter<'a> {
    pub fn log(&self) -> &'a LogFile {
        self.log
    }

    pub fn len(&self) -> u64 {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Writes `bytes` at the end of the log in one call and makes them
    /// visible to readers. A failed write is cut back off the file.
    pub fn append(&self, bytes: &[u8]) -> Result<u64, SnapError> {
        let start = self.log.len();
        let mut file = self.log.file.lock();
        if let Err(err) = write_at(&mut file, start, bytes, self.log.durability) {
            if let Err(cleanup) = file.set_len(start) {
                warn!(
                    path = %self.log.path.display(),
                    offset = start,
                    error = %cleanup,
                    "failed to truncate partial append"
                );
            }
            return Err(err.into());
        }
        let end = start + bytes.len() as u64;
        self.log.length.store(end, Ordering::Release);
        Ok(end)
    }

    /// Discards everything at and after `offset`.
    pub fn truncate(&self, offset: u64) -> Result<(), SnapError> {
        let offset = offset.max(LOG_HEADER_LEN);
        let file = self.log.file.lock();
        file.set_len(offset)?;
        file.sync_all()?;
        self.log.length.store(offset, Ordering::Release);
        Ok(())
    }
}

fn write_at(
    file: &mut File,
    offset: u64,
    bytes: &[u8],
    durability: DurabilityMode,
) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    if durability == DurabilityMode::Full {
        file.sync_data()?;
    }
    Ok(())
}

/// Sequential reader over the durable part of a log, fetching one page at a
/// time. The end is fixed when the cursor is made.
pub struct LogCursor<'a> {
    log: &'a LogFile,
    page: Vec<u8>,
    page_start: u64,
    page_len: usize,
    pos: u64,
    limit: u64,
}

impl LogCursor<'_> {
    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn refill(&mut self) -> Result<(), FormatError> {
        let n = self
            .log
            .fill(self.pos, &mut self.page)
            .map_err(|e| FormatError::Io(e.to_string()))?;
        self.page_start = self.pos;
        self.page_len = n;
        if n == 0 {
            return Err(FormatError::Truncated { offset: self.pos });
        }
        Ok(())
    }

    fn buffered(&self) -> bool {
        self.pos >= self.page_start && self.pos < self.page_start + self.page_len as u64
    }
}

impl ByteSource for LogCursor<'_> {
    fn read_u8(&mut self) -> Result<u8, FormatError> {
        if self.pos >= self.limit {
            return Err(FormatError::Truncated { offset: self.pos });
        }
        if !self.buffered() {
            self.refill()?;
        }
        let b = self.page[(self.pos - self.page_start) as usize];
        self.pos += 1;
        Ok(b)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FormatError> {
        let mut done = 0;
        while done < buf.len() {
            if self.pos >= self.limit {
                return Err(FormatError::Truncated { offset: self.pos });
            }
            if !self.buffered() {
                self.refill()?;
            }
            let at = (self.pos - self.page_start) as usize;
            let n = (self.page_len - at).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&self.page[at..at + n]);
            done += n;
            self.pos += n as u64;
        }
        Ok(())
    }
}
