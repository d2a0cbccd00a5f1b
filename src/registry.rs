use crate::catalog::uid::Uid;
use crate::catalog::{DbObject, RowImage};
use crate::commit::executor::{self, CommitResult};
use crate::commit::tx::Transaction;
use crate::config::{DbConfig, validate_config};
use crate::error::{ResourceType, SnapError};
use crate::recovery::replay;
use crate::snapshot::{Resolver, RowSource, Snapshot};
use crate::wal::{LOG_EXTENSION, LogFile};
use compact_str::CompactString;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_NAME_LEN: usize = 128;

#[derive(Default)]
struct RegistryState {
    logs: HashMap<CompactString, Arc<LogFile>>,
    databases: HashMap<CompactString, Arc<Snapshot>>,
    loading: HashSet<CompactString>,
}

/// Outcome of [`Registry::maybe_auto_commit`].
#[derive(Debug)]
pub enum AutoCommit {
    Committed(CommitResult),
    /// The transaction was not marked auto-commit and is handed back as is.
    Pending(Transaction),
}

/// Every open database of one directory: its log, its published snapshot,
/// and the names currently being replayed.
///
/// Lock order is a log's writer lock, then the registry state, then the log's
/// file handle.
pub struct Registry {
    dir: PathBuf,
    config: DbConfig,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(dir: &Path, config: DbConfig) -> Result<Self, SnapError> {
        validate_config(&config)?;
        create_private_dir_all(dir)?;
        info!(
            dir = %dir.display(),
            durability_mode = ?config.durability_mode,
            recovery_mode = ?config.recovery_mode,
            page_size = config.page_size,
            max_record_bytes = config.max_record_bytes,
            "registry: created"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            state: Mutex::new(RegistryState::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOG_EXTENSION}"))
    }

    /// Opens database `name`, replaying its log on first use.
    ///
    /// Replay runs without the registry lock held; a second caller opening
    /// the same name meanwhile gets `ConcurrentLoad`.
    pub fn open(&self, name: &str) -> Result<Arc<Snapshot>, SnapError> {
        validate_name(name)?;
        {
            let mut state = self.state.lock();
            if let Some(snapshot) = state.databases.get(name) {
                return Ok(Arc::clone(snapshot));
            }
            if !state.loading.insert(CompactString::from(name)) {
                return Err(SnapError::ConcurrentLoad {
                    name: name.to_string(),
                });
            }
        }

        struct LoadingGuard<'a> {
            state: &'a Mutex<RegistryState>,
            name: &'a str,
        }
        impl Drop for LoadingGuard<'_> {
            fn drop(&mut self) {
                self.state.lock().loading.remove(self.name);
            }
        }
        let _loading = LoadingGuard {
            state: &self.state,
            name,
        };

        let path = self.path_for(name);
        let log = Arc::new(LogFile::open(&path, &self.config)?);
        let outcome = replay(name, &log, self.config.recovery_mode)?;
        if let Some(offset) = outcome.torn_at {
            warn!(
                database = name,
                offset,
                dropped = log.len() - offset,
                "registry: truncating torn log tail"
            );
            log.lock_writer().truncate(offset)?;
        }
        let snapshot = Arc::new(outcome.snapshot);

        let mut state = self.state.lock();
        state.logs.insert(CompactString::from(name), Arc::clone(&log));
        state
            .databases
            .insert(CompactString::from(name), Arc::clone(&snapshot));
        info!(
            database = name,
            records = outcome.records,
            commits = outcome.commits,
            bytes = log.len(),
            "registry: opened"
        );
        Ok(snapshot)
    }

    /// The most recently published snapshot of `name`.
    pub fn snapshot(&self, name: &str) -> Result<Arc<Snapshot>, SnapError> {
        self.state
            .lock()
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| SnapError::not_found(ResourceType::Database, name))
    }

    pub fn begin(&self, name: &str, auto_commit: bool) -> Result<Transaction, SnapError> {
        Ok(Transaction::new(self.snapshot(name)?, auto_commit))
    }

    /// Commits `tx` and publishes the resulting snapshot. A rejected
    /// transaction is dropped; start again from [`Registry::begin`].
    ///
    /// ```compile_fail
    /// # use snapdb::{DbConfig, Registry};
    /// # let dir = std::env::temp_dir().join("snapdb-commit-once");
    /// # let registry = Registry::new(&dir, DbConfig::default()).unwrap();
    /// # registry.open("db").unwrap();
    /// let mut tx = registry.begin("db", false).unwrap();
    /// tx.create_table("T").unwrap();
    /// registry.commit(tx).unwrap();
    /// registry.commit(tx).unwrap(); // `tx` was moved by the first commit
    /// ```
    pub fn commit(&self, tx: Transaction) -> Result<CommitResult, SnapError> {
        let name = CompactString::from(tx.database());
        let name = name.as_str();
        let objects = tx.len();
        let log = self.log(name)?;
        let writer = log.lock_writer();
        let current = {
            let state = self.state.lock();
            let still_open = state.logs.get(name).is_some_and(|l| Arc::ptr_eq(l, &log));
            match state.databases.get(name) {
                Some(current) if still_open => Arc::clone(current),
                _ => return Err(SnapError::not_found(ResourceType::Database, name)),
            }
        };
        let result = match executor::commit(&writer, &current, tx) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    database = name,
                    objects,
                    error = %err,
                    code = err.code_str(),
                    "registry: commit rejected"
                );
                return Err(err);
            }
        };
        self.state
            .lock()
            .databases
            .insert(CompactString::from(name), Arc::clone(&result.snapshot));
        Ok(result)
    }

    pub fn maybe_auto_commit(&self, tx: Transaction) -> Result<AutoCommit, SnapError> {
        if tx.auto_commit() {
            self.commit(tx).map(AutoCommit::Committed)
        } else {
            Ok(AutoCommit::Pending(tx))
        }
    }

    /// The object with uid `pos`, from the published snapshot or the log.
    pub fn resolve(&self, name: &str, pos: Uid) -> Result<DbObject, SnapError> {
        let (log, snapshot) = self.handles(name)?;
        Resolver::new(&log).resolve(&snapshot, pos)
    }

    /// Current version of the row first inserted at `defpos`.
    pub fn row(&self, name: &str, defpos: Uid) -> Result<RowImage, SnapError> {
        let (log, snapshot) = self.handles(name)?;
        let version = snapshot
            .tables()
            .find_map(|t| t.current_version(defpos))
            .ok_or_else(|| SnapError::not_found(ResourceType::Row, defpos))?;
        Resolver::new(&log).load_row(version)
    }

    /// Current versions of every row of `table`, in defpos order.
    pub fn rows(&self, name: &str, table: Uid) -> Result<Vec<RowImage>, SnapError> {
        let (log, snapshot) = self.handles(name)?;
        let resolver = Resolver::new(&log);
        snapshot
            .table(table)?
            .rows
            .values()
            .map(|version| resolver.load_row(*version))
            .collect()
    }

    /// Forgets `name`. Waits for any commit in progress on it.
    pub fn close(&self, name: &str) -> Result<(), SnapError> {
        let log = self.log(name)?;
        let _writer = log.lock_writer();
        let mut state = self.state.lock();
        if !state.logs.get(name).is_some_and(|l| Arc::ptr_eq(l, &log)) {
            return Err(SnapError::not_found(ResourceType::Database, name));
        }
        state.logs.remove(name);
        let snapshot = state.databases.remove(name);
        info!(
            database = name,
            bytes = log.len(),
            rows = snapshot.map(|s| s.row_count()).unwrap_or(0),
            "registry: closed"
        );
        Ok(())
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.state.lock().databases.contains_key(name)
    }

    fn log(&self, name: &str) -> Result<Arc<LogFile>, SnapError> {
        self.state
            .lock()
            .logs
            .get(name)
            .cloned()
            .ok_or_else(|| SnapError::not_found(ResourceType::Database, name))
    }

    fn handles(&self, name: &str) -> Result<(Arc<LogFile>, Arc<Snapshot>), SnapError> {
        let state = self.state.lock();
        match (state.logs.get(name), state.databases.get(name)) {
            (Some(log), Some(snapshot)) => Ok((Arc::clone(log), Arc::clone(snapshot))),
            _ => Err(SnapError::not_found(ResourceType::Database, name)),
        }
    }
}

/// Creates `path` readable only by its owner on Unix.
fn create_private_dir_all(path: &Path) -> Result<(), SnapError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(SnapError::Io(std::io::Error::other(format!(
                "not a directory: {}",
                path.display()
            ))));
        }
        let mut perms = metadata.permissions();
        if perms.mode() & 0o777 != 0o700 {
            perms.set_mode(0o700);
            fs::set_permissions(path, perms)?;
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Names become file names, so they are kept to a portable subset.
fn validate_name(name: &str) -> Result<(), SnapError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SnapError::InvalidName {
            name: name.to_string(),
        })
    }
}
