//! SQLite-based habit storage.
//!
//! Provides persistent storage for:
//! - Habit definitions and their cached streak
//! - The per-day record ledger
//! - The append-only audit trail
//!
//! The writer connection sits behind a mutex and runs every mutation inside
//! an IMMEDIATE transaction, so a second process holding the write lock
//! surfaces as [`DatabaseError::Locked`] once the busy timeout expires.
//!
//! File-backed stores serve reads from an r2d2 pool of read-only WAL
//! connections. A reader sees the last committed snapshot and never waits
//! for an open write transaction.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use super::config::StorageConfig;
use super::{data_dir, migrations};
use crate::error::{DatabaseError, HabitError};

/// SQLite database for habits, records and audit entries.
pub struct HabitDb {
    writer: Mutex<Connection>,
    /// `None` for in-memory stores, whose data only the writer can see.
    readers: Option<Pool<SqliteConnectionManager>>,
    path: Option<PathBuf>,
}

impl HabitDb {
    /// Open the database at `~/.config/habitroom/habitroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: &StorageConfig) -> Result<Self, HabitError> {
        let path = data_dir()?.join("habitroom.db");
        Ok(Self::open_at(&path, config)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path, config: &StorageConfig) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let mut db = Self::init(conn, Some(path.to_path_buf()), config)?;
        db.readers = Some(reader_pool(path, config)?);
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|source| DatabaseError::OpenFailed {
                path: PathBuf::from(":memory:"),
                source,
            })?;
        Self::init(conn, None, &StorageConfig::default())
    }

    fn init(conn: Connection, path: Option<PathBuf>, config: &StorageConfig) -> Result<Self, DatabaseError> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        tracing::debug!(path = ?path, "habit database ready");
        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
            path,
        })
    }

    /// File backing the database; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.writer
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("Failed to lock connection".into()))
    }

    /// Run `f` against the last committed state.
    ///
    /// File-backed stores hand `f` a pooled read-only connection, so reads
    /// proceed while a write transaction is open.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match &self.readers {
            Some(pool) => {
                let conn = pool.get().map_err(DatabaseError::from)?;
                f(&conn)
            }
            None => {
                let conn = self.lock()?;
                f(&conn)
            }
        }
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls every write back.
    pub fn write<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(out)
    }
}

fn reader_pool(
    path: &Path,
    config: &StorageConfig,
) -> Result<Pool<SqliteConnectionManager>, DatabaseError> {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .with_init(move |conn| conn.busy_timeout(busy_timeout));
    let pool = Pool::builder()
        .max_size(config.read_connections.max(1))
        .build(manager)?;
    Ok(pool)
}

impl std::fmt::Debug for HabitDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HabitDb")
            .field("path", &self.path)
            .field("readers", &self.readers.as_ref().map(|pool| pool.max_size()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};
    use std::thread;

    use super::*;
    use crate::storage::ledger::HabitRepository;

    const INSERT_HABIT: &str =
        "INSERT INTO habits (id, owner_id, name, habit_type, periodicity, creation_date, created_at)
         VALUES ('h', 'me', 'Read', 'CHECK', 'DAILY', '2024-01-01', '2024-01-01T00:00:00+00:00')";

    #[test]
    fn failed_write_rolls_back() {
        let db = HabitDb::open_memory().unwrap();
        let result: Result<(), DatabaseError> = db.write(|tx| {
            tx.execute(INSERT_HABIT, [])?;
            Err(DatabaseError::QueryFailed("abort".into()))
        });
        assert!(result.is_err());

        let habits = db.read(|conn| conn.list_habits(None)).unwrap();
        assert!(habits.is_empty());
    }

    #[test]
    fn file_database_reopens_with_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("habitroom.db");
        {
            let db = HabitDb::open_at(&path, &StorageConfig::default()).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
        }
        let db = HabitDb::open_at(&path, &StorageConfig::default()).unwrap();
        let version = db
            .read(|conn| migrations::get_schema_version(conn).map_err(DatabaseError::from))
            .unwrap();
        assert_eq!(version, migrations::SCHEMA_VERSION);
    }

    #[test]
    fn reads_see_committed_state_while_write_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("habitroom.db");
        let db = Arc::new(HabitDb::open_at(&path, &StorageConfig::default()).unwrap());
        let (started_tx, started_rx) = mpsc::channel();
        let (read_done_tx, read_done_rx) = mpsc::channel();

        let writer = {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                db.write(|tx| -> Result<bool, DatabaseError> {
                    tx.execute(INSERT_HABIT, [])?;
                    started_tx.send(()).unwrap();
                    // Hold the transaction open until the reader reports back.
                    Ok(read_done_rx.recv_timeout(Duration::from_secs(5)).is_ok())
                })
                .unwrap()
            })
        };

        started_rx.recv().unwrap();
        let habits = db.read(|conn| conn.list_habits(None)).unwrap();
        assert!(habits.is_empty(), "uncommitted habit must not be visible");
        read_done_tx.send(()).unwrap();

        assert!(writer.join().unwrap(), "read waited for the writer to commit");
        assert_eq!(db.read(|conn| conn.list_habits(None)).unwrap().len(), 1);
    }

    #[test]
    fn reader_connections_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("habitroom.db");
        let db = HabitDb::open_at(&path, &StorageConfig::default()).unwrap();
        let result = db.read(|conn| conn.execute(INSERT_HABIT, []).map_err(DatabaseError::from));
        assert!(result.is_err());
        assert!(db.read(|conn| conn.list_habits(None)).unwrap().is_empty());
    }
}
