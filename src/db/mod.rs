//! SQLite-backed contact store.
//!
//! The database lives at `~/.identity-reconciler/contacts.db` unless the
//! configuration names another path. Every unit of work opens its own
//! connection; SQLite's write lock, not an in-process mutex, serializes
//! concurrent reconciliations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

mod contacts;
pub mod types;
pub use types::*;

/// How long a connection waits on another writer before reporting busy.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct ContactDb {
    conn: Connection,
}

impl ContactDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within an immediate (write-locking) transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock before the first read, so the
    /// reads inside `f` cannot go stale before its writes land.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(DbError::Sqlite(e)))?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(E::from(DbError::Sqlite(e)));
                }
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `path` and apply the schema.
    /// Called once at startup; later units of work use [`ContactDb::connect`].
    pub fn open_at(path: &Path, busy_timeout: Duration) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let db = Self::connect(path, busy_timeout)?;

        // WAL lets readers proceed while a reconciliation holds the write lock
        db.conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let applied = crate::migrations::run_migrations(&db.conn)?;
        if applied > 0 {
            log::info!("Contact database at {} migrated ({applied} step(s))", path.display());
        }

        Ok(db)
    }

    /// Open a connection to an already-migrated database.
    pub fn connect(path: &Path, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.identity-reconciler/contacts.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".identity-reconciler").join("contacts.db"))
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("contacts.db");
        let db = ContactDb::open_at(&path, DEFAULT_BUSY_TIMEOUT).expect("open");
        assert!(path.exists());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .expect("contacts table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();

        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.insert_contact(&NewContact::primary(Some("a@a.com".into()), None))?;
            Err(DbError::Migration("boom".into()))
        });
        assert!(result.is_err());
        assert!(db.list_contacts(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = test_db();

        let id = db
            .with_transaction(|tx| {
                tx.insert_contact(&NewContact::primary(Some("a@a.com".into()), None))
                    .map(|c| c.id)
            })
            .expect("commit");
        assert!(db.get_contact(id).unwrap().is_some());
    }

    #[test]
    fn test_second_writer_sees_busy() {
        let path = super::test_utils::test_db_path();
        let first = ContactDb::connect(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        let second = ContactDb::connect(&path, Duration::from_millis(10)).unwrap();

        first.conn_ref().execute_batch("BEGIN IMMEDIATE").unwrap();
        let err = second
            .with_transaction(|_| Ok::<(), DbError>(()))
            .unwrap_err();
        assert!(err.is_busy(), "expected busy, got {err}");
        first.conn_ref().execute_batch("ROLLBACK").unwrap();
    }
}
