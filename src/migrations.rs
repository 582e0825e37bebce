//! Schema migrations for the contacts database.
//!
//! Numbered SQL files are embedded at compile time via `include_str!` and
//! applied in order. Each runs exactly once, tracked by `schema_version`.

use rusqlite::Connection;

use crate::db::DbError;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

fn ensure_schema_version_table(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| DbError::Migration(format!("Failed to create schema_version table: {e}")))
}

/// Highest applied migration version, or 0 on a fresh database.
fn current_version(conn: &Connection) -> Result<i32, DbError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| DbError::Migration(format!("Failed to read schema version: {e}")))
}

/// Run all pending migrations and return how many were applied.
///
/// A database stamped with a version newer than any known migration is
/// refused rather than opened, so an older binary never writes rows the
/// newer schema doesn't expect.
pub fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(DbError::Migration(format!(
            "Database schema version ({current}) is newer than this build supports ({max_known}). \
             Upgrade identity-reconciler before opening this database."
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    for migration in &pending {
        conn.execute_batch(migration.sql).map_err(|e| {
            DbError::Migration(format!("Migration v{} failed: {e}", migration.version))
        })?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| {
            DbError::Migration(format!(
                "Failed to record migration v{}: {e}",
                migration.version
            ))
        })?;
        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}
