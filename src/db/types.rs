//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl DbError {
    /// True when SQLite refused the operation because another connection
    /// holds the write lock. The caller may re-run its unit of work.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Whether a contact is the canonical record of its identity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    /// String label for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }

    /// Parse from SQL string. The schema CHECK constraint only admits the
    /// two labels, so anything else is read as a primary.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "secondary" => LinkPrecedence::Secondary,
            _ => LinkPrecedence::Primary,
        }
    }
}

/// A row from the `contacts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContact {
    pub id: i64,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub linked_id: Option<i64>,
    pub link_precedence: LinkPrecedence,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl DbContact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when both fields equal the given pair exactly (absent == absent).
    pub fn has_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        self.email.as_deref() == email && self.phone_number.as_deref() == phone_number
    }
}

/// Values for a contact that has not been stored yet. The store assigns
/// `id` and the timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<i64>,
}

impl NewContact {
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn secondary(email: Option<String>, phone_number: Option<String>, primary_id: i64) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary_id),
        }
    }
}
