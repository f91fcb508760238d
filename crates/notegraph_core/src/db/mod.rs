//! SQLite bootstrap for the durable index backend.
//!
//! # Responsibility
//! - Open index files (or in-memory databases) with cascading foreign keys.
//! - Bring the notes, tags and links schema to the latest version.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - `SqliteIndexStore` only ever sees a connection that passed both steps.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// `PRAGMA foreign_keys` did not stick; purge cascades would silently
    /// leave memberships and edges behind.
    ForeignKeysUnavailable,
    /// One schema step failed; nothing from the pending batch was applied.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::ForeignKeysUnavailable => {
                write!(f, "sqlite connection refused to enable foreign keys")
            }
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "index migration {version} ({name}) failed: {source}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "index schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::ForeignKeysUnavailable | Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
