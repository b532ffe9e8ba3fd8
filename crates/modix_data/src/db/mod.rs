//! SQLite store bootstrap, shared session and transactions.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the data layer.
//! - Apply schema migrations in deterministic order.
//! - Share one connection between repositories through `StoreSession`.
//! - Serialize explicit transactions against bare round-trips on a session.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories never touch a connection before migrations succeed.
//! - At most one `StoreTransaction` is live per session.

use thiserror::Error;

pub mod migrations;
mod open;
mod scope;
mod session;
mod transaction;

pub use open::{open_store, open_store_from_config, open_store_in_memory};
pub(crate) use scope::StoreScope;
pub use session::StoreSession;
pub use transaction::StoreTransaction;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("store session is closed")]
    SessionClosed,
}
