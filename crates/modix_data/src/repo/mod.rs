//! Repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep SQL and row mapping inside the persistence boundary.
//!
//! # Invariants
//! - Creation payloads are validated before the first store call.
//! - Multi-row writes run in a fixed order: insert the row whose id the store
//!   generates, then the rows referencing it, then patch back-links.
//! - Stored enumeration text is parsed through `FromStr` only.

use thiserror::Error;

use crate::db::DbError;
use crate::events::NotifyError;
use crate::model::moderation::CreationDataError;
use crate::model::UnknownEnumerationText;

pub mod deleted_message_repo;
pub mod guild_repo;
pub mod moderation_action_repo;
pub mod promotion_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Stage of a repository call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Rejected before anything was written.
    Validate,
    /// A store round-trip failed.
    Store,
    /// Writes are committed; an observer failed afterwards.
    Notify,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CreationDataError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid persisted data: {0}")]
    InvalidData(#[from] UnknownEnumerationText),
    #[error("promotion campaign {0} is already closed")]
    CampaignClosed(i64),
    #[error("moderation action {moderation_action_id} was stored but notifying observers failed: {source}")]
    Notify {
        moderation_action_id: i64,
        #[source]
        source: NotifyError,
    },
}

impl RepoError {
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Self::InvalidArgument(_) | Self::CampaignClosed(_) => ErrorPhase::Validate,
            Self::Notify { .. } => ErrorPhase::Notify,
            Self::Db(_) | Self::NotFound { .. } | Self::InvalidData(_) => ErrorPhase::Store,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
