//! Routing of repository round-trips to a bare session or a live transaction.

use super::session::StoreSession;
use super::transaction::StoreTransaction;
use rusqlite::Connection;

/// Where one repository call runs.
///
/// `Session` round-trips commit individually and wait while a transaction is
/// live. `Transaction` round-trips become part of that transaction.
pub(crate) enum StoreScope<'a> {
    Session(&'a StoreSession),
    Transaction(&'a mut StoreTransaction),
}

impl StoreScope<'_> {
    pub(crate) async fn with_connection<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
    {
        match self {
            Self::Session(session) => session.with_connection(f).await,
            Self::Transaction(tx) => tx.with_connection(f).await,
        }
    }

    pub(crate) fn in_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}
