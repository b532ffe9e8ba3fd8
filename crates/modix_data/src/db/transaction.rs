//! Explicit transaction handle.
//!
//! # Invariants
//! - A handle finishes exactly once: `commit` and `rollback` consume it.
//! - A handle dropped without finishing rolls back before the connection is
//!   released, so no later caller can write into the abandoned transaction.
//! - The connection lock is released on every exit path.

use super::session::StoreSession;
use super::DbResult;
use log::{debug, error, warn};
use rusqlite::Connection;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

/// Live transaction on a [`StoreSession`].
///
/// Owns the session's connection until it is committed, rolled back or
/// dropped. Statements that belong to the transaction run through
/// [`StoreTransaction::with_connection`].
#[derive(Debug)]
pub struct StoreTransaction {
    session: StoreSession,
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
    opened_at: Instant,
}

impl StoreTransaction {
    pub(super) fn new(session: StoreSession, conn: OwnedMutexGuard<Connection>) -> Self {
        Self {
            session,
            conn,
            finished: false,
            opened_at: Instant::now(),
        }
    }

    /// Session this transaction runs on.
    pub fn session(&self) -> &StoreSession {
        &self.session
    }

    /// Runs one store round-trip inside this transaction.
    pub async fn with_connection<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
    {
        f(&mut *self.conn)
    }

    /// Commits all writes made since `begin_transaction`.
    ///
    /// When `COMMIT` fails the transaction is rolled back before the error
    /// is returned.
    pub async fn commit(mut self) -> DbResult<()> {
        let result = match self.conn.execute_batch("COMMIT;") {
            Ok(()) => Ok(()),
            Err(err) => {
                rollback_open_transaction(&mut *self.conn);
                Err(err)
            }
        };
        self.finish();

        match result {
            Ok(()) => {
                debug!(
                    "event=tx_commit module=db status=ok duration_ms={}",
                    self.opened_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=db status=error duration_ms={} error={}",
                    self.opened_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Discards all writes made since `begin_transaction`.
    pub async fn rollback(mut self) -> DbResult<()> {
        let result = self.conn.execute_batch("ROLLBACK;");
        self.finish();

        debug!(
            "event=tx_rollback module=db status={} duration_ms={}",
            if result.is_ok() { "ok" } else { "error" },
            self.opened_at.elapsed().as_millis()
        );
        result.map_err(Into::into)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.session.mark_transaction_finished();
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!(
            "event=tx_drop module=db status=rollback duration_ms={}",
            self.opened_at.elapsed().as_millis()
        );
        rollback_open_transaction(&mut *self.conn);
        self.finish();
    }
}

fn rollback_open_transaction(conn: &mut Connection) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(err) = conn.execute_batch("ROLLBACK;") {
        error!("event=tx_rollback module=db status=error error={}", err);
    }
}
