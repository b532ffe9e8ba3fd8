//! Shared store session.
//!
//! # Responsibility
//! - Hand one migrated connection to every repository built on the session.
//! - Serialize explicit transactions against bare round-trips.
//!
//! # Invariants
//! - A bare round-trip holds the connection lock only for its own duration.
//! - A live `StoreTransaction` holds the connection lock until it finishes,
//!   so bare calls never run inside another caller's transaction.

use super::transaction::StoreTransaction;
use super::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Cloneable handle to a migrated connection.
///
/// Clones share the same connection. While a transaction is live, bare calls
/// on any clone wait until it is committed, rolled back or dropped; work
/// meant to be part of the transaction goes through the
/// [`StoreTransaction`] handle. A task holding a transaction must not make
/// bare calls on the same session.
#[derive(Debug, Clone)]
pub struct StoreSession {
    conn: Arc<Mutex<Connection>>,
    transaction_live: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl StoreSession {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            transaction_live: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one store round-trip against the shared connection.
    ///
    /// Waits while a transaction is live. Each statement commits on its own.
    pub async fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
    {
        let mut conn = self.conn.lock().await;
        f(&mut *conn)
    }

    /// Opens an explicit transaction on this session.
    ///
    /// Waits until no other transaction or bare round-trip holds the
    /// connection. Dropping the returned future while waiting abandons the
    /// request without side effects.
    ///
    /// # Errors
    /// - `DbError::SessionClosed` once [`StoreSession::close`] was called,
    ///   including for calls that were already waiting.
    /// - `DbError::Sqlite` when `BEGIN` fails; the connection is released
    ///   again.
    pub async fn begin_transaction(&self) -> DbResult<StoreTransaction> {
        if self.is_closed() {
            return Err(DbError::SessionClosed);
        }

        let started_at = Instant::now();
        let mut conn = Arc::clone(&self.conn).lock_owned().await;
        if self.is_closed() {
            return Err(DbError::SessionClosed);
        }

        conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.transaction_live.store(true, Ordering::SeqCst);

        debug!(
            "event=tx_begin module=db status=ok wait_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(StoreTransaction::new(self.clone(), conn))
    }

    /// Returns whether a transaction from this session is currently live.
    pub fn transaction_active(&self) -> bool {
        self.transaction_live.load(Ordering::SeqCst)
    }

    /// Rejects all pending and future `begin_transaction` calls.
    ///
    /// A transaction that is already live stays usable until it finishes.
    /// Bare round-trips keep working.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("event=session_close module=db status=ok");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(super) fn mark_transaction_finished(&self) {
        self.transaction_live.store(false, Ordering::SeqCst);
    }
}
