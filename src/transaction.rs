//! Scoped transactions over the store's transaction primitives.

use crate::connection::Connection;
use crate::error::Result;
use tracing::{debug, warn};

/// One transaction scope.
///
/// Opening a scope while the connection is already inside a transaction
/// yields an inert scope: the outer scope owns the transaction and this
/// one's commit/rollback do nothing. Only the first of commit/rollback takes
/// effect. A scope dropped while still open is rolled back.
pub struct Transaction<'c> {
    connection: &'c dyn Connection,
    started: bool,
    committed: bool,
    rolled_back: bool,
}

impl<'c> Transaction<'c> {
    pub fn begin(connection: &'c dyn Connection) -> Result<Self> {
        let started = if connection.is_transaction_active() {
            debug!("transaction already active, nested scope is inert");
            false
        } else {
            connection.begin_transaction()?;
            true
        };
        Ok(Self {
            connection,
            started,
            committed: false,
            rolled_back: false,
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.is_active() {
            self.connection.commit_transaction()?;
            self.committed = true;
        }
        Ok(())
    }

    /// Marks the scope rolled back only once the store confirms it; after a
    /// failure the scope stays active and is rolled back again on drop.
    pub fn rollback(&mut self) -> Result<()> {
        if self.is_active() {
            if let Err(error) = self.connection.rollback_transaction() {
                warn!(
                    %error,
                    still_active = self.connection.is_transaction_active(),
                    "transaction rollback failed"
                );
                return Err(error);
            }
            self.rolled_back = true;
        }
        Ok(())
    }

    /// Whether this scope actually began a transaction.
    pub const fn is_started(&self) -> bool {
        self.started
    }

    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    pub const fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    pub const fn is_active(&self) -> bool {
        self.started && !self.committed && !self.rolled_back
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(error) = self.rollback() {
                warn!(%error, "implicit rollback of abandoned transaction failed");
            }
        }
    }
}
