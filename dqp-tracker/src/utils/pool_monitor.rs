//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log how long a caller waited for a pooled
//! connection and how long it held it. Held time is also how long the
//! database write lock was held, so slow commits show up here first.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;
use dqp_common::{Error, Result};

/// Monitored transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    fn new(tx: Transaction<'static, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis() as u64;
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;

        tx.commit().await.map_err(Error::Database)?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "LONG TRANSACTION - write lock held for extended period"
            );
        } else if held_ms > 1000 {
            tracing::info!(
                caller = self.caller,
                held_ms,
                "Transaction held longer than expected (>1s)"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }

        Ok(())
    }

    /// Connection of the open transaction
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))
    }
}

impl Drop for MonitoredTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let held_ms = self.acquired_at.elapsed().as_millis() as u64;

            // sqlx rolls the transaction back when it is dropped
            if held_ms > 2000 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms,
                    "LONG TRANSACTION DROPPED - rolled back via Drop (error path?)"
                );
            } else {
                tracing::debug!(caller = self.caller, held_ms, "Connection released (drop)");
            }
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
pub async fn begin_monitored(
    pool: &sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction> {
    let start = Instant::now();

    tracing::debug!(caller, "Connection acquisition requested");

    let tx = pool.begin().await.map_err(Error::Database)?;

    let wait_ms = start.elapsed().as_millis() as u64;

    if wait_ms > 1000 {
        tracing::warn!(
            caller,
            wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated (all connections in use)"
        );
    } else if wait_ms > 500 {
        tracing::info!(caller, wait_ms, "Connection acquisition slower than expected (>500ms)");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
