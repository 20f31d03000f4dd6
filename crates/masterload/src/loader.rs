//! Transactional loader
//!
//! Executes one compiled [`LoadPlan`] on a dedicated connection:
//!
//! ```text
//! Idle -> Opened -> Began -> Truncated -> Inserted -> Counted -> Reset -> Committed
//!   \________\_________\_________\__________\__________\________\-> Failed
//! ```
//!
//! Any failure after `Began` rolls the transaction back. The connection is
//! closed exactly once on every exit path after `Opened`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionFactory, Transaction};
use crate::error::Result;
use crate::query::LoadPlan;

/// Loader progress through the load protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Nothing done yet
    Idle,
    /// Connection acquired
    Opened,
    /// Transaction started
    Began,
    /// Existing rows purged
    Truncated,
    /// Every insert batch executed
    Inserted,
    /// Row count read back
    Counted,
    /// Auto-increment counter reset (or reset disabled)
    Reset,
    /// Transaction committed
    Committed,
    /// Terminal failure
    Failed,
}

impl LoadState {
    /// Whether the loader can make no further progress
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Opened => "opened",
            Self::Began => "began",
            Self::Truncated => "truncated",
            Self::Inserted => "inserted",
            Self::Counted => "counted",
            Self::Reset => "reset",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a committed load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Refreshed table
    pub table: String,
    /// Rows compiled from the documents
    pub rows: usize,
    /// INSERT statements executed
    pub batches: usize,
    /// Row count read back inside the transaction
    pub count: u64,
    /// Whether the auto-increment counter was reset
    pub sequence_reset: bool,
    /// Wall time from connect to close
    pub elapsed: Duration,
}

/// Runs the load protocol for one target
pub struct TransactionalLoader {
    factory: Arc<dyn ConnectionFactory>,
    state: LoadState,
}

impl TransactionalLoader {
    /// Create a loader that opens its connection from `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            state: LoadState::Idle,
        }
    }

    /// Last state reached
    pub fn state(&self) -> LoadState {
        self.state
    }

    fn advance(&mut self, table: &str, next: LoadState) {
        debug!(table = %table, from = %self.state, to = %next, "Load state transition");
        self.state = next;
    }

    /// Execute `plan` atomically
    pub async fn run(&mut self, plan: &LoadPlan) -> Result<LoadReport> {
        let started = Instant::now();
        self.state = LoadState::Idle;

        let conn = match self.factory.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.state = LoadState::Failed;
                return Err(e);
            }
        };
        self.advance(&plan.table, LoadState::Opened);

        let result = self.run_on(&*conn, plan).await;

        if let Err(e) = conn.close().await {
            warn!(table = %plan.table, error = %e, "Failed to close connection");
        }

        match result {
            Ok(count) => {
                let report = LoadReport {
                    table: plan.table.clone(),
                    rows: plan.row_count,
                    batches: plan.inserts.len(),
                    count,
                    sequence_reset: plan.reset_sequence,
                    elapsed: started.elapsed(),
                };
                info!(
                    table = %report.table,
                    rows = report.count,
                    batches = report.batches,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Load committed"
                );
                Ok(report)
            }
            Err(e) => {
                self.state = LoadState::Failed;
                Err(e)
            }
        }
    }

    async fn run_on(&mut self, conn: &dyn Connection, plan: &LoadPlan) -> Result<u64> {
        let tx = conn.begin().await?;
        self.advance(&plan.table, LoadState::Began);

        match self.run_in_transaction(&*tx, plan).await {
            Ok(count) => {
                tx.commit().await?;
                self.advance(&plan.table, LoadState::Committed);
                Ok(count)
            }
            Err(e) => {
                warn!(
                    table = %plan.table,
                    state = %self.state,
                    error = %e,
                    "Load failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    error!(table = %plan.table, error = %rollback_err, "Rollback failed after load error");
                }
                Err(e)
            }
        }
    }

    async fn run_in_transaction(&mut self, tx: &dyn Transaction, plan: &LoadPlan) -> Result<u64> {
        let purged = tx.execute(&plan.purge).await?;
        debug!(table = %plan.table, rows = purged, "Purged existing rows");
        self.advance(&plan.table, LoadState::Truncated);

        for (batch, sql) in plan.inserts.iter().enumerate() {
            let inserted = tx.execute(sql).await?;
            debug!(table = %plan.table, batch, rows = inserted, "Inserted batch");
        }
        self.advance(&plan.table, LoadState::Inserted);

        let count = tx.query_count(&plan.count).await?;
        self.advance(&plan.table, LoadState::Counted);

        if let Some(sql) = plan.reset_sequence_sql(count) {
            tx.execute(&sql).await?;
            debug!(table = %plan.table, next = count, "Reset auto-increment");
        }
        self.advance(&plan.table, LoadState::Reset);

        Ok(count)
    }
}
