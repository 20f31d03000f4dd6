//! Connection traits
//!
//! The loader only needs a narrow slice of a database driver: open one
//! transaction per connection, execute statements and read back one count
//! inside it. Backends implement these traits; tests substitute an in-memory
//! double.

use async_trait::async_trait;

use crate::error::Result;

/// A dedicated database connection, owned by one worker
#[async_trait]
pub trait Connection: Send + Sync {
    /// Begin a transaction on this connection
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// An open transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement, returns affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query whose first column of the first row is a count
    async fn query_count(&self, sql: &str) -> Result<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens connections, one per call
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Human-readable description of where connections go, without secrets
    fn describe(&self) -> String {
        String::from("database")
    }
}
