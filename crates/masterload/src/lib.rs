//! # masterload
//!
//! Transactional bulk refresh of relational tables from YAML/JSON document sets.
//!
//! Each target is a document file or a directory of document files. Its table
//! is purged and re-filled from the documents in one transaction, and the
//! auto-increment counter is reset to the loaded row count. Many targets run
//! concurrently; one failing target never affects the others.
//!
//! ## Features
//!
//! - **Source resolution**: file or recursive directory sources, table name
//!   from the base name
//! - **Row compilation**: string, number and null fields to SQL literals
//! - **Batched inserts**: multi-row `INSERT` statements of bounded size
//! - **Atomic loads**: purge, insert, count, reset and commit, or roll back
//! - **Concurrent dispatch**: one worker and one connection per target
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use masterload::prelude::*;
//! use std::sync::Arc;
//!
//! let options = ConnectionOptions::new("master").with_host("127.0.0.1");
//! let factory = Arc::new(MySqlConnectionFactory::new(&options)?);
//! let dispatcher = Dispatcher::new(factory, LoadConfig::default());
//!
//! let mut dispatch = dispatcher.dispatch_paths(&["fixtures/users.yml", "fixtures/items"]);
//! while let Some(outcome) = dispatch.next_outcome().await {
//!     println!("{}", outcome.report_line());
//! }
//! let summary = dispatch.finished().await?;
//! println!("{}", summary.completion_line());
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` (default) - MySQL/MariaDB backend via mysql_async

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod options;
pub mod query;
pub mod row;
pub mod source;
pub mod types;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Document model and decoding
    pub use crate::decode::{decoder_for, DocumentDecoder, JsonDecoder, YamlDecoder};
    pub use crate::types::{ColumnOrder, Document, FieldValue, ValueKind};

    // Pipeline
    pub use crate::query::{LoadPlan, QueryBuilder, DEFAULT_BATCH_SIZE};
    pub use crate::row::{compile_row, compile_rows, Row};
    pub use crate::source::{discover_targets, Discovery, Target};

    // Configuration
    pub use crate::config::{FileConfig, LoadConfig, PurgeMode};
    pub use crate::options::{Address, ConnectionOptions};

    // Execution
    pub use crate::connection::{Connection, ConnectionFactory, Transaction};
    pub use crate::dispatcher::{Dispatch, DispatchSummary, Dispatcher, LoadOutcome, LoadStatus};
    pub use crate::loader::{LoadReport, LoadState, TransactionalLoader};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlConnectionFactory;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
