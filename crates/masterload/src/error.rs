//! Error types for masterload
//!
//! Every failure is attached to the target that produced it and surfaces as
//! that target's [`LoadOutcome`](crate::dispatcher::LoadOutcome). Categories
//! group the variants by pipeline stage:
//! - Source resolution (missing paths, empty directories)
//! - Decoding and row compilation
//! - Connection options and connectivity
//! - Statement execution and transaction control

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for masterload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories, one per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Source path resolution and enumeration
    Source,
    /// Document reading and decoding
    Decode,
    /// Row and statement compilation
    Compile,
    /// Connection options
    Configuration,
    /// Connecting to the database
    Connection,
    /// Statement execution
    Query,
    /// Begin, commit or rollback
    Transaction,
    /// Worker bookkeeping
    Internal,
}

impl ErrorCategory {
    /// Whether the failure happened before any database work was attempted
    #[inline]
    pub const fn is_pre_database(self) -> bool {
        matches!(
            self,
            Self::Source | Self::Decode | Self::Compile | Self::Configuration
        )
    }
}

/// Main error type for masterload
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Source path does not exist
    #[error("source not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Directory source holds no document files
    #[error("empty source: {}", path.display())]
    EmptySource { path: PathBuf },

    /// A table name cannot be derived from the source path
    #[error("invalid target: {} does not name a table", path.display())]
    InvalidTarget { path: PathBuf },

    /// A document file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document file is malformed
    #[error("decode error in {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    /// A field holds a value kind with no SQL literal form
    #[error("unexpected value in {table}.{field}: {kind} is not supported")]
    UnsupportedValue {
        table: String,
        field: String,
        kind: String,
    },

    /// Column names could not be acquired
    #[error("column names can not be acquired: {table}")]
    NoColumns { table: String },

    /// Connection options are insufficient to build a connection URL
    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    /// Connecting to the database failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query { message: String, sql: Option<String> },

    /// Transaction control failed
    #[error("transaction error: {message}")]
    Transaction { message: String },

    /// Worker task failed outside the pipeline
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::EmptySource { .. } | Self::InvalidTarget { .. } => {
                ErrorCategory::Source
            }
            Self::Io { .. } | Self::Decode { .. } => ErrorCategory::Decode,
            Self::UnsupportedValue { .. } | Self::NoColumns { .. } => ErrorCategory::Compile,
            Self::InvalidOptions { .. } => ErrorCategory::Configuration,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// The SQL text that failed, if the error came from statement execution
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }

    /// Create a not-found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a decode error
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-options error
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Decode => write!(f, "decode"),
            Self::Compile => write!(f, "compile"),
            Self::Configuration => write!(f, "configuration"),
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Transaction => write!(f, "transaction"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
