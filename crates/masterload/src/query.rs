//! Statement compilation
//!
//! Compiles a target's rows into the statement text executed by the loader:
//! - purge (`DELETE FROM` or `TRUNCATE TABLE`)
//! - batched multi-row `INSERT`
//! - row count read-back
//! - auto-increment reset
//!
//! Table and column identifiers are interpolated as-is. They come from file
//! and field names of trusted fixture data, not from external input.

use tracing::debug;

use crate::config::{LoadConfig, PurgeMode};
use crate::error::{Error, Result};
use crate::row::Row;
use crate::source::Target;
use crate::types::ColumnOrder;

/// Rows per INSERT statement when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Builds statement text for one table
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    table: &'a str,
    columns: &'a ColumnOrder,
    rows: &'a [Row],
    batch_size: usize,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder over compiled rows
    pub fn new(table: &'a str, columns: &'a ColumnOrder, rows: &'a [Row]) -> Self {
        Self {
            table,
            columns,
            rows,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the maximum number of rows per INSERT (at least 1)
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Table name
    pub fn table(&self) -> &str {
        self.table
    }

    /// Statement removing every existing row
    pub fn truncate_statement(&self, mode: PurgeMode) -> String {
        match mode {
            PurgeMode::Delete => format!("DELETE FROM {}", self.table),
            PurgeMode::Truncate => format!("TRUNCATE TABLE {}", self.table),
        }
    }

    /// Parenthesized column list: `(id, name)`
    pub fn columns_sql(&self) -> Result<String> {
        if self.columns.is_empty() {
            return Err(Error::NoColumns {
                table: self.table.to_string(),
            });
        }
        Ok(format!("({})", self.columns.names().join(", ")))
    }

    /// One INSERT per batch of at most `batch_size` rows, in row order.
    ///
    /// No rows yields no statements.
    pub fn insert_statements(&self) -> Result<Vec<String>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let columns = self.columns_sql()?;
        let statements = self
            .rows
            .chunks(self.batch_size)
            .map(|batch| {
                let values: Vec<String> = batch.iter().map(Row::to_sql).collect();
                format!(
                    "INSERT INTO {} {} VALUES {}",
                    self.table,
                    columns,
                    values.join(", ")
                )
            })
            .collect();

        Ok(statements)
    }

    /// Statement returning the current row count
    pub fn count_statement(&self) -> String {
        format!("SELECT COUNT(1) FROM {}", self.table)
    }

    /// Statement setting the auto-increment start to `count`
    pub fn reset_sequence_statement(&self, count: u64) -> String {
        alter_auto_increment(self.table, count)
    }
}

/// Everything the loader needs to refresh one table, compiled up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    /// Target table
    pub table: String,
    /// Purge statement
    pub purge: String,
    /// INSERT statements in batch order
    pub inserts: Vec<String>,
    /// Row count read-back statement
    pub count: String,
    /// Number of rows compiled into the inserts
    pub row_count: usize,
    /// Whether to reset the auto-increment counter after inserting
    pub reset_sequence: bool,
}

impl LoadPlan {
    /// Resolve, decode and compile a target under `config`
    pub fn compile(target: &Target, config: &LoadConfig) -> Result<Self> {
        let rows = target.rows()?;
        let columns = target.column_order()?;
        let builder = QueryBuilder::new(target.table_name(), columns, &rows)
            .with_batch_size(config.batch_size);

        let plan = Self {
            table: target.table_name().to_string(),
            purge: builder.truncate_statement(config.purge_mode),
            inserts: builder.insert_statements()?,
            count: builder.count_statement(),
            row_count: rows.len(),
            reset_sequence: config.reset_sequence,
        };

        debug!(
            table = %plan.table,
            rows = plan.row_count,
            batches = plan.inserts.len(),
            "Compiled load plan"
        );
        Ok(plan)
    }

    /// Auto-increment reset for the counted rows, if enabled
    pub fn reset_sequence_sql(&self, count: u64) -> Option<String> {
        self.reset_sequence
            .then(|| alter_auto_increment(&self.table, count))
    }
}

fn alter_auto_increment(table: &str, count: u64) -> String {
    format!("ALTER TABLE {} AUTO_INCREMENT = {}", table, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> ColumnOrder {
        ColumnOrder::new(vec!["id".into(), "name".into()])
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec![i.to_string(), format!("\"r{}\"", i)]))
            .collect()
    }

    #[test]
    fn test_five_rows_in_batches_of_three() {
        let cols = columns();
        let rows = rows(5);
        let stmts = QueryBuilder::new("users", &cols, &rows)
            .with_batch_size(3)
            .insert_statements()
            .unwrap();

        assert_eq!(
            stmts,
            vec![
                r#"INSERT INTO users (id, name) VALUES (0, "r0"), (1, "r1"), (2, "r2")"#,
                r#"INSERT INTO users (id, name) VALUES (3, "r3"), (4, "r4")"#,
            ]
        );
    }

    #[test]
    fn test_no_rows_no_inserts() {
        let cols = ColumnOrder::default();
        let stmts = QueryBuilder::new("users", &cols, &[])
            .insert_statements()
            .unwrap();
        assert!(stmts.is_empty());
    }

    #[test]
    fn test_rows_without_columns_fail() {
        let cols = ColumnOrder::default();
        let rows = vec![Row::new(vec![])];
        let err = QueryBuilder::new("users", &cols, &rows)
            .insert_statements()
            .unwrap_err();
        assert!(matches!(err, Error::NoColumns { table } if table == "users"));
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let cols = columns();
        let rows = rows(2);
        let stmts = QueryBuilder::new("users", &cols, &rows)
            .with_batch_size(0)
            .insert_statements()
            .unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_control_statements() {
        let cols = columns();
        let builder = QueryBuilder::new("users", &cols, &[]);

        assert_eq!(builder.truncate_statement(PurgeMode::Delete), "DELETE FROM users");
        assert_eq!(
            builder.truncate_statement(PurgeMode::Truncate),
            "TRUNCATE TABLE users"
        );
        assert_eq!(builder.count_statement(), "SELECT COUNT(1) FROM users");
        assert_eq!(
            builder.reset_sequence_statement(12),
            "ALTER TABLE users AUTO_INCREMENT = 12"
        );
    }
}
