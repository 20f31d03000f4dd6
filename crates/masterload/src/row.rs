//! Row compilation
//!
//! Projects one [`Document`] onto a target's [`ColumnOrder`] and renders each
//! field as a SQL literal fragment:
//!
//! | value            | literal            |
//! |------------------|--------------------|
//! | string           | `"text"` (no escaping of embedded quotes) |
//! | integer / float  | decimal text, unquoted |
//! | null / missing   | `NULL`             |
//! | anything else    | [`Error::UnsupportedValue`] |

use crate::error::{Error, Result};
use crate::types::{ColumnOrder, Document, FieldValue, ValueKind};

/// Literal text for SQL NULL
pub const NULL_LITERAL: &str = "NULL";

/// One compiled row: a literal per column position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    literals: Vec<String>,
}

impl Row {
    /// Create from literal fragments
    pub fn new(literals: Vec<String>) -> Self {
        Self { literals }
    }

    /// Literal fragments in column order
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// Render as a parenthesized value tuple: `(1, "Alice", NULL)`
    pub fn to_sql(&self) -> String {
        format!("({})", self.literals.join(", "))
    }
}

/// Render a single field value as a SQL literal.
///
/// Returns the unsupported kind when the value has no literal form.
pub fn sql_literal(value: &FieldValue) -> std::result::Result<String, ValueKind> {
    match value {
        FieldValue::Null => Ok(NULL_LITERAL.to_string()),
        FieldValue::String(s) => Ok(format!("\"{}\"", s)),
        FieldValue::Int(n) => Ok(n.to_string()),
        FieldValue::UInt(n) => Ok(n.to_string()),
        FieldValue::Float(f) if f.is_finite() => Ok(f.to_string()),
        FieldValue::Float(_) => Err(ValueKind::NonFinite),
        FieldValue::Unsupported(kind) => Err(*kind),
    }
}

/// Compile one document into a row for `table`.
///
/// Fields absent from the document become `NULL`; fields the document has but
/// the column order lacks are ignored.
pub fn compile_row(table: &str, columns: &ColumnOrder, document: &Document) -> Result<Row> {
    let literals = columns
        .names()
        .iter()
        .map(|column| match document.get(column) {
            None => Ok(NULL_LITERAL.to_string()),
            Some(value) => sql_literal(value).map_err(|kind| Error::UnsupportedValue {
                table: table.to_string(),
                field: column.clone(),
                kind: kind.to_string(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Row::new(literals))
}

/// Compile every document of a target, preserving order
pub fn compile_rows(table: &str, columns: &ColumnOrder, documents: &[Document]) -> Result<Vec<Row>> {
    documents
        .iter()
        .map(|doc| compile_row(table, columns, doc))
        .collect()
}
