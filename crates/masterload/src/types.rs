//! Document model for masterload
//!
//! A document is one decoded record destined to become one table row. Field
//! values are restricted to the kinds that have a SQL literal form; anything
//! else is carried as [`FieldValue::Unsupported`] so the row compiler can name
//! the offending field.

use std::fmt;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent or explicit null
    Null,
    /// Text
    String(String),
    /// Signed integer
    Int(i64),
    /// Unsigned integer beyond the signed range
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// A value kind with no literal form (booleans, sequences, mappings)
    Unsupported(ValueKind),
}

/// Kinds of decoded values that cannot be written as SQL literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// true / false
    Boolean,
    /// Nested list
    Sequence,
    /// Nested object
    Mapping,
    /// YAML tagged value
    Tagged,
    /// NaN or infinity
    NonFinite,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Sequence => write!(f, "sequence"),
            Self::Mapping => write!(f, "mapping"),
            Self::Tagged => write!(f, "tagged value"),
            Self::NonFinite => write!(f, "non-finite number"),
        }
    }
}

impl FieldValue {
    /// Check if value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Build a float value, rejecting NaN and infinities
    pub fn float(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Unsupported(ValueKind::NonFinite)
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::float(n)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One decoded record: field names in source order mapped to values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing the value if the name is already present
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Field names in source order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The fixed field ordering used for every row of a target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOrder {
    names: Vec<String>,
}

impl ColumnOrder {
    /// Create from explicit names
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Capture the key order of the first non-empty document
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        documents
            .into_iter()
            .find(|d| !d.is_empty())
            .map(|d| Self::new(d.keys().map(str::to_string).collect()))
            .unwrap_or_default()
    }

    /// Column names in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no columns were captured
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
