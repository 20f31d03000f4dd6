//! Document decoding
//!
//! Turns the raw bytes of one source file into zero or more [`Document`]s.
//!
//! - YAML: a top-level mapping of named records (fixture style) or a sequence
//!   of records. Each record is a mapping of field name to scalar.
//! - JSON: a single object, or an array of objects.
//!
//! Both decoders keep fields in source order, so the column order of a target
//! is stable across runs.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Document, FieldValue, ValueKind};

/// Decodes one file's bytes into documents
pub trait DocumentDecoder: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Decode `bytes` read from `path`
    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>>;
}

/// Pick the decoder for a file by extension
pub fn decoder_for(path: &Path) -> Option<&'static dyn DocumentDecoder> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "yml" | "yaml" => Some(&YamlDecoder),
        "json" => Some(&JsonDecoder),
        _ => None,
    }
}

/// Read and decode a document file
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let decoder =
        decoder_for(path).ok_or_else(|| Error::decode(path, "unrecognised document extension"))?;
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decoder.decode(path, &bytes)
}

// ---------------------------------------------------------------------------
// YAML
// ---------------------------------------------------------------------------

/// YAML decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

impl DocumentDecoder for YamlDecoder {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let root: serde_yaml::Value =
            serde_yaml::from_slice(bytes).map_err(|e| Error::decode(path, e.to_string()))?;

        match root {
            serde_yaml::Value::Null => Ok(Vec::new()),
            serde_yaml::Value::Mapping(entries) => entries
                .into_iter()
                .map(|(key, record)| {
                    let label = yaml_key(&key).unwrap_or_else(|| format!("{:?}", key));
                    yaml_record(path, &label, record)
                })
                .collect(),
            serde_yaml::Value::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, record)| yaml_record(path, &format!("#{}", i), record))
                .collect(),
            _ => Err(Error::decode(
                path,
                "top level must be a mapping or a sequence of records",
            )),
        }
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_record(path: &Path, label: &str, record: serde_yaml::Value) -> Result<Document> {
    let serde_yaml::Value::Mapping(fields) = record else {
        return Err(Error::decode(
            path,
            format!("record {} is not a mapping", label),
        ));
    };

    let mut doc = Document::new();
    for (key, value) in fields {
        let name = match key {
            serde_yaml::Value::String(s) => s,
            other => {
                return Err(Error::decode(
                    path,
                    format!("record {} has a non-string field name {:?}", label, other),
                ))
            }
        };
        doc.insert(name, yaml_value(value));
    }
    Ok(doc)
}

fn yaml_value(value: serde_yaml::Value) -> FieldValue {
    match value {
        serde_yaml::Value::Null => FieldValue::Null,
        serde_yaml::Value::String(s) => FieldValue::String(s),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                FieldValue::UInt(u)
            } else {
                n.as_f64()
                    .map_or(FieldValue::Unsupported(ValueKind::NonFinite), FieldValue::float)
            }
        }
        serde_yaml::Value::Bool(_) => FieldValue::Unsupported(ValueKind::Boolean),
        serde_yaml::Value::Sequence(_) => FieldValue::Unsupported(ValueKind::Sequence),
        serde_yaml::Value::Mapping(_) => FieldValue::Unsupported(ValueKind::Mapping),
        serde_yaml::Value::Tagged(_) => FieldValue::Unsupported(ValueKind::Tagged),
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// JSON decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl DocumentDecoder for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>> {
        let root: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::decode(path, e.to_string()))?;

        match root {
            serde_json::Value::Object(fields) => Ok(vec![json_record(fields)]),
            serde_json::Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    serde_json::Value::Object(fields) => Ok(json_record(fields)),
                    _ => Err(Error::decode(
                        path,
                        format!("array element #{} is not an object", i),
                    )),
                })
                .collect(),
            _ => Err(Error::decode(
                path,
                "top level must be an object or an array of objects",
            )),
        }
    }
}

fn json_record(fields: serde_json::Map<String, serde_json::Value>) -> Document {
    let mut doc = Document::new();
    for (name, value) in fields {
        doc.insert(name, json_value(value));
    }
    doc
}

fn json_value(value: serde_json::Value) -> FieldValue {
    match value {
        serde_json::Value::Null => FieldValue::Null,
        serde_json::Value::String(s) => FieldValue::String(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                FieldValue::UInt(u)
            } else {
                n.as_f64()
                    .map_or(FieldValue::Unsupported(ValueKind::NonFinite), FieldValue::float)
            }
        }
        serde_json::Value::Bool(_) => FieldValue::Unsupported(ValueKind::Boolean),
        serde_json::Value::Array(_) => FieldValue::Unsupported(ValueKind::Sequence),
        serde_json::Value::Object(_) => FieldValue::Unsupported(ValueKind::Mapping),
    }
}
