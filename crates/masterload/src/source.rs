//! Source resolution
//!
//! A [`Target`] binds one source path (a document file or a directory tree of
//! document files) to the table it refreshes. Document paths, decoded
//! documents and the column order are computed on first use and cached for the
//! target's lifetime.

use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::decode::read_documents;
use crate::error::{Error, Result};
use crate::row::{compile_rows, Row};
use crate::types::{ColumnOrder, Document};

/// Default document file extensions
pub const DEFAULT_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

/// Make `path` absolute and check that it exists
pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let abs = std::path::absolute(path).map_err(|_| Error::not_found(path))?;
    if !abs.exists() {
        return Err(Error::not_found(abs));
    }
    Ok(abs)
}

/// Derive a table name from the base name of `path`, up to the first `.`
///
/// `users.yml` → `users`, `users.seed.yml` → `users`, `users/` → `users`.
pub fn table_name_for(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidTarget {
            path: path.to_path_buf(),
        })
}

/// One table-refresh unit bound to one source path
#[derive(Debug)]
pub struct Target {
    source: PathBuf,
    table_name: String,
    extensions: Vec<String>,
    paths: OnceCell<Vec<PathBuf>>,
    documents: OnceCell<Vec<Document>>,
    columns: OnceCell<ColumnOrder>,
}

impl Target {
    /// Create a target with the default document extensions.
    ///
    /// The path is made absolute but not checked for existence here; that
    /// happens when documents are first enumerated.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_extensions(path, DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()))
    }

    /// Create a target that only picks up files with the given extensions
    pub fn with_extensions(
        path: impl AsRef<Path>,
        extensions: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let table_name = table_name_for(&source)?;

        Ok(Self {
            source,
            table_name,
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            paths: OnceCell::new(),
            documents: OnceCell::new(),
            columns: OnceCell::new(),
        })
    }

    /// Absolute source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Table this target refreshes
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Document files for this target, in enumeration order.
    ///
    /// A file source is its own sole document. A directory is searched at any
    /// depth for files carrying a document extension, sorted by path; finding
    /// none is an [`Error::EmptySource`].
    pub fn document_paths(&self) -> Result<&[PathBuf]> {
        self.paths
            .get_or_try_init(|| {
                let source = resolve(&self.source)?;
                if !source.is_dir() {
                    return Ok(vec![source]);
                }

                let mut found = Vec::new();
                collect_files(&source, &self.extensions, &mut found)?;
                found.sort();

                if found.is_empty() {
                    return Err(Error::EmptySource { path: source });
                }
                debug!(table = %self.table_name, files = found.len(), "Enumerated document files");
                Ok(found)
            })
            .map(Vec::as_slice)
    }

    /// All decoded documents, file by file in enumeration order
    pub fn documents(&self) -> Result<&[Document]> {
        self.documents
            .get_or_try_init(|| {
                let mut documents = Vec::new();
                for path in self.document_paths()? {
                    let decoded = read_documents(path)?;
                    debug!(
                        table = %self.table_name,
                        file = %path.display(),
                        documents = decoded.len(),
                        "Decoded document file"
                    );
                    documents.extend(decoded);
                }
                Ok(documents)
            })
            .map(Vec::as_slice)
    }

    /// Column order captured from the first non-empty document
    pub fn column_order(&self) -> Result<&ColumnOrder> {
        self.columns
            .get_or_try_init(|| Ok(ColumnOrder::from_documents(self.documents()?)))
    }

    /// Compile every document into a row. Rows are not cached.
    pub fn rows(&self) -> Result<Vec<Row>> {
        compile_rows(&self.table_name, self.column_order()?, self.documents()?)
    }
}

fn collect_files(dir: &Path, extensions: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extensions, found)?;
        } else if has_extension(&path, extensions) {
            found.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Targets found under a base directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Target directories, sorted by path
    pub targets: Vec<PathBuf>,
    /// Requested table names with no matching directory
    pub missing: Vec<String>,
}

impl Discovery {
    /// Whether every requested table was found
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Treat every immediate subdirectory of `base_dir` as a target.
///
/// With a non-empty `tables` filter only directories whose derived table name
/// is listed are returned, and listed names without a directory are reported
/// in [`Discovery::missing`].
pub fn discover_targets(base_dir: &Path, tables: &[String]) -> Result<Discovery> {
    let base = resolve(base_dir)?;
    let entries = fs::read_dir(&base).map_err(|source| Error::Io {
        path: base.clone(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    if dirs.is_empty() {
        return Err(Error::EmptySource { path: base });
    }

    if tables.is_empty() {
        return Ok(Discovery {
            targets: dirs,
            missing: Vec::new(),
        });
    }

    let named: Vec<(String, PathBuf)> = dirs
        .into_iter()
        .filter_map(|dir| table_name_for(&dir).ok().map(|name| (name, dir)))
        .collect();

    let targets = named
        .iter()
        .filter(|(name, _)| tables.contains(name))
        .map(|(_, dir)| dir.clone())
        .collect();

    let missing = tables
        .iter()
        .filter(|t| !named.iter().any(|(name, _)| name == *t))
        .cloned()
        .collect();

    Ok(Discovery { targets, missing })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for(Path::new("/data/users.yml")).unwrap(), "users");
        assert_eq!(
            table_name_for(Path::new("/data/users.seed.yml")).unwrap(),
            "users"
        );
        assert_eq!(table_name_for(Path::new("/data/items")).unwrap(), "items");
        assert!(matches!(
            table_name_for(Path::new("/data/.hidden")),
            Err(Error::InvalidTarget { .. })
        ));
        assert!(table_name_for(Path::new("/")).is_err());
    }

    #[test]
    fn test_has_extension() {
        let exts = vec!["yml".to_string(), "json".to_string()];
        assert!(has_extension(Path::new("a.yml"), &exts));
        assert!(has_extension(Path::new("a.JSON"), &exts));
        assert!(!has_extension(Path::new("a.yaml"), &exts));
        assert!(!has_extension(Path::new("README"), &exts));
    }

    #[test]
    fn test_resolve_missing_path() {
        let err = resolve("/definitely/not/here/users.yml").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_target_is_absolute() {
        let target = Target::new("relative/users.yml").unwrap();
        assert!(target.source().is_absolute());
        assert_eq!(target.table_name(), "users");
    }
}
