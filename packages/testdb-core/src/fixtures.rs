//! Fixture datasets and the loader that seeds them into a namespace.
//!
//! A fixture directory holds one file per table, named after the table
//! (`users.yml`, `todos.yaml`, `tags.json`). Each file is a list of rows;
//! each row maps column names to scalar values:
//!
//! ```yaml
//! - id: 1
//!   username: user1
//!   email: user1@example.com
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::driver::{Connection, Dialect};
use crate::error::{FixtureError, Result, TestDbError};
use crate::ident::Ident;

/// One fixture row: columns in a stable order with scalar values.
pub type FixtureRow = Vec<(Ident, Value)>;

/// Rows destined for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureTable {
    pub table: Ident,
    pub rows: Vec<FixtureRow>,
}

/// All fixtures of a directory, ordered by file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureSet {
    tables: Vec<FixtureTable>,
}

impl FixtureSet {
    /// Reads every `.yml`, `.yaml` and `.json` file in `dir`.
    ///
    /// Other files and subdirectories are skipped. An empty file seeds an
    /// empty table.
    pub fn from_dir(dir: &Path) -> std::result::Result<Self, FixtureError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(FixtureError::ReadDir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && fixture_format(path).is_some())
            .collect();
        files.sort();

        let mut tables = Vec::with_capacity(files.len());
        for path in files {
            tables.push(read_fixture_file(&path)?);
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[FixtureTable] {
        &self.tables
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl From<Vec<FixtureTable>> for FixtureSet {
    fn from(tables: Vec<FixtureTable>) -> Self {
        Self { tables }
    }
}

#[derive(Debug, Clone, Copy)]
enum FixtureFormat {
    Yaml,
    Json,
}

fn fixture_format(path: &Path) -> Option<FixtureFormat> {
    match path.extension()?.to_str()? {
        "yml" | "yaml" => Some(FixtureFormat::Yaml),
        "json" => Some(FixtureFormat::Json),
        _ => None,
    }
}

fn read_fixture_file(path: &Path) -> std::result::Result<FixtureTable, FixtureError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let table = Ident::new(stem).map_err(|source| FixtureError::Ident {
        path: path.to_path_buf(),
        source,
    })?;

    let content = fs::read_to_string(path).map_err(|source| FixtureError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: Vec<Map<String, Value>> = if content.trim().is_empty() {
        Vec::new()
    } else {
        let parsed = match fixture_format(path) {
            Some(FixtureFormat::Json) => {
                serde_json::from_str::<Option<Vec<Map<String, Value>>>>(&content)
                    .map_err(|e| e.to_string())
            }
            _ => serde_yaml::from_str::<Option<Vec<Map<String, Value>>>>(&content)
                .map_err(|e| e.to_string()),
        }
        .map_err(|message| FixtureError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        parsed.unwrap_or_default()
    };

    let mut rows = Vec::with_capacity(raw.len());
    for record in raw {
        let mut row = Vec::with_capacity(record.len());
        for (column, value) in record {
            if value.is_array() || value.is_object() {
                return Err(FixtureError::NestedValue {
                    path: path.to_path_buf(),
                    column,
                });
            }
            let column = Ident::new(column).map_err(|source| FixtureError::Ident {
                path: path.to_path_buf(),
                source,
            })?;
            row.push((column, value));
        }
        rows.push(row);
    }

    Ok(FixtureTable { table, rows })
}

/// Seeds a namespace from a fixture directory through a live connection.
pub struct FixtureLoader<'a, C: Connection> {
    conn: &'a C,
    dialect: Dialect,
    dir: PathBuf,
}

impl<'a, C: Connection> FixtureLoader<'a, C> {
    pub fn new(conn: &'a C, dialect: Dialect, dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            dialect,
            dir: dir.into(),
        }
    }

    /// Reads the fixture directory and inserts every row into `namespace`.
    pub async fn load(&self, namespace: &Ident) -> Result<()> {
        let fail = |source: FixtureError| TestDbError::FixtureLoad {
            dir: self.dir.clone(),
            namespace: namespace.to_string(),
            source,
        };

        let fixtures = FixtureSet::from_dir(&self.dir).map_err(fail)?;
        tracing::debug!(
            "Loading {} fixture rows into {} tables of {} ({})",
            fixtures.row_count(),
            fixtures.tables().len(),
            namespace,
            self.dialect
        );

        self.conn
            .load_fixtures(namespace, &fixtures)
            .await
            .map_err(|e| fail(FixtureError::Insert(e)))
    }
}
