//! Schema script application.

use std::fs;
use std::path::{Path, PathBuf};

use crate::driver::Connection;
use crate::error::{Result, SchemaError, TestDbError};
use crate::ident::Ident;

/// Applies a raw DDL script, verbatim, to a namespace.
pub struct SchemaApplier<'a, C: Connection> {
    conn: &'a C,
    path: PathBuf,
}

impl<'a, C: Connection> SchemaApplier<'a, C> {
    pub fn new(conn: &'a C, path: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the script and executes it with `namespace` as the default
    /// namespace.
    pub async fn apply(&self, namespace: &Ident) -> Result<()> {
        let fail = |source: SchemaError| TestDbError::SchemaApplication {
            path: self.path.clone(),
            namespace: namespace.to_string(),
            source,
        };

        let script = fs::read_to_string(&self.path)
            .map_err(SchemaError::Read)
            .map_err(fail)?;
        tracing::debug!(
            "Applying schema {} ({} bytes) to {}",
            self.path.display(),
            script.len(),
            namespace
        );

        self.conn
            .execute_script(namespace, &script)
            .await
            .map_err(SchemaError::Execute)
            .map_err(fail)
    }
}
