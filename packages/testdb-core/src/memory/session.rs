//! Sessions bound to one memory namespace.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{MemoryEngine, MemoryError};
use crate::ident::Ident;

/// Row-level access to one namespace of a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemorySession {
    engine: Arc<MemoryEngine>,
    namespace: Ident,
}

impl MemorySession {
    pub(crate) fn new(engine: Arc<MemoryEngine>, namespace: Ident) -> Self {
        Self { engine, namespace }
    }

    pub fn namespace(&self) -> &Ident {
        &self.namespace
    }

    /// Inserts one row given as a JSON object of column values.
    ///
    /// Enforces NOT NULL, primary-key uniqueness and foreign-key parents.
    pub fn insert(&self, table: &str, row: Value) -> Result<(), MemoryError> {
        let table = Ident::new(table)?;
        let Value::Object(map) = row else {
            return Err(MemoryError::NotAnObject(table.to_string()));
        };
        let values = map
            .into_iter()
            .map(|(column, value)| Ok((Ident::new(column)?, value)))
            .collect::<Result<Vec<_>, MemoryError>>()?;
        self.engine
            .with_namespace_mut(&self.namespace, |ns| ns.insert(&table, &values, true))
    }

    /// Deletes rows whose `column` equals `value`, applying each referencing
    /// constraint's delete rule. Returns the number of rows removed from
    /// `table` itself.
    pub fn delete_where(&self, table: &str, column: &str, value: Value) -> Result<usize, MemoryError> {
        let table = Ident::new(table)?;
        let column = Ident::new(column)?;
        self.engine
            .with_namespace_mut(&self.namespace, |ns| ns.delete_where(&table, &column, &value))
    }

    /// All rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Map<String, Value>>, MemoryError> {
        let table = Ident::new(table)?;
        self.engine.with_namespace(&self.namespace, |ns| {
            let t = ns.table(&table)?;
            Ok(t.rows.iter().map(|row| t.row_as_map(row)).collect())
        })
    }

    pub fn count(&self, table: &str) -> Result<usize, MemoryError> {
        let table = Ident::new(table)?;
        self.engine
            .with_namespace(&self.namespace, |ns| Ok(ns.table(&table)?.rows.len()))
    }
}
