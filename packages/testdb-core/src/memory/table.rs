//! Table storage for the memory engine.

use serde_json::{Map, Value};

use super::MemoryError;
use crate::catalog::ReferentialRule;
use crate::ident::Ident;

/// Column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: Ident,
    pub not_null: bool,
    pub auto_increment: bool,
    /// Value stored when an insert omits the column
    pub default: Option<Value>,
}

impl Column {
    pub fn new(name: Ident) -> Self {
        Self {
            name,
            not_null: false,
            auto_increment: false,
            default: None,
        }
    }
}

/// Foreign-key constraint owned by a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub referenced_table: Ident,
    pub referenced_columns: Vec<Ident>,
    pub on_update: ReferentialRule,
    pub on_delete: ReferentialRule,
}

/// Row values in column order.
pub type Row = Vec<Value>;

/// A table: definition plus rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: Ident,
    pub columns: Vec<Column>,
    pub primary_key: Vec<Ident>,
    pub foreign_keys: Vec<ForeignKey>,
    pub rows: Vec<Row>,
    /// `None` once a row used `i64::MAX`
    next_auto_increment: Option<i64>,
}

impl Table {
    pub fn new(name: Ident, columns: Vec<Column>, primary_key: Vec<Ident>) -> Self {
        Self {
            name,
            columns,
            primary_key,
            foreign_keys: Vec::new(),
            rows: Vec::new(),
            next_auto_increment: Some(1),
        }
    }

    /// Same columns, keys and rows; no foreign keys.
    pub fn copy_without_foreign_keys(&self) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
            foreign_keys: Vec::new(),
            rows: self.rows.clone(),
            next_auto_increment: self.next_auto_increment,
        }
    }

    pub fn column_index(&self, column: &Ident) -> Result<usize, MemoryError> {
        self.columns
            .iter()
            .position(|c| &c.name == column)
            .ok_or_else(|| MemoryError::ColumnNotFound {
                table: self.name.to_string(),
                column: column.to_string(),
            })
    }

    pub fn column_indexes(&self, columns: &[Ident]) -> Result<Vec<usize>, MemoryError> {
        columns.iter().map(|c| self.column_index(c)).collect()
    }

    /// Builds a full row from named values, filling defaults and
    /// auto-increment values, and checks NOT NULL and primary-key
    /// uniqueness. The row is not stored.
    pub fn prepare_row(&self, values: &[(Ident, Value)]) -> Result<Row, MemoryError> {
        let mut row: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (column, value) in values {
            if value.is_array() || value.is_object() {
                return Err(MemoryError::NestedValue {
                    table: self.name.to_string(),
                    column: column.to_string(),
                });
            }
            let idx = self.column_index(column)?;
            row[idx] = Some(value.clone());
        }

        let mut full = Vec::with_capacity(self.columns.len());
        for (column, value) in self.columns.iter().zip(row) {
            let value = match value {
                Some(Value::Null) | None if column.auto_increment => {
                    let next = self.next_auto_increment.ok_or_else(|| {
                        MemoryError::AutoIncrementExhausted {
                            table: self.name.to_string(),
                            column: column.name.to_string(),
                        }
                    })?;
                    Value::from(next)
                }
                Some(value) => value,
                None => column.default.clone().unwrap_or(Value::Null),
            };
            let is_key = self.primary_key.contains(&column.name);
            if value.is_null() && (column.not_null || is_key) {
                return Err(MemoryError::NotNull {
                    table: self.name.to_string(),
                    column: column.name.to_string(),
                });
            }
            full.push(value);
        }

        if !self.primary_key.is_empty() {
            let key_idx = self.column_indexes(&self.primary_key)?;
            let key = project(&full, &key_idx);
            if self.rows.iter().any(|r| project(r, &key_idx) == key) {
                return Err(MemoryError::DuplicateKey {
                    table: self.name.to_string(),
                    key: render_key(&key),
                });
            }
        }

        Ok(full)
    }

    /// Stores a row built by [`Table::prepare_row`].
    pub fn push_row(&mut self, row: Row) {
        for (column, value) in self.columns.iter().zip(&row) {
            if column.auto_increment {
                if let Some(n) = value.as_i64() {
                    self.next_auto_increment = match (self.next_auto_increment, n.checked_add(1)) {
                        (Some(current), Some(after)) => Some(current.max(after)),
                        _ => None,
                    };
                }
            }
        }
        self.rows.push(row);
    }

    /// Row indexes whose `columns` equal `key`. Keys containing NULL match
    /// nothing.
    pub fn matching_rows(&self, columns: &[usize], key: &[Value]) -> Vec<usize> {
        if key.iter().any(Value::is_null) {
            return Vec::new();
        }
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| project(row, columns) == key)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn row_as_map(&self, row: &Row) -> Map<String, Value> {
        self.columns
            .iter()
            .zip(row)
            .map(|(c, v)| (c.name.to_string(), v.clone()))
            .collect()
    }
}

/// Values of `row` at `columns`.
pub fn project(row: &Row, columns: &[usize]) -> Vec<Value> {
    columns.iter().map(|&i| row[i].clone()).collect()
}

pub fn render_key(key: &[Value]) -> String {
    key.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("-")
}
