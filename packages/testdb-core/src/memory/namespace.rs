//! Namespace: a set of tables with cross-table constraint enforcement.

use std::collections::BTreeMap;

use serde_json::Value;

use super::table::{project, render_key, ForeignKey, Row, Table};
use super::MemoryError;
use crate::catalog::ReferentialRule;
use crate::ident::Ident;

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    name: String,
    tables: BTreeMap<Ident, Table>,
}

impl Namespace {
    pub fn new(name: &Ident) -> Self {
        Self {
            name: name.to_string(),
            tables: BTreeMap::new(),
        }
    }

    /// Tables ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, name: &Ident) -> Result<&Table, MemoryError> {
        self.tables.get(name).ok_or_else(|| self.table_not_found(name))
    }

    fn table_mut(&mut self, name: &Ident) -> Result<&mut Table, MemoryError> {
        let namespace = &self.name;
        self.tables
            .get_mut(name)
            .ok_or_else(|| MemoryError::TableNotFound {
                namespace: namespace.clone(),
                table: name.to_string(),
            })
    }

    fn table_not_found(&self, name: &Ident) -> MemoryError {
        MemoryError::TableNotFound {
            namespace: self.name.clone(),
            table: name.to_string(),
        }
    }

    pub fn contains(&self, name: &Ident) -> bool {
        self.tables.contains_key(name)
    }

    /// Adds a table. Foreign keys it declares must reference existing
    /// columns of existing tables (or of itself).
    pub fn create_table(&mut self, table: Table) -> Result<(), MemoryError> {
        if self.tables.contains_key(&table.name) {
            return Err(MemoryError::TableExists {
                namespace: self.name.clone(),
                table: table.name.to_string(),
            });
        }
        table.column_indexes(&table.primary_key)?;
        for fk in &table.foreign_keys {
            self.check_constraint_definition(&table, fk)?;
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Adds `table` as-is, bypassing constraint definition checks.
    pub fn insert_table_copy(&mut self, table: Table) -> Result<(), MemoryError> {
        if self.tables.contains_key(&table.name) {
            return Err(MemoryError::TableExists {
                namespace: self.name.clone(),
                table: table.name.to_string(),
            });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn check_constraint_definition(&self, owner: &Table, fk: &ForeignKey) -> Result<(), MemoryError> {
        let duplicate = self
            .tables
            .values()
            .chain(std::iter::once(owner))
            .flat_map(|t| t.foreign_keys.iter())
            .filter(|other| other.name == fk.name)
            .count();
        if duplicate > 1 {
            return Err(MemoryError::ConstraintExists {
                namespace: self.name.clone(),
                constraint: fk.name.to_string(),
            });
        }

        owner.column_indexes(&fk.columns)?;
        let parent = if fk.referenced_table == owner.name {
            owner
        } else {
            self.table(&fk.referenced_table)?
        };
        parent.column_indexes(&fk.referenced_columns)?;
        if fk.columns.len() != fk.referenced_columns.len() {
            return Err(MemoryError::ColumnCountMismatch {
                constraint: fk.name.to_string(),
            });
        }
        Ok(())
    }

    /// Adds a constraint to an existing table after checking every current
    /// row against it.
    pub fn add_foreign_key(&mut self, table: &Ident, fk: ForeignKey) -> Result<(), MemoryError> {
        let mut owner = self.table(table)?.clone();
        owner.foreign_keys.push(fk.clone());
        self.check_constraint_definition(&owner, &fk)?;

        for row in &owner.rows {
            self.check_parent_exists(&owner, &fk, row)?;
        }
        self.table_mut(table)?.foreign_keys.push(fk);
        Ok(())
    }

    fn check_parent_exists(&self, owner: &Table, fk: &ForeignKey, row: &Row) -> Result<(), MemoryError> {
        let key = project(row, &owner.column_indexes(&fk.columns)?);
        if key.iter().any(Value::is_null) {
            return Ok(());
        }
        let parent = if fk.referenced_table == owner.name {
            owner
        } else {
            self.table(&fk.referenced_table)?
        };
        let parent_columns = parent.column_indexes(&fk.referenced_columns)?;
        let self_match = fk.referenced_table == owner.name && project(row, &parent_columns) == key;
        if self_match || !parent.matching_rows(&parent_columns, &key).is_empty() {
            return Ok(());
        }
        Err(MemoryError::ForeignKeyViolation {
            table: owner.name.to_string(),
            constraint: fk.name.to_string(),
            key: render_key(&key),
        })
    }

    /// Inserts one row. Foreign-key parents are checked unless
    /// `check_foreign_keys` is false.
    pub fn insert(
        &mut self,
        table: &Ident,
        values: &[(Ident, Value)],
        check_foreign_keys: bool,
    ) -> Result<(), MemoryError> {
        let owner = self.table(table)?;
        let row = owner.prepare_row(values)?;
        if check_foreign_keys {
            for fk in &owner.foreign_keys {
                self.check_parent_exists(owner, fk, &row)?;
            }
        }
        self.table_mut(table)?.push_row(row);
        Ok(())
    }

    /// Removes every row of `table`, ignoring references to them.
    pub fn truncate(&mut self, table: &Ident) -> Result<(), MemoryError> {
        self.table_mut(table)?.rows.clear();
        Ok(())
    }

    /// Deletes rows of `table` whose `column` equals `value`, applying the
    /// delete rule of every constraint that references them. Returns the
    /// number of rows deleted from `table` itself.
    ///
    /// On error the namespace is left unchanged.
    pub fn delete_where(&mut self, table: &Ident, column: &Ident, value: &Value) -> Result<usize, MemoryError> {
        let owner = self.table(table)?;
        let idx = owner.column_index(column)?;
        let victims = owner.matching_rows(&[idx], std::slice::from_ref(value));
        let deleted = victims.len();

        let mut scratch = self.clone();
        scratch.delete_rows(table, victims)?;
        *self = scratch;
        Ok(deleted)
    }

    fn delete_rows(&mut self, table: &Ident, mut victims: Vec<usize>) -> Result<(), MemoryError> {
        if victims.is_empty() {
            return Ok(());
        }
        victims.sort_unstable();
        victims.dedup();

        let owner = self.table_mut(table)?;
        let mut removed = Vec::with_capacity(victims.len());
        for &i in victims.iter().rev() {
            removed.push(owner.rows.remove(i));
        }
        let parent = self.table(table)?.clone();

        let referencing: Vec<(Ident, ForeignKey)> = self
            .tables
            .values()
            .flat_map(|t| {
                t.foreign_keys
                    .iter()
                    .filter(|fk| &fk.referenced_table == table)
                    .map(|fk| (t.name.clone(), fk.clone()))
            })
            .collect();

        for (child_name, fk) in referencing {
            let parent_columns = parent.column_indexes(&fk.referenced_columns)?;
            let child = self.table(&child_name)?;
            let child_columns = child.column_indexes(&fk.columns)?;

            let mut dependents: Vec<usize> = removed
                .iter()
                .flat_map(|row| child.matching_rows(&child_columns, &project(row, &parent_columns)))
                .collect();
            dependents.sort_unstable();
            dependents.dedup();
            if dependents.is_empty() {
                continue;
            }

            match fk.on_delete {
                ReferentialRule::Cascade => self.delete_rows(&child_name, dependents)?,
                ReferentialRule::SetNull => {
                    let child = self.table_mut(&child_name)?;
                    for &col in &child_columns {
                        if child.columns[col].not_null || child.primary_key.contains(&child.columns[col].name) {
                            return Err(MemoryError::NotNull {
                                table: child_name.to_string(),
                                column: child.columns[col].name.to_string(),
                            });
                        }
                    }
                    for &row in &dependents {
                        for &col in &child_columns {
                            child.rows[row][col] = Value::Null;
                        }
                    }
                }
                ReferentialRule::Restrict | ReferentialRule::NoAction | ReferentialRule::SetDefault => {
                    return Err(MemoryError::RowReferenced {
                        table: table.to_string(),
                        child: child_name.to_string(),
                        constraint: fk.name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
