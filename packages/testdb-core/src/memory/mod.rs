//! Process-local engine.
//!
//! Holds namespaces of tables in memory and implements the same
//! [`Driver`]/[`Connection`] seam as the MySQL driver, so template and clone
//! lifecycles run without a server. Schema scripts may only contain
//! `CREATE TABLE` statements.

mod ddl;
mod namespace;
mod session;
mod table;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::catalog::ForeignKeyDescriptor;
use crate::clone::{ClonePlan, CloneStep};
use crate::driver::{Connection, Dialect, Driver};
use crate::error::{DriverError, IdentError};
use crate::fixtures::FixtureSet;
use crate::ident::Ident;

use namespace::Namespace;
use table::ForeignKey;

pub use session::MemorySession;

/// Memory engine errors.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Namespace '{0}' already exists")]
    NamespaceExists(String),

    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Table '{namespace}.{table}' already exists")]
    TableExists { namespace: String, table: String },

    #[error("Table '{namespace}.{table}' not found")]
    TableNotFound { namespace: String, table: String },

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Constraint '{constraint}' already exists in '{namespace}'")]
    ConstraintExists { namespace: String, constraint: String },

    #[error("Constraint '{constraint}' has mismatched column counts")]
    ColumnCountMismatch { constraint: String },

    /// Child row without a parent
    #[error("Foreign key '{constraint}' on '{table}' violated by key {key}")]
    ForeignKeyViolation {
        table: String,
        constraint: String,
        key: String,
    },

    /// Parent row still referenced under a restricting rule
    #[error("Row of '{table}' is referenced by '{child}' through '{constraint}'")]
    RowReferenced {
        table: String,
        child: String,
        constraint: String,
    },

    #[error("Column '{table}.{column}' cannot be NULL")]
    NotNull { table: String, column: String },

    /// No value left to allocate
    #[error("Failed to read auto-increment value for '{table}.{column}'")]
    AutoIncrementExhausted { table: String, column: String },

    #[error("Duplicate primary key {key} in '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("Column '{table}.{column}' must hold a scalar value")]
    NestedValue { table: String, column: String },

    #[error("Row for '{0}' must be a JSON object")]
    NotAnObject(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error(transparent)]
    InvalidIdent(#[from] IdentError),
}

/// Snapshot of engine activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub namespaces_created: u64,
    pub namespaces_dropped: u64,
    pub plans_executed: u64,
}

/// Namespaces shared by every connection and session of one driver.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    namespaces: RwLock<HashMap<Ident, Namespace>>,
    namespaces_created: AtomicU64,
    namespaces_dropped: AtomicU64,
    plans_executed: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            namespaces_created: self.namespaces_created.load(Ordering::Relaxed),
            namespaces_dropped: self.namespaces_dropped.load(Ordering::Relaxed),
            plans_executed: self.plans_executed.load(Ordering::Relaxed),
        }
    }

    /// Names of existing namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().map(Ident::to_string).collect();
        names.sort();
        names
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.read().keys().any(|k| k.as_str() == name)
    }

    fn create_namespace(&self, name: &Ident) -> Result<(), MemoryError> {
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(name) {
            return Err(MemoryError::NamespaceExists(name.to_string()));
        }
        namespaces.insert(name.clone(), Namespace::new(name));
        self.namespaces_created.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn drop_namespace(&self, name: &Ident) -> Result<(), MemoryError> {
        self.namespaces
            .write()
            .remove(name)
            .ok_or_else(|| MemoryError::NamespaceNotFound(name.to_string()))?;
        self.namespaces_dropped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn with_namespace<T>(
        &self,
        name: &Ident,
        f: impl FnOnce(&Namespace) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let namespaces = self.namespaces.read();
        let ns = namespaces
            .get(name)
            .ok_or_else(|| MemoryError::NamespaceNotFound(name.to_string()))?;
        f(ns)
    }

    pub(crate) fn with_namespace_mut<T>(
        &self,
        name: &Ident,
        f: impl FnOnce(&mut Namespace) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(name)
            .ok_or_else(|| MemoryError::NamespaceNotFound(name.to_string()))?;
        f(ns)
    }

    /// Runs `f` on a copy of the namespace and keeps the copy only on
    /// success.
    fn update_namespace<T>(
        &self,
        name: &Ident,
        f: impl FnOnce(&mut Namespace) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        self.with_namespace_mut(name, |ns| {
            let mut scratch = ns.clone();
            let out = f(&mut scratch)?;
            *ns = scratch;
            Ok(out)
        })
    }

    fn execute_script(&self, name: &Ident, script: &str) -> Result<(), MemoryError> {
        let definitions = ddl::parse_script(script)?;
        self.update_namespace(name, |ns| {
            for def in definitions {
                if def.if_not_exists && ns.contains(&def.table.name) {
                    continue;
                }
                ns.create_table(def.table)?;
            }
            Ok(())
        })
    }

    fn load_fixtures(&self, name: &Ident, fixtures: &FixtureSet) -> Result<(), MemoryError> {
        self.update_namespace(name, |ns| {
            for fixture in fixtures.tables() {
                ns.truncate(&fixture.table)?;
            }
            for fixture in fixtures.tables() {
                for row in &fixture.rows {
                    ns.insert(&fixture.table, row, false)?;
                }
            }
            Ok(())
        })
    }

    /// Builds the target namespace from the plan and publishes it only if
    /// every step succeeds.
    fn execute_plan(&self, plan: &ClonePlan) -> Result<(), MemoryError> {
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(plan.target()) {
            return Err(MemoryError::NamespaceExists(plan.target().to_string()));
        }

        let mut target: Option<Namespace> = None;
        for step in plan.steps() {
            match step {
                CloneStep::CreateNamespace { namespace } => {
                    target = Some(Namespace::new(namespace));
                }
                CloneStep::CopyTable { source, table, .. } => {
                    let copy = namespaces
                        .get(source)
                        .ok_or_else(|| MemoryError::NamespaceNotFound(source.to_string()))?
                        .table(table)?
                        .copy_without_foreign_keys();
                    target
                        .as_mut()
                        .ok_or_else(|| MemoryError::NamespaceNotFound(plan.target().to_string()))?
                        .insert_table_copy(copy)?;
                }
                CloneStep::AddForeignKey {
                    constraint,
                    ..
                } => {
                    let fk = ForeignKey {
                        name: constraint.name.clone(),
                        columns: constraint.columns.clone(),
                        referenced_table: constraint.referenced_table.clone(),
                        referenced_columns: constraint.referenced_columns.clone(),
                        on_update: constraint.update_rule,
                        on_delete: constraint.delete_rule,
                    };
                    target
                        .as_mut()
                        .ok_or_else(|| MemoryError::NamespaceNotFound(plan.target().to_string()))?
                        .add_foreign_key(&constraint.table, fk)?;
                }
            }
        }

        let target = target.ok_or_else(|| MemoryError::NamespaceNotFound(plan.target().to_string()))?;
        namespaces.insert(plan.target().clone(), target);
        self.namespaces_created.fetch_add(1, Ordering::Relaxed);
        self.plans_executed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn list_tables(&self, name: &Ident) -> Result<Vec<Ident>, MemoryError> {
        self.with_namespace(name, |ns| Ok(ns.tables().map(|t| t.name.clone()).collect()))
    }

    fn list_foreign_keys(&self, name: &Ident, table: &Ident) -> Result<Vec<ForeignKeyDescriptor>, MemoryError> {
        self.with_namespace(name, |ns| {
            let owner = ns.table(table)?;
            let mut constraints: Vec<&ForeignKey> = owner.foreign_keys.iter().collect();
            constraints.sort_by(|a, b| a.name.cmp(&b.name));

            Ok(constraints
                .into_iter()
                .flat_map(|fk| {
                    fk.columns
                        .iter()
                        .zip(&fk.referenced_columns)
                        .map(move |(column, referenced)| ForeignKeyDescriptor {
                            table: owner.name.clone(),
                            constraint: fk.name.clone(),
                            column: column.clone(),
                            referenced_table: fk.referenced_table.clone(),
                            referenced_column: referenced.clone(),
                            update_rule: fk.on_update,
                            delete_rule: fk.on_delete,
                        })
                })
                .collect())
        })
    }
}

/// Driver over a shared [`MemoryEngine`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    engine: Arc<MemoryEngine>,
}

impl MemoryDriver {
    /// Creates a driver over a fresh, empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Conn = MemoryConnection;
    type Session = MemorySession;

    fn dialect(&self) -> Dialect {
        Dialect::Memory
    }

    fn connection_string(&self, namespace: Option<&Ident>) -> String {
        match namespace {
            Some(ns) => format!("memory:///{ns}"),
            None => "memory:///".to_string(),
        }
    }

    async fn connect(&self) -> Result<MemoryConnection, DriverError> {
        Ok(MemoryConnection {
            engine: Arc::clone(&self.engine),
            closed: AtomicBool::new(false),
        })
    }

    async fn open_session(&self, namespace: &Ident) -> Result<MemorySession, DriverError> {
        if !self.engine.namespaces.read().contains_key(namespace) {
            return Err(MemoryError::NamespaceNotFound(namespace.to_string()).into());
        }
        Ok(MemorySession::new(Arc::clone(&self.engine), namespace.clone()))
    }

    async fn close_session(&self, _session: MemorySession) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Administrative connection to a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryConnection {
    engine: Arc<MemoryEngine>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn engine(&self) -> Result<&MemoryEngine, DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::Closed);
        }
        Ok(&self.engine)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_namespace(&self, namespace: &Ident) -> Result<(), DriverError> {
        Ok(self.engine()?.create_namespace(namespace)?)
    }

    async fn drop_namespace(&self, namespace: &Ident) -> Result<(), DriverError> {
        Ok(self.engine()?.drop_namespace(namespace)?)
    }

    async fn execute_script(&self, namespace: &Ident, script: &str) -> Result<(), DriverError> {
        Ok(self.engine()?.execute_script(namespace, script)?)
    }

    async fn load_fixtures(&self, namespace: &Ident, fixtures: &FixtureSet) -> Result<(), DriverError> {
        Ok(self.engine()?.load_fixtures(namespace, fixtures)?)
    }

    async fn list_tables(&self, namespace: &Ident) -> Result<Vec<Ident>, DriverError> {
        Ok(self.engine()?.list_tables(namespace)?)
    }

    async fn list_foreign_keys(
        &self,
        namespace: &Ident,
        table: &Ident,
    ) -> Result<Vec<ForeignKeyDescriptor>, DriverError> {
        Ok(self.engine()?.list_foreign_keys(namespace, table)?)
    }

    async fn execute_plan(&self, plan: &ClonePlan) -> Result<(), DriverError> {
        Ok(self.engine()?.execute_plan(plan)?)
    }

    fn render_plan(&self, plan: &ClonePlan) -> String {
        plan.to_string()
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
