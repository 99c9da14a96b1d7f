//! Catalog introspection: tables and foreign keys of a namespace.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::driver::Connection;
use crate::error::{DriverError, Result, TestDbError};
use crate::ident::Ident;

/// Action taken on child rows when a referenced row is updated or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialRule {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialRule {
    /// Returns the SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialRule::NoAction => "NO ACTION",
            ReferentialRule::Restrict => "RESTRICT",
            ReferentialRule::Cascade => "CASCADE",
            ReferentialRule::SetNull => "SET NULL",
            ReferentialRule::SetDefault => "SET DEFAULT",
        }
    }
}

impl FromStr for ReferentialRule {
    type Err = DriverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "NO ACTION" => Ok(ReferentialRule::NoAction),
            "RESTRICT" => Ok(ReferentialRule::Restrict),
            "CASCADE" => Ok(ReferentialRule::Cascade),
            "SET NULL" => Ok(ReferentialRule::SetNull),
            "SET DEFAULT" => Ok(ReferentialRule::SetDefault),
            _ => Err(DriverError::UnknownRule(s.to_string())),
        }
    }
}

impl fmt::Display for ReferentialRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One constrained column of a foreign key, as reported by key-usage
/// metadata. Composite keys yield one descriptor per column, sharing
/// `constraint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyDescriptor {
    /// Owning (child) table
    pub table: Ident,
    /// Constraint name
    pub constraint: Ident,
    /// Column in the owning table
    pub column: Ident,
    /// Referenced (parent) table
    pub referenced_table: Ident,
    /// Column in the referenced table
    pub referenced_column: Ident,
    pub update_rule: ReferentialRule,
    pub delete_rule: ReferentialRule,
}

/// Tables and foreign keys of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub tables: Vec<Ident>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

/// Read-only metadata queries over an administrative connection.
pub struct CatalogInspector<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> CatalogInspector<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Lists base tables of `namespace` in a deterministic order.
    pub async fn list_tables(&self, namespace: &Ident) -> Result<Vec<Ident>> {
        self.conn
            .list_tables(namespace)
            .await
            .map_err(|source| TestDbError::Introspection {
                operation: "list tables",
                namespace: namespace.to_string(),
                source,
            })
    }

    /// Lists the foreign-key columns owned by `table`; empty when none.
    pub async fn list_foreign_keys(
        &self,
        namespace: &Ident,
        table: &Ident,
    ) -> Result<Vec<ForeignKeyDescriptor>> {
        self.conn
            .list_foreign_keys(namespace, table)
            .await
            .map_err(|source| TestDbError::Introspection {
                operation: "list foreign keys",
                namespace: format!("{namespace}.{table}"),
                source,
            })
    }

    /// Lists all tables, then the foreign keys of each table in table order.
    pub async fn load_catalog(&self, namespace: &Ident) -> Result<Catalog> {
        let tables = self.list_tables(namespace).await?;
        let mut foreign_keys = Vec::new();
        for table in &tables {
            foreign_keys.extend(self.list_foreign_keys(namespace, table).await?);
        }
        tracing::debug!(
            "Catalog of {}: {} tables, {} foreign key columns",
            namespace,
            tables.len(),
            foreign_keys.len()
        );
        Ok(Catalog {
            tables,
            foreign_keys,
        })
    }
}
