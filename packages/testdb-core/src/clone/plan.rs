//! Typed clone plan steps.

use std::fmt;

use crate::catalog::ReferentialRule;
use crate::ident::Ident;

/// A foreign-key constraint with its columns grouped in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    /// Owning (child) table
    pub table: Ident,
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub referenced_table: Ident,
    pub referenced_columns: Vec<Ident>,
    pub update_rule: ReferentialRule,
    pub delete_rule: ReferentialRule,
}

/// One step of a clone plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneStep {
    /// Create the target namespace
    CreateNamespace { namespace: Ident },
    /// Create `table` in `target` with the structure of `source.table` and
    /// copy every row
    CopyTable {
        source: Ident,
        target: Ident,
        table: Ident,
    },
    /// Add a foreign-key constraint inside `namespace`
    AddForeignKey {
        namespace: Ident,
        constraint: ForeignKeyConstraint,
    },
}

/// Ordered steps that materialize `target` as a copy of `source`.
///
/// Steps always run in the order: namespace creation, table copies (parents
/// before children), constraint additions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonePlan {
    source: Ident,
    target: Ident,
    steps: Vec<CloneStep>,
}

impl ClonePlan {
    pub(crate) fn new(source: Ident, target: Ident, steps: Vec<CloneStep>) -> Self {
        Self {
            source,
            target,
            steps,
        }
    }

    /// Namespace being cloned.
    pub fn source(&self) -> &Ident {
        &self.source
    }

    /// Namespace being created.
    pub fn target(&self) -> &Ident {
        &self.target
    }

    pub fn steps(&self) -> &[CloneStep] {
        &self.steps
    }

    /// Tables in copy order.
    pub fn copied_tables(&self) -> impl Iterator<Item = &Ident> {
        self.steps.iter().filter_map(|step| match step {
            CloneStep::CopyTable { table, .. } => Some(table),
            _ => None,
        })
    }

    /// Constraints in the order they are added.
    pub fn constraints(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.steps.iter().filter_map(|step| match step {
            CloneStep::AddForeignKey { constraint, .. } => Some(constraint),
            _ => None,
        })
    }
}

impl fmt::Display for CloneStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneStep::CreateNamespace { namespace } => write!(f, "create namespace {namespace}"),
            CloneStep::CopyTable {
                source,
                target,
                table,
            } => write!(f, "copy table {source}.{table} -> {target}.{table}"),
            CloneStep::AddForeignKey {
                namespace,
                constraint,
            } => write!(
                f,
                "add foreign key {namespace}.{}.{} ({}) -> {} ({}) on delete {} on update {}",
                constraint.table,
                constraint.name,
                join(&constraint.columns),
                constraint.referenced_table,
                join(&constraint.referenced_columns),
                constraint.delete_rule,
                constraint.update_rule,
            ),
        }
    }
}

impl fmt::Display for ClonePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

fn join(idents: &[Ident]) -> String {
    idents
        .iter()
        .map(Ident::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
