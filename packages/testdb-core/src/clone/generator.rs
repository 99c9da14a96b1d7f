//! Clone plan synthesis from a cached catalog.

use std::collections::{BTreeSet, HashMap};

use super::plan::{ClonePlan, CloneStep, ForeignKeyConstraint};
use crate::catalog::ForeignKeyDescriptor;
use crate::ident::Ident;

/// Builds clone plans for one source catalog.
#[derive(Debug, Clone, Copy)]
pub struct CloneGenerator<'a> {
    tables: &'a [Ident],
    foreign_keys: &'a [ForeignKeyDescriptor],
}

impl<'a> CloneGenerator<'a> {
    /// Creates a generator over the tables (in cached order) and foreign-key
    /// columns of the source namespace.
    pub fn new(tables: &'a [Ident], foreign_keys: &'a [ForeignKeyDescriptor]) -> Self {
        Self {
            tables,
            foreign_keys,
        }
    }

    /// Builds the plan that materializes `target` from `source`.
    ///
    /// Tables are copied parents first; all constraints are added after the
    /// last copy so no row is validated against a parent that has not been
    /// copied yet.
    pub fn plan(&self, source: &Ident, target: &Ident) -> ClonePlan {
        let order = self.copy_order();
        let constraints = self.constraints();

        let mut steps = Vec::with_capacity(1 + order.len() + constraints.len());
        steps.push(CloneStep::CreateNamespace {
            namespace: target.clone(),
        });
        steps.extend(order.into_iter().map(|table| CloneStep::CopyTable {
            source: source.clone(),
            target: target.clone(),
            table,
        }));
        steps.extend(
            constraints
                .into_iter()
                .map(|constraint| CloneStep::AddForeignKey {
                    namespace: target.clone(),
                    constraint,
                }),
        );

        ClonePlan::new(source.clone(), target.clone(), steps)
    }

    /// Tables ordered so that every referenced table precedes the tables
    /// referencing it. Ties keep the cached order.
    pub fn copy_order(&self) -> Vec<Ident> {
        dependency_order(self.tables, self.foreign_keys)
    }

    /// Foreign-key columns grouped into constraints, in first-seen order.
    pub fn constraints(&self) -> Vec<ForeignKeyConstraint> {
        group_constraints(self.foreign_keys)
    }
}

/// Groups per-column descriptors sharing (table, constraint) into one
/// multi-column constraint.
pub(crate) fn group_constraints(foreign_keys: &[ForeignKeyDescriptor]) -> Vec<ForeignKeyConstraint> {
    let mut grouped: Vec<ForeignKeyConstraint> = Vec::new();
    let mut index: HashMap<(&Ident, &Ident), usize> = HashMap::new();

    for fk in foreign_keys {
        match index.get(&(&fk.table, &fk.constraint)) {
            Some(&i) => {
                grouped[i].columns.push(fk.column.clone());
                grouped[i]
                    .referenced_columns
                    .push(fk.referenced_column.clone());
            }
            None => {
                index.insert((&fk.table, &fk.constraint), grouped.len());
                grouped.push(ForeignKeyConstraint {
                    table: fk.table.clone(),
                    name: fk.constraint.clone(),
                    columns: vec![fk.column.clone()],
                    referenced_table: fk.referenced_table.clone(),
                    referenced_columns: vec![fk.referenced_column.clone()],
                    update_rule: fk.update_rule,
                    delete_rule: fk.delete_rule,
                });
            }
        }
    }

    grouped
}

/// Stable topological sort of `tables` by foreign-key dependency.
///
/// Self-references and references to tables outside `tables` impose no
/// ordering. Tables caught in a reference cycle keep their cached relative
/// order and are appended after everything that could be ordered.
pub(crate) fn dependency_order(tables: &[Ident], foreign_keys: &[ForeignKeyDescriptor]) -> Vec<Ident> {
    let position: HashMap<&Ident, usize> = tables.iter().enumerate().map(|(i, t)| (t, i)).collect();
    let n = tables.len();
    let mut parents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut children: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for fk in foreign_keys {
        let (Some(&child), Some(&parent)) =
            (position.get(&fk.table), position.get(&fk.referenced_table))
        else {
            continue;
        };
        if child == parent {
            continue;
        }
        parents[child].insert(parent);
        children[parent].insert(child);
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| parents[i].is_empty()).collect();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while let Some(i) = ready.pop_first() {
        placed[i] = true;
        order.push(i);
        for &child in &children[i] {
            parents[child].remove(&i);
            if parents[child].is_empty() && !placed[child] {
                ready.insert(child);
            }
        }
    }

    if order.len() < n {
        let cyclic: Vec<usize> = (0..n).filter(|&i| !placed[i]).collect();
        tracing::warn!(
            "Foreign-key cycle among tables [{}]; copying them in catalog order",
            cyclic
                .iter()
                .map(|&i| tables[i].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        order.extend(cyclic);
    }

    order.into_iter().map(|i| tables[i].clone()).collect()
}
