//! MySQL statement builder.
//!
//! Every identifier goes through [`Ident::quoted`]; rules come from
//! [`ReferentialRule::as_sql`]. Nothing else is interpolated.

use crate::clone::{ClonePlan, CloneStep, ForeignKeyConstraint};
use crate::ident::Ident;

pub fn create_database(namespace: &Ident) -> String {
    format!(
        "CREATE DATABASE {} DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci",
        namespace.quoted()
    )
}

pub fn drop_database(namespace: &Ident) -> String {
    format!("DROP DATABASE {}", namespace.quoted())
}

pub fn drop_database_if_exists(namespace: &Ident) -> String {
    format!("DROP DATABASE IF EXISTS {}", namespace.quoted())
}

fn qualified(namespace: &Ident, table: &Ident) -> String {
    format!("{}.{}", namespace.quoted(), table.quoted())
}

fn column_list(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn delete_all(namespace: &Ident, table: &Ident) -> String {
    format!("DELETE FROM {}", qualified(namespace, table))
}

/// `INSERT` with one `?` placeholder per column.
pub fn insert_row(namespace: &Ident, table: &Ident, columns: &[Ident]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified(namespace, table),
        column_list(columns),
        placeholders
    )
}

fn add_foreign_key(namespace: &Ident, fk: &ForeignKeyConstraint) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        qualified(namespace, &fk.table),
        fk.name.quoted(),
        column_list(&fk.columns),
        qualified(namespace, &fk.referenced_table),
        column_list(&fk.referenced_columns),
        fk.delete_rule.as_sql(),
        fk.update_rule.as_sql(),
    )
}

/// Statements of one step, without terminators.
pub fn step_statements(step: &CloneStep) -> Vec<String> {
    match step {
        CloneStep::CreateNamespace { namespace } => vec![create_database(namespace)],
        CloneStep::CopyTable {
            source,
            target,
            table,
        } => vec![
            format!(
                "CREATE TABLE {} LIKE {}",
                qualified(target, table),
                qualified(source, table)
            ),
            format!(
                "INSERT INTO {} SELECT * FROM {}",
                qualified(target, table),
                qualified(source, table)
            ),
        ],
        CloneStep::AddForeignKey {
            namespace,
            constraint,
        } => vec![add_foreign_key(namespace, constraint)],
    }
}

/// The whole plan as one script, one statement per line.
pub fn clone_script(plan: &ClonePlan) -> String {
    plan.steps()
        .iter()
        .flat_map(step_statements)
        .map(|stmt| format!("{stmt};"))
        .collect::<Vec<_>>()
        .join("\n")
}
