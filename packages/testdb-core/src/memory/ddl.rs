//! `CREATE TABLE` parsing for the memory engine.

use serde_json::Value;
use sqlparser::ast::{
    ColumnOption, CreateTable, Expr, ObjectName, ReferentialAction, Statement, TableConstraint,
    Value as SqlValue,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use super::table::{Column, ForeignKey, Table};
use super::MemoryError;
use crate::catalog::ReferentialRule;
use crate::ident::Ident;

/// One parsed `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub table: Table,
    pub if_not_exists: bool,
}

/// Parses a script made only of `CREATE TABLE` statements.
pub fn parse_script(script: &str) -> Result<Vec<TableDefinition>, MemoryError> {
    let statements = Parser::parse_sql(&MySqlDialect {}, script)
        .map_err(|e| MemoryError::Parse(e.to_string()))?;

    statements
        .into_iter()
        .map(|statement| match statement {
            Statement::CreateTable(create) => table_definition(create),
            other => Err(MemoryError::UnsupportedStatement(first_words(&other.to_string()))),
        })
        .collect()
}

fn table_definition(create: CreateTable) -> Result<TableDefinition, MemoryError> {
    let CreateTable {
        name,
        columns: column_defs,
        constraints,
        if_not_exists,
        ..
    } = create;
    let table_name = object_ident(&name)?;

    let mut columns = Vec::with_capacity(column_defs.len());
    let mut primary_key = Vec::new();
    let mut foreign_keys = Vec::new();
    let mut unnamed = 0usize;
    let mut next_fk_name = |name: Option<&sqlparser::ast::Ident>| -> Result<Ident, MemoryError> {
        match name {
            Some(name) => ident(&name.value),
            None => {
                unnamed += 1;
                ident(&format!("{}_ibfk_{}", table_name, unnamed))
            }
        }
    };

    for def in column_defs {
        let mut column = Column::new(ident(&def.name.value)?);
        for option in def.options {
            match option.option {
                ColumnOption::NotNull => column.not_null = true,
                ColumnOption::Null => column.not_null = false,
                ColumnOption::Unique { is_primary: true, .. } => {
                    column.not_null = true;
                    primary_key = vec![column.name.clone()];
                }
                ColumnOption::Default(expr) => column.default = Some(default_value(&expr)),
                ColumnOption::ForeignKey {
                    foreign_table,
                    referred_columns,
                    on_delete,
                    on_update,
                    ..
                } => foreign_keys.push(ForeignKey {
                    name: next_fk_name(option.name.as_ref())?,
                    columns: vec![column.name.clone()],
                    referenced_table: object_ident(&foreign_table)?,
                    referenced_columns: idents(&referred_columns)?,
                    on_update: rule(on_update),
                    on_delete: rule(on_delete),
                }),
                other => {
                    if other.to_string().eq_ignore_ascii_case("AUTO_INCREMENT") {
                        column.auto_increment = true;
                    }
                }
            }
        }
        columns.push(column);
    }

    for constraint in constraints {
        match constraint {
            TableConstraint::PrimaryKey { columns: key, .. } => primary_key = idents(&key)?,
            TableConstraint::ForeignKey {
                name,
                columns: key,
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => foreign_keys.push(ForeignKey {
                name: next_fk_name(name.as_ref())?,
                columns: idents(&key)?,
                referenced_table: object_ident(&foreign_table)?,
                referenced_columns: idents(&referred_columns)?,
                on_update: rule(on_update),
                on_delete: rule(on_delete),
            }),
            _ => {}
        }
    }

    let mut table = Table::new(table_name, columns, primary_key);
    table.foreign_keys = foreign_keys;
    Ok(TableDefinition {
        table,
        if_not_exists,
    })
}

fn ident(name: &str) -> Result<Ident, MemoryError> {
    Ident::new(name).map_err(MemoryError::from)
}

fn idents(names: &[sqlparser::ast::Ident]) -> Result<Vec<Ident>, MemoryError> {
    names.iter().map(|n| ident(&n.value)).collect()
}

/// Last part of a possibly qualified name.
fn object_ident(name: &ObjectName) -> Result<Ident, MemoryError> {
    let last = name
        .0
        .last()
        .ok_or_else(|| MemoryError::Parse(format!("empty object name '{name}'")))?;
    ident(&last.value)
}

fn rule(action: Option<ReferentialAction>) -> ReferentialRule {
    match action {
        Some(ReferentialAction::Restrict) => ReferentialRule::Restrict,
        Some(ReferentialAction::Cascade) => ReferentialRule::Cascade,
        Some(ReferentialAction::SetNull) => ReferentialRule::SetNull,
        Some(ReferentialAction::SetDefault) => ReferentialRule::SetDefault,
        Some(ReferentialAction::NoAction) | None => ReferentialRule::NoAction,
    }
}

/// Literal defaults become JSON scalars; anything else is stored as its SQL
/// text.
fn default_value(expr: &Expr) -> Value {
    match expr {
        Expr::Value(SqlValue::Null) => Value::Null,
        Expr::Value(SqlValue::Boolean(b)) => Value::Bool(*b),
        Expr::Value(SqlValue::Number(n, _)) => serde_json::from_str(n).unwrap_or_else(|_| Value::String(n.clone())),
        Expr::Value(SqlValue::SingleQuotedString(s)) | Expr::Value(SqlValue::DoubleQuotedString(s)) => {
            Value::String(s.clone())
        }
        other => Value::String(other.to_string()),
    }
}

fn first_words(sql: &str) -> String {
    sql.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TODO_SCHEMA: &str = r#"
        CREATE TABLE users (
            id BIGINT NOT NULL AUTO_INCREMENT,
            username VARCHAR(255) NOT NULL,
            email VARCHAR(255),
            active TINYINT(1) NOT NULL DEFAULT 1,
            PRIMARY KEY (id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

        CREATE TABLE IF NOT EXISTS todos (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            user_id BIGINT NOT NULL,
            title VARCHAR(255) NOT NULL DEFAULT 'untitled',
            KEY idx_todos_user (user_id),
            CONSTRAINT fk_todos_user FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );
    "#;

    #[test]
    fn test_parses_columns_keys_and_defaults() {
        let defs = parse_script(TODO_SCHEMA).unwrap();
        assert_eq!(defs.len(), 2);

        let users = &defs[0].table;
        assert_eq!(users.name.as_str(), "users");
        assert!(!defs[0].if_not_exists);
        assert_eq!(users.primary_key, vec![Ident::new("id").unwrap()]);
        assert!(users.columns[0].auto_increment);
        assert!(users.columns[1].not_null);
        assert!(!users.columns[2].not_null);
        assert_eq!(users.columns[3].default, Some(json!(1)));

        let todos = &defs[1].table;
        assert!(defs[1].if_not_exists);
        assert_eq!(todos.primary_key, vec![Ident::new("id").unwrap()]);
        assert!(todos.columns[0].auto_increment);
        assert_eq!(todos.columns[2].default, Some(json!("untitled")));
        assert_eq!(todos.foreign_keys.len(), 1);
        let fk = &todos.foreign_keys[0];
        assert_eq!(fk.name.as_str(), "fk_todos_user");
        assert_eq!(fk.referenced_table.as_str(), "users");
        assert_eq!(fk.on_delete, ReferentialRule::Cascade);
        assert_eq!(fk.on_update, ReferentialRule::NoAction);
    }

    #[test]
    fn test_unnamed_foreign_keys_get_generated_names() {
        let defs = parse_script(
            "CREATE TABLE tags (id INT PRIMARY KEY);
             CREATE TABLE todo_tags (
                 todo_id INT,
                 tag_id INT REFERENCES tags (id) ON DELETE SET NULL,
                 FOREIGN KEY (todo_id) REFERENCES todos (id)
             );",
        )
        .unwrap();
        let names: Vec<&str> = defs[1].table.foreign_keys.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["todo_tags_ibfk_1", "todo_tags_ibfk_2"]);
        assert_eq!(defs[1].table.foreign_keys[0].on_delete, ReferentialRule::SetNull);
    }

    #[test]
    fn test_other_statements_are_unsupported() {
        let err = parse_script("INSERT INTO users (id) VALUES (1);").unwrap_err();
        assert!(matches!(err, MemoryError::UnsupportedStatement(ref s) if s.starts_with("INSERT INTO")));
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        assert!(matches!(parse_script("CREATE TABLE ("), Err(MemoryError::Parse(_))));
    }
}
