//! Template init, reference counting and teardown.

use std::sync::Arc;

use ntest::timeout;
use pretty_assertions::assert_eq;

use testdb_core::memory::MemoryDriver;
use testdb_core::{init_template, TemplateDatabase, TemplateDatabaseConfig, TestDbError};

use crate::helpers::{memory_template, testdata_config, todo_template, CapturedLogs, Workspace};

#[tokio::test]
async fn test_init_is_idempotent() {
    let (template, engine) = memory_template(testdata_config());
    assert!(!template.is_initialized().await);
    assert!(template.name().await.is_none());

    template.init().await.unwrap();
    let name = template.name().await.unwrap();
    assert!(name.as_str().starts_with("todo_template_"));

    template.init().await.unwrap();
    assert_eq!(template.name().await.unwrap(), name);
    assert_eq!(engine.stats().namespaces_created, 1);
    assert_eq!(engine.namespaces(), vec![name.to_string()]);
}

#[tokio::test]
async fn test_init_caches_catalog() {
    let (template, _engine) = todo_template().await;
    let tables: Vec<String> = template.tables().await.iter().map(|t| t.to_string()).collect();
    assert_eq!(tables, vec!["todos", "users"]);

    let fks = template.foreign_keys().await;
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].table.as_str(), "todos");
    assert_eq!(fks[0].constraint.as_str(), "fk_todos_user");
    assert_eq!(fks[0].referenced_table.as_str(), "users");
    assert_eq!(fks[0].delete_rule.as_sql(), "CASCADE");
    assert_eq!(fks[0].update_rule.as_sql(), "RESTRICT");
}

#[tokio::test]
async fn test_acquire_and_release_require_init() {
    let (template, _engine) = memory_template(testdata_config());
    assert!(matches!(
        template.acquire().await,
        Err(TestDbError::NotInitialized { .. })
    ));
    assert!(matches!(
        template.release().await,
        Err(TestDbError::NotInitialized { .. })
    ));
    assert_eq!(template.ref_count().await, 0);
}

#[tokio::test]
async fn test_release_at_zero_is_a_no_op() {
    let (template, engine) = todo_template().await;
    template.release().await.unwrap();
    assert!(template.is_initialized().await);
    assert_eq!(engine.stats().namespaces_dropped, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_and_single_teardown() {
    let (template, engine) = todo_template().await;
    let name = template.name().await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let template = Arc::clone(&template);
            tokio::spawn(async move { template.acquire().await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(template.ref_count().await, 16);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let template = Arc::clone(&template);
            tokio::spawn(async move { template.release().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(template.ref_count().await, 0);
    assert!(!template.is_initialized().await);
    assert!(template.name().await.is_none());
    assert!(template.tables().await.is_empty());
    assert_eq!(engine.stats().namespaces_dropped, 1);
    assert!(!engine.has_namespace(name.as_str()));
}

#[tokio::test]
async fn test_rebuild_after_teardown_uses_fresh_name() {
    let (template, engine) = memory_template(testdata_config());
    let pinned = init_template(&template).await.unwrap();
    let first = template.name().await.unwrap();
    pinned.release().await.unwrap();
    assert!(engine.namespaces().is_empty());

    template.init().await.unwrap();
    let second = template.name().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(engine.stats().namespaces_created, 2);
}

#[tokio::test]
async fn test_missing_schema_file_leaves_template_retryable() {
    let workspace = Workspace::new();
    let (template, engine) = memory_template(workspace.config("retry"));

    let err = template.init().await.unwrap_err();
    match &err {
        TestDbError::SchemaApplication { path, .. } => assert_eq!(path, &workspace.schema_path()),
        other => panic!("expected schema error, got {other:?}"),
    }
    assert!(!template.is_initialized().await);
    assert!(engine.namespaces().is_empty());
    assert_eq!(engine.stats().namespaces_dropped, 1);

    workspace.write_schema("CREATE TABLE items (id INT PRIMARY KEY);");
    workspace.write_fixture("items.yml", "- id: 1\n- id: 2\n");
    template.init().await.unwrap();
    assert!(template.is_initialized().await);
    assert_eq!(engine.namespaces().len(), 1);
}

#[tokio::test]
async fn test_bad_fixture_is_reported_and_cleaned_up() {
    let workspace = Workspace::new();
    workspace.write_schema("CREATE TABLE items (id INT PRIMARY KEY, name VARCHAR(10) NOT NULL);");
    workspace.write_fixture("items.yml", "- id: 1\n");
    let (template, engine) = memory_template(workspace.config("bad"));

    let err = template.init().await.unwrap_err();
    assert!(matches!(err, TestDbError::FixtureLoad { .. }), "{err}");
    assert!(!template.is_initialized().await);
    assert!(engine.namespaces().is_empty());
}

#[tokio::test]
async fn test_unsupported_schema_statement_is_a_schema_error() {
    let workspace = Workspace::new();
    workspace.write_schema("CREATE TABLE items (id INT); INSERT INTO items VALUES (1);");
    let (template, engine) = memory_template(workspace.config("ddl"));

    let err = template.init().await.unwrap_err();
    assert!(matches!(err, TestDbError::SchemaApplication { .. }));
    assert!(engine.namespaces().is_empty());
}

#[tokio::test]
async fn test_dropping_initialized_template_warns() {
    let (template, engine) = todo_template().await;
    let name = template.name().await.unwrap();

    let (logs, _guard) = CapturedLogs::install();
    drop(template);
    let output = logs.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains(name.as_str()), "{output}");
    assert!(engine.has_namespace(name.as_str()));
}

#[tokio::test]
async fn test_dropping_released_template_is_silent() {
    let (template, _engine) = memory_template(testdata_config());
    let pinned = init_template(&template).await.unwrap();
    pinned.release().await.unwrap();
    drop(pinned);

    let (logs, _guard) = CapturedLogs::install();
    drop(template);
    assert!(!logs.contents().contains("leaked"));
}

#[test]
#[timeout(1000)]
fn test_invalid_config_is_rejected_up_front() {
    let config = TemplateDatabaseConfig {
        namespace_prefix: "has-dash".to_string(),
        ..Default::default()
    };
    let result = TemplateDatabase::new(config, MemoryDriver::new());
    assert!(matches!(result, Err(TestDbError::Configuration(_))));
}
