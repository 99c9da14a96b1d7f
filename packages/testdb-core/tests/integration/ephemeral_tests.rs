//! Ephemeral database handles and the bootstrap helpers.

use serde_json::json;

use testdb_core::{init_template, init_test_db, TestDbError};

use crate::helpers::{memory_template, testdata_config, todo_template};

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let (template, engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    let name = db.name().to_string();
    assert!(engine.has_namespace(&name));

    db.cleanup().await.unwrap();
    assert!(db.is_cleaned_up().await);
    assert!(!engine.has_namespace(&name));
    let dropped = engine.stats().namespaces_dropped;

    db.cleanup().await.unwrap();
    assert_eq!(engine.stats().namespaces_dropped, dropped);
}

#[tokio::test]
async fn test_open_after_cleanup_fails() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    db.cleanup().await.unwrap();

    match db.open().await {
        Err(TestDbError::AlreadyCleanedUp { namespace }) => assert_eq!(namespace, db.name()),
        Err(other) => panic!("expected AlreadyCleanedUp, got {other:?}"),
        Ok(_) => panic!("expected AlreadyCleanedUp, got a session"),
    }
}

#[tokio::test]
async fn test_multiple_sessions_share_one_clone() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();

    let writer = db.open().await.unwrap();
    let reader = db.open().await.unwrap();
    writer
        .insert("todos", json!({"id": 5, "user_id": 1, "title": "shared"}))
        .unwrap();
    assert_eq!(reader.count("todos").unwrap(), 2);
    assert_eq!(reader.namespace().as_str(), db.name());

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_connection_string_names_the_clone() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    assert_eq!(db.connection_string(), format!("memory:///{}", db.name()));
    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_clone_outlives_template_teardown() {
    let (template, engine) = memory_template(testdata_config());
    let pinned = init_template(&template).await.unwrap();
    let db = template.new_test_db().await.unwrap();

    pinned.release().await.unwrap();
    assert!(!template.is_initialized().await);
    assert_eq!(db.open().await.unwrap().count("users").unwrap(), 1);

    db.cleanup().await.unwrap();
    assert!(engine.namespaces().is_empty());
}

#[tokio::test]
async fn test_bootstrap_round_trip() {
    let (template, engine) = memory_template(testdata_config());
    let pinned = init_template(&template).await.unwrap();
    assert_eq!(template.ref_count().await, 1);

    let db = init_test_db(&template).await.unwrap();
    assert!(db.name().starts_with("todo_"));
    assert_eq!(db.session().count("todos").unwrap(), 1);
    assert_eq!(db.database().name(), db.name());
    let name = db.name().to_string();

    db.close().await.unwrap();
    assert!(!engine.has_namespace(&name));

    pinned.release().await.unwrap();
    assert!(engine.namespaces().is_empty());
}

#[tokio::test]
async fn test_init_test_db_builds_template_on_demand() {
    let (template, engine) = memory_template(testdata_config());
    let db = init_test_db(&template).await.unwrap();
    assert!(template.is_initialized().await);
    assert_eq!(engine.namespaces().len(), 2);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_keep_leaves_namespace_in_place() {
    let (template, engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    let name = db.keep().await.unwrap();
    assert!(engine.has_namespace(name.as_str()));
    assert_eq!(engine.stats().namespaces_dropped, 0);
}
