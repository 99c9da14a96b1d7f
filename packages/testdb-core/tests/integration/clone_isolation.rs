//! Clone contents, constraints and isolation.

use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use testdb_core::{CatalogInspector, Connection, Driver, Ident, TestDbError};

use crate::helpers::{memory_template, testdata_config, todo_template, Workspace};

#[tokio::test]
async fn test_delete_cascades_inside_clone() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    let session = db.open().await.unwrap();

    assert_eq!(session.count("users").unwrap(), 1);
    assert_eq!(session.count("todos").unwrap(), 1);

    assert_eq!(session.delete_where("users", "id", json!(1)).unwrap(), 1);
    assert_eq!(session.count("todos").unwrap(), 0);

    // The template keeps its rows.
    let tmpl_session = template
        .driver()
        .open_session(&template.name().await.unwrap())
        .await
        .unwrap();
    assert_eq!(tmpl_session.count("todos").unwrap(), 1);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_clone_is_a_point_in_time_snapshot() {
    let (template, _engine) = todo_template().await;
    let before = template.new_test_db().await.unwrap();

    let tmpl_session = template
        .driver()
        .open_session(&template.name().await.unwrap())
        .await
        .unwrap();
    tmpl_session
        .insert("users", json!({"id": 2, "username": "user2", "email": null}))
        .unwrap();

    let after = template.new_test_db().await.unwrap();
    assert_eq!(before.open().await.unwrap().count("users").unwrap(), 1);
    assert_eq!(after.open().await.unwrap().count("users").unwrap(), 2);

    before.cleanup().await.unwrap();
    after.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_clone_rows_match_template() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();

    let tmpl_session = template
        .driver()
        .open_session(&template.name().await.unwrap())
        .await
        .unwrap();
    let session = db.open().await.unwrap();
    for table in ["users", "todos"] {
        assert_eq!(session.rows(table).unwrap(), tmpl_session.rows(table).unwrap());
    }
    assert_eq!(session.rows("users").unwrap()[0]["email"], json!("user1@example.com"));

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_every_foreign_key_is_reproduced() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();

    let conn = template.driver().connect().await.unwrap();
    let catalog = CatalogInspector::new(&conn)
        .load_catalog(db.ident())
        .await
        .unwrap();
    assert_eq!(catalog.tables, template.tables().await);
    assert_eq!(catalog.foreign_keys, template.foreign_keys().await);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_constraints_are_enforced_in_clone() {
    let (template, _engine) = todo_template().await;
    let db = template.new_test_db().await.unwrap();
    let session = db.open().await.unwrap();

    let err = session
        .insert("todos", json!({"id": 2, "user_id": 42, "title": "orphan"}))
        .unwrap_err();
    assert!(err.to_string().contains("fk_todos_user"), "{err}");

    session
        .insert("todos", json!({"user_id": 1, "title": "second"}))
        .unwrap();
    let ids: Vec<_> = session.rows("todos").unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2)]);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_clones_are_independent() {
    let (template, _engine) = todo_template().await;
    let first = template.new_test_db().await.unwrap();
    let second = template.new_test_db().await.unwrap();
    assert_ne!(first.name(), second.name());

    first
        .open()
        .await
        .unwrap()
        .insert("users", json!({"id": 7, "username": "only-in-first"}))
        .unwrap();
    assert_eq!(first.open().await.unwrap().count("users").unwrap(), 2);
    assert_eq!(second.open().await.unwrap().count("users").unwrap(), 1);

    first.cleanup().await.unwrap();
    second.cleanup().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clones_get_unique_namespaces() {
    let (template, engine) = todo_template().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let template = Arc::clone(&template);
            tokio::spawn(async move { template.new_test_db().await })
        })
        .collect();
    let mut clones = Vec::new();
    for handle in handles {
        clones.push(handle.await.unwrap().unwrap());
    }

    let names: HashSet<&str> = clones.iter().map(|db| db.name()).collect();
    assert_eq!(names.len(), 8);
    assert_eq!(engine.stats().plans_executed, 8);

    for db in &clones {
        assert!(db.name().starts_with("todo_"));
        assert!(!db.name().contains("template"));
        db.cleanup().await.unwrap();
    }
    assert_eq!(engine.namespaces().len(), 1);
}

#[tokio::test]
async fn test_clone_requires_init() {
    let (template, _engine) = memory_template(testdata_config());
    assert!(matches!(
        template.new_test_db().await,
        Err(TestDbError::NotInitialized { .. })
    ));
}

#[tokio::test]
async fn test_children_listed_before_parents_clone_cleanly() {
    let workspace = Workspace::new();
    workspace.write_schema(
        "CREATE TABLE users (id INT PRIMARY KEY);
         CREATE TABLE posts (
             id INT PRIMARY KEY,
             author_id INT,
             FOREIGN KEY (author_id) REFERENCES users (id) ON DELETE SET NULL
         );
         CREATE TABLE comments (
             id INT PRIMARY KEY,
             post_id INT NOT NULL,
             CONSTRAINT fk_comments_post FOREIGN KEY (post_id) REFERENCES posts (id) ON DELETE CASCADE
         );",
    );
    workspace.write_fixture("users.yml", "- id: 1\n");
    workspace.write_fixture("posts.yml", "- id: 10\n  author_id: 1\n");
    workspace.write_fixture("comments.json", r#"[{"id": 100, "post_id": 10}]"#);
    let (template, _engine) = memory_template(workspace.config("blog"));
    template.init().await.unwrap();

    let target = Ident::new("blog_preview").unwrap();
    let plan = template.render_clone_plan(&target).await.unwrap();
    let copies: Vec<&str> = plan.lines().filter(|l| l.starts_with("copy table")).collect();
    assert_eq!(copies.len(), 3);
    assert!(copies[0].ends_with("blog_preview.users"));
    assert!(copies[1].ends_with("blog_preview.posts"));
    assert!(copies[2].ends_with("blog_preview.comments"));
    assert!(plan.contains("posts_ibfk_1"));

    let db = template.new_test_db().await.unwrap();
    let session = db.open().await.unwrap();
    session.delete_where("users", "id", json!(1)).unwrap();
    assert_eq!(session.rows("posts").unwrap()[0]["author_id"], json!(null));
    assert_eq!(session.count("comments").unwrap(), 1);
    session.delete_where("posts", "id", json!(10)).unwrap();
    assert_eq!(session.count("comments").unwrap(), 0);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_clone_into_taken_name_fails_without_dropping_it() {
    let (template, engine) = todo_template().await;
    let conn = template.driver().connect().await.unwrap();
    let taken = Ident::new("todo_taken").unwrap();
    conn.create_namespace(&taken).await.unwrap();

    let plan_text = template.render_clone_plan(&taken).await.unwrap();
    assert!(plan_text.starts_with("create namespace todo_taken"));

    // Collisions cannot be forced through new_test_db; run the plan directly.
    let tables = template.tables().await;
    let fks = template.foreign_keys().await;
    let plan = testdb_core::CloneGenerator::new(&tables, &fks)
        .plan(&template.name().await.unwrap(), &taken);
    assert!(conn.execute_plan(&plan).await.is_err());
    assert!(engine.has_namespace("todo_taken"));
}
